//! Curated forum list of English dubs
//!
//! One MyAnimeList forum topic where a single user keeps posting the titles
//! that received an English dub. The topic page is read through the
//! `mal_web` harness, the author's posts are picked out of the HTML and
//! every `myanimelist.net/anime/<id>` link in them counts as a vote.
//!
//! Unlike the crawled providers this source is rewritten whole on each run:
//! the posts are the complete list, so an id that disappears from them is
//! dropped. A page that could not be read, or that no longer contains any
//! post by the author, leaves the existing file untouched.

use crate::error::SyncResult;
use crate::harness::{CallHarness, CallOutcome, OutboundRequest};
use dublist_common::json_store;
use dublist_common::model::FactFile;
use dublist_common::{CatalogId, DataLayout, LanguageKey};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const PROVIDER: &str = "kenny";
pub const TOPIC_URL: &str = "https://myanimelist.net/forum/?topicid=1692966";
pub const AUTHOR: &str = "Kenny_Stryker";
/// Posts read from the top of the topic page
pub const POST_LIMIT: usize = 11;

const LANGUAGE: &str = "english";
const ANIME_LINK: &str = r"^https://myanimelist\.net/anime/(\d+)";

/// Result of one forum sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForumSync {
    Written { ids: usize },
    Unchanged { ids: usize },
    /// Nothing was written; the reason the page could not be used
    Skipped(String),
}

pub struct ForumSource {
    harness: Arc<CallHarness>,
    topic_url: String,
    author: String,
    post_limit: usize,
}

impl ForumSource {
    pub fn new(
        harness: Arc<CallHarness>,
        topic_url: impl Into<String>,
        author: impl Into<String>,
        post_limit: usize,
    ) -> Self {
        Self {
            harness,
            topic_url: topic_url.into(),
            author: author.into(),
            post_limit,
        }
    }

    /// Anime ids linked from the author's posts
    ///
    /// A page without any post by the author is treated as malformed.
    pub async fn fetch(&self) -> CallOutcome<BTreeSet<CatalogId>> {
        let request = OutboundRequest::get(self.topic_url.clone());
        self.harness
            .call(&request, |body| {
                extract_anime_ids(body, &self.author, self.post_limit)
            })
            .await
    }

    /// Rewrite `sources/automatic_kenny/dubbed_english.json` from the topic
    pub async fn sync(&self, layout: &DataLayout) -> SyncResult<ForumSync> {
        let ids = match self.fetch().await {
            CallOutcome::Success(ids) => ids,
            CallOutcome::PermanentMiss => {
                warn!(url = %self.topic_url, "Forum topic not found, keeping existing list");
                return Ok(ForumSync::Skipped("topic not found".to_string()));
            }
            CallOutcome::TransientFailure(reason) => {
                warn!(url = %self.topic_url, reason = %reason, "Forum topic unreadable, keeping existing list");
                return Ok(ForumSync::Skipped(reason.to_string()));
            }
        };

        let language = LanguageKey::from_canonical(LANGUAGE);
        let mut file = FactFile::new(&language, &ids);
        file.origin = self.topic_url.clone();

        let path = layout
            .provider_dir(PROVIDER)
            .join(DataLayout::fact_file_name(&language));
        let written = json_store::save_json_if_changed(&path, &file)?;
        info!(
            provider = PROVIDER,
            ids = ids.len(),
            written,
            "Forum list synced"
        );

        Ok(if written {
            ForumSync::Written { ids: ids.len() }
        } else {
            ForumSync::Unchanged { ids: ids.len() }
        })
    }
}

/// Collect anime ids from the first `post_limit` posts written by `author`
fn extract_anime_ids(
    html: &str,
    author: &str,
    post_limit: usize,
) -> Result<BTreeSet<CatalogId>, String> {
    let post_selector = selector("div.forum-topic-message")?;
    let content_selector = selector("div.content")?;
    let link_selector = selector("a[href]")?;
    let anime_link = Regex::new(ANIME_LINK).map_err(|e| e.to_string())?;

    let document = Html::parse_document(html);
    let posts: Vec<_> = document
        .select(&post_selector)
        .filter(|post| post.value().attr("data-user") == Some(author))
        .take(post_limit)
        .collect();
    if posts.is_empty() {
        return Err(format!("no posts by {}", author));
    }

    let mut ids = BTreeSet::new();
    for (index, post) in posts.iter().enumerate() {
        let Some(content) = post.select(&content_selector).next() else {
            continue;
        };
        let before = ids.len();
        for link in content.select(&link_selector) {
            let id = link
                .value()
                .attr("href")
                .and_then(|href| anime_link.captures(href))
                .and_then(|caps| caps.get(1))
                .and_then(|id| id.as_str().parse::<CatalogId>().ok());
            if let Some(id) = id {
                ids.insert(id);
            }
        }
        debug!(post = index + 1, new_ids = ids.len() - before, "Forum post parsed");
    }
    Ok(ids)
}

fn selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("selector {}: {}", css, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <div class="forum-topic-message message" data-user="Kenny_Stryker">
          <div class="content">
            <a href="https://myanimelist.net/anime/5114/Fullmetal_Alchemist">FMA</a>
            <a href="https://myanimelist.net/anime/1">Bebop</a>
            <a href="https://myanimelist.net/manga/2">Manga</a>
            <a href="https://example.com/https://myanimelist.net/anime/3">Elsewhere</a>
          </div>
        </div>
        <div class="forum-topic-message" data-user="someone_else">
          <div class="content"><a href="https://myanimelist.net/anime/999">Other</a></div>
        </div>
        <div class="forum-topic-message" data-user="Kenny_Stryker">
          <div class="content">
            <a href="https://myanimelist.net/anime/1">Bebop again</a>
            <a href="https://myanimelist.net/anime/20">Naruto</a>
          </div>
        </div>
    </body></html>"#;

    fn ids(values: &[CatalogId]) -> BTreeSet<CatalogId> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_only_author_anime_links_count() {
        assert_eq!(extract_anime_ids(PAGE, AUTHOR, 11), Ok(ids(&[1, 20, 5114])));
    }

    #[test]
    fn test_post_limit_reads_from_the_top() {
        assert_eq!(extract_anime_ids(PAGE, AUTHOR, 1), Ok(ids(&[1, 5114])));
    }

    #[test]
    fn test_page_without_author_is_rejected() {
        assert!(extract_anime_ids(PAGE, "nobody", 11).is_err());
        assert!(extract_anime_ids("<html></html>", AUTHOR, 11).is_err());
    }
}
