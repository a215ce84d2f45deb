//! AniList paged GraphQL adapter
//!
//! Each page lists up to 50 titles ordered by AniList id with their
//! characters' voice actors. Titles carrying a MAL id are verified present
//! with every voice actor language seen; titles without one are ignored.
//!
//! A page that cannot be read ends the scan; later pages stay unchecked.

use crate::harness::{CallHarness, CallOutcome, OutboundRequest};
use crate::scan::{Candidate, Flow, Resolution, SourceAdapter};
use crate::tracker::IdOutcome;
use async_trait::async_trait;
use dublist_common::{canonicalize_language, CatalogId, LanguageKey};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const PROVIDER: &str = "anilist";
const ANILIST_URL: &str = "https://graphql.anilist.co";
pub const PER_PAGE: u32 = 50;
const CHARACTERS_PER_PAGE: u32 = 50;

const PAGE_QUERY: &str = r#"
query ($page: Int, $perPage: Int, $charPerPage: Int) {
  Page(page: $page, perPage: $perPage) {
    pageInfo { currentPage hasNextPage total }
    media(type: ANIME, sort: ID) {
      id
      idMal
      characters(perPage: $charPerPage) {
        edges {
          voiceActors { id languageV2 }
        }
      }
    }
  }
}
"#;

const TOTAL_QUERY: &str = r#"
query ($page: Int = 1, $perPage: Int = 50) {
  Page(page: $page, perPage: $perPage) {
    pageInfo { total lastPage currentPage hasNextPage perPage }
    media(type: ANIME, sort: ID) { id }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct PageData {
    #[serde(rename = "Page")]
    page: PageBody,
}

#[derive(Debug, Deserialize)]
struct PageBody {
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
    #[serde(default)]
    media: Vec<Media>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage", default)]
    has_next_page: bool,
    #[serde(default)]
    total: Option<u64>,
    #[serde(rename = "lastPage", default)]
    last_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Media {
    #[serde(rename = "idMal")]
    id_mal: Option<CatalogId>,
    #[serde(default)]
    characters: Option<CharacterConnection>,
}

#[derive(Debug, Deserialize)]
struct CharacterConnection {
    #[serde(default)]
    edges: Vec<CharacterEdge>,
}

#[derive(Debug, Deserialize)]
struct CharacterEdge {
    #[serde(rename = "voiceActors", default)]
    voice_actors: Option<Vec<VoiceActor>>,
}

#[derive(Debug, Deserialize)]
struct VoiceActor {
    #[serde(rename = "languageV2")]
    language: Option<String>,
}

/// A 200 reply carrying GraphQL `errors`, or no `data`, is malformed
fn decode_graphql<T: DeserializeOwned>(body: &str) -> Result<T, String> {
    let response: GraphQlResponse<T> = serde_json::from_str(body).map_err(|e| e.to_string())?;
    if let Some(errors) = response.errors.filter(|errors| !errors.is_empty()) {
        return Err(format!("GraphQL errors: {}", serde_json::Value::Array(errors)));
    }
    response.data.ok_or_else(|| "missing `data`".to_string())
}

fn graphql_request(query: &str, variables: serde_json::Value) -> OutboundRequest {
    OutboundRequest::post_json(ANILIST_URL, json!({ "query": query, "variables": variables }))
        .with_header("Content-Type", "application/json")
        .with_header("Accept", "application/json")
}

/// Languages of every voice actor on one title
fn media_languages(media: &Media) -> BTreeSet<LanguageKey> {
    media
        .characters
        .iter()
        .flat_map(|connection| connection.edges.iter())
        .flat_map(|edge| edge.voice_actors.iter().flatten())
        .filter_map(|actor| actor.language.as_deref().and_then(canonicalize_language))
        .collect()
}

/// Total number of pages at [`PER_PAGE`]: `lastPage`, else `ceil(total / PER_PAGE)`
pub async fn total_pages(harness: &CallHarness) -> CallOutcome<u32> {
    let request = graphql_request(TOTAL_QUERY, json!({ "perPage": PER_PAGE }));
    harness
        .call(&request, decode_graphql::<PageData>)
        .await
        .map(|data| page_count(&data.page.page_info))
}

fn page_count(info: &PageInfo) -> u32 {
    match (info.last_page, info.total) {
        (Some(last), _) if last > 0 => last,
        (_, Some(total)) => u32::try_from(total.div_ceil(u64::from(PER_PAGE))).unwrap_or(u32::MAX),
        _ => 0,
    }
}

/// Page statistics accumulated across the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStats {
    pub pages: usize,
    pub media: usize,
    pub with_mal: usize,
    pub with_languages: usize,
}

pub struct AniListAdapter {
    harness: Arc<CallHarness>,
    next_page: u32,
    end_page: Option<u32>,
    checkpoint_every: usize,
    stats: PageStats,
}

impl AniListAdapter {
    /// Scan from `start_page` (default 1) to `end_page` inclusive, or until no next page
    pub fn new(
        harness: Arc<CallHarness>,
        start_page: Option<u32>,
        end_page: Option<u32>,
        checkpoint_every: usize,
    ) -> Self {
        Self {
            harness,
            next_page: start_page.unwrap_or(1).max(1),
            end_page,
            checkpoint_every,
            stats: PageStats::default(),
        }
    }

    pub fn stats(&self) -> PageStats {
        self.stats
    }

    async fn resolve_page(&mut self, page: u32) -> Resolution {
        let variables = json!({
            "page": page,
            "perPage": PER_PAGE,
            "charPerPage": CHARACTERS_PER_PAGE,
        });
        let request = graphql_request(PAGE_QUERY, variables);

        let data = match self.harness.call(&request, decode_graphql::<PageData>).await {
            CallOutcome::Success(data) => data,
            CallOutcome::PermanentMiss => {
                info!(page, "Page not found, treating as end of listing");
                return Resolution::batch(Vec::new(), Flow::Exhausted);
            }
            CallOutcome::TransientFailure(reason) => {
                warn!(page, reason = %reason, "Page lookup failed");
                return Resolution::unavailable(reason);
            }
        };

        let mut outcomes = Vec::new();
        let media_count = data.page.media.len();
        for media in &data.page.media {
            let Some(id) = media.id_mal else {
                continue;
            };
            let languages = media_languages(media);
            if !languages.is_empty() {
                self.stats.with_languages += 1;
            }
            outcomes.push(IdOutcome::present(id, languages));
        }

        self.stats.pages += 1;
        self.stats.media += media_count;
        self.stats.with_mal += outcomes.len();
        debug!(
            page,
            media = media_count,
            with_mal = outcomes.len(),
            has_next = data.page.page_info.has_next_page,
            "Page resolved"
        );

        let flow = if data.page.page_info.has_next_page {
            Flow::More
        } else {
            Flow::Exhausted
        };
        Resolution::batch(outcomes, flow)
    }
}

#[async_trait]
impl SourceAdapter for AniListAdapter {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn checkpoint_every(&self) -> usize {
        self.checkpoint_every
    }

    fn next_candidate(&mut self) -> Option<Candidate> {
        if self.end_page.is_some_and(|end| self.next_page > end) {
            return None;
        }
        let page = self.next_page;
        self.next_page += 1;
        Some(Candidate::Page(page))
    }

    async fn resolve(&mut self, candidate: Candidate) -> Resolution {
        match candidate {
            Candidate::Page(page) => self.resolve_page(page).await,
            other => {
                warn!(candidate = %other, "Unsupported candidate for paged scan");
                Resolution::batch(Vec::new(), Flow::More)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphql_errors_are_malformed() {
        let body = r#"{"data": null, "errors": [{"message": "Too Many Requests"}]}"#;
        let err = decode_graphql::<PageData>(body).unwrap_err();
        assert!(err.starts_with("GraphQL errors"));

        assert!(decode_graphql::<PageData>(r#"{"data": null}"#).is_err());
    }

    #[test]
    fn test_media_languages_canonicalized() {
        let body = r#"{"data": {"Page": {"pageInfo": {"hasNextPage": false}, "media": [
            {"idMal": 1, "characters": {"edges": [
                {"voiceActors": [{"languageV2": "Japanese"}, {"languageV2": "Portuguese (BR)"}]},
                {"voiceActors": null},
                {"voiceActors": [{"languageV2": null}, {"languageV2": "English"}]}
            ]}}
        ]}}}"#;
        let data = decode_graphql::<PageData>(body).unwrap();
        let languages: Vec<String> = media_languages(&data.page.media[0])
            .into_iter()
            .map(|l| l.as_str().to_string())
            .collect();
        assert_eq!(languages, vec!["english", "japanese", "portuguese"]);
    }

    #[test]
    fn test_page_count_saturates() {
        let info = |total, last_page| PageInfo {
            has_next_page: false,
            total,
            last_page,
        };
        assert_eq!(page_count(&info(Some(101), None)), 3);
        assert_eq!(page_count(&info(Some(101), Some(0))), 3);
        assert_eq!(page_count(&info(Some(7), Some(9))), 9);
        assert_eq!(page_count(&info(Some(u64::MAX), None)), u32::MAX);
        assert_eq!(page_count(&info(None, None)), 0);
    }
}
