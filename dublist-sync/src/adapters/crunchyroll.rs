//! Crunchyroll catalog adapter, read through the UniqueStream mirror
//!
//! List-then-detail: each candidate is one listing offset. The listing's
//! series are fetched with at most `fan_out` detail calls in flight, all
//! through the single `uniquestream` harness. A failed detail only loses
//! that series; the rest of the batch is kept.
//!
//! Several series can share one MAL id, and a failed detail has no id to
//! mark as failed. Such failures are reported as unresolved, which keeps the
//! run from removing anything.

use crate::harness::{CallHarness, CallOutcome, OutboundRequest};
use crate::scan::{Candidate, Flow, Resolution, SourceAdapter};
use crate::tracker::IdOutcome;
use async_trait::async_trait;
use dublist_common::{CatalogId, LanguageKey};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const PROVIDER: &str = "crunchyroll";
const BASE_URL: &str = "https://anime.uniquestream.net/api/v1";

/// Audio locale → language
const LOCALE_LANGUAGES: &[(&str, &str)] = &[
    ("ar-SA", "arabic"),
    ("ca-ES", "catalan"),
    ("de-DE", "german"),
    ("en-IN", "english"),
    ("en-US", "english"),
    ("es-419", "spanish"),
    ("es-ES", "spanish"),
    ("fr-FR", "french"),
    ("hi-IN", "hindi"),
    ("id-ID", "indonesian"),
    ("it-IT", "italian"),
    ("ja-JP", "japanese"),
    ("ko-KR", "korean"),
    ("ms-MY", "malay"),
    ("pl-PL", "polish"),
    ("pt-BR", "portuguese"),
    ("pt-PT", "portuguese"),
    ("ru-RU", "russian"),
    ("ta-IN", "tamil"),
    ("te-IN", "telugu"),
    ("th-TH", "thai"),
    ("tr-TR", "turkish"),
    ("vi-VN", "vietnamese"),
    ("zh-CN", "chinese"),
    ("zh-HK", "chinese"),
    ("zh-TW", "chinese"),
];

pub fn locale_language(locale: &str) -> Option<LanguageKey> {
    LOCALE_LANGUAGES
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(locale.trim()))
        .map(|(_, language)| LanguageKey::from_canonical(*language))
}

#[derive(Debug, Deserialize)]
struct BrowsePage {
    data: Vec<BrowseItem>,
}

#[derive(Debug, Deserialize)]
struct BrowseItem {
    content_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeriesDetail {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    seasons: Vec<Season>,
    #[serde(default)]
    audio_locales: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Season {
    #[serde(default)]
    mal_id: Option<CatalogId>,
}

/// What one series detail lookup produced
enum Detail {
    Outcome(IdOutcome),
    /// Not found, or no MAL id to attach observations to
    Ignored,
    /// Gave up transiently; the series' MAL id is unknown
    Failed,
}

pub struct CrunchyrollAdapter {
    harness: Arc<CallHarness>,
    /// `None` once the listing is exhausted
    next_offset: Option<u64>,
    fan_out: usize,
    checkpoint_every: usize,
    listed: usize,
}

impl CrunchyrollAdapter {
    pub fn new(harness: Arc<CallHarness>, fan_out: usize, checkpoint_every: usize) -> Self {
        Self {
            harness,
            next_offset: Some(0),
            fan_out: fan_out.max(1),
            checkpoint_every,
            listed: 0,
        }
    }

    /// Series seen in the listing so far
    pub fn listed(&self) -> usize {
        self.listed
    }

    async fn fetch_detail(&self, content_id: String) -> Detail {
        let request = OutboundRequest::get(format!("{}/series/{}", BASE_URL, content_id));
        let detail = match self.harness.call_json::<SeriesDetail>(&request).await {
            CallOutcome::Success(detail) => detail,
            CallOutcome::PermanentMiss => {
                debug!(content_id = %content_id, "Series not found");
                return Detail::Ignored;
            }
            CallOutcome::TransientFailure(reason) => {
                warn!(content_id = %content_id, reason = %reason, "Series detail failed, skipping");
                return Detail::Failed;
            }
        };

        let Some(id) = detail.seasons.first().and_then(|season| season.mal_id) else {
            debug!(
                content_id = %content_id,
                title = detail.title.as_deref().unwrap_or(""),
                "No MAL id, ignoring"
            );
            return Detail::Ignored;
        };

        let languages: BTreeSet<LanguageKey> = detail
            .audio_locales
            .iter()
            .filter_map(|locale| {
                let language = locale_language(locale);
                if language.is_none() {
                    debug!(content_id = %content_id, locale = %locale, "Unmapped audio locale");
                }
                language
            })
            .collect();

        Detail::Outcome(IdOutcome::present(id, languages))
    }

    async fn resolve_offset(&mut self, offset: u64) -> Resolution {
        let request = OutboundRequest::get(format!("{}/videos/browse?offset={}", BASE_URL, offset));
        let page = match self.harness.call_json::<BrowsePage>(&request).await {
            CallOutcome::Success(page) => page,
            CallOutcome::PermanentMiss => {
                self.next_offset = None;
                return Resolution::batch(Vec::new(), Flow::Exhausted);
            }
            CallOutcome::TransientFailure(reason) => {
                self.next_offset = None;
                warn!(offset, reason = %reason, "Listing failed");
                return Resolution::unavailable(reason);
            }
        };

        if page.data.is_empty() {
            info!(offset, listed = self.listed, "Listing exhausted");
            self.next_offset = None;
            return Resolution::batch(Vec::new(), Flow::Exhausted);
        }

        let item_count = page.data.len();
        self.listed += item_count;
        self.next_offset = Some(offset + item_count as u64);

        let content_ids: Vec<String> = page
            .data
            .into_iter()
            .filter_map(|item| item.content_id)
            .collect();

        let this = &*self;
        let details: Vec<Detail> = stream::iter(content_ids)
            .map(|content_id| this.fetch_detail(content_id))
            .buffer_unordered(this.fan_out)
            .collect()
            .await;

        let mut outcomes = Vec::new();
        let mut failed = 0;
        for detail in details {
            match detail {
                Detail::Outcome(outcome) => outcomes.push(outcome),
                Detail::Ignored => {}
                Detail::Failed => failed += 1,
            }
        }

        debug!(
            offset,
            items = item_count,
            with_mal = outcomes.len(),
            failed,
            "Listing page resolved"
        );
        Resolution::batch(outcomes, Flow::More).with_unresolved(failed)
    }
}

#[async_trait]
impl SourceAdapter for CrunchyrollAdapter {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn checkpoint_every(&self) -> usize {
        self.checkpoint_every
    }

    fn next_candidate(&mut self) -> Option<Candidate> {
        self.next_offset.map(Candidate::Offset)
    }

    async fn resolve(&mut self, candidate: Candidate) -> Resolution {
        match candidate {
            Candidate::Offset(offset) => self.resolve_offset(offset).await,
            other => {
                warn!(candidate = %other, "Unsupported candidate for listing scan");
                Resolution::batch(Vec::new(), Flow::More)
            }
        }
    }
}
