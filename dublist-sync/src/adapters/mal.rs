//! MyAnimeList id-range adapter
//!
//! Per id:
//! - `mal`: first character of the title (404 → the id does not exist)
//! - `jikan`: voice actors of that character, with their language
//! - `jikan`: each voice actor's roles (memoized per person); the language
//!   counts only if this title is among them
//!
//! Any transient failure along that chain makes the id `TransientlyFailed`.
//! A jikan 404 means "no data" and the id is still verified present.

use crate::harness::{CallHarness, CallOutcome, OutboundRequest, OutcomeMemo};
use crate::scan::{Candidate, Flow, Resolution, SourceAdapter};
use crate::tracker::IdOutcome;
use async_trait::async_trait;
use dublist_common::{canonicalize_language, CatalogId, LanguageKey};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub const PROVIDER: &str = "mal";
const MAL_BASE: &str = "https://api.myanimelist.net/v2";
const JIKAN_BASE: &str = "https://api.jikan.moe/v4";
const CLIENT_ID_HEADER: &str = "X-MAL-CLIENT-ID";

#[derive(Debug, Deserialize)]
struct CharactersResponse {
    data: Vec<CharacterEdge>,
}

#[derive(Debug, Deserialize)]
struct CharacterEdge {
    node: CharacterNode,
}

#[derive(Debug, Deserialize)]
struct CharacterNode {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    data: Vec<VoiceEntry>,
}

#[derive(Debug, Deserialize)]
struct VoiceEntry {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    person: Option<Person>,
}

#[derive(Debug, Deserialize)]
struct Person {
    mal_id: Option<i64>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PersonRolesResponse {
    data: Vec<RoleEntry>,
}

#[derive(Debug, Deserialize)]
struct RoleEntry {
    #[serde(default)]
    anime: Option<AnimeRef>,
}

#[derive(Debug, Deserialize)]
struct AnimeRef {
    mal_id: CatalogId,
}

pub struct MalAdapter {
    mal: Arc<CallHarness>,
    jikan: Arc<CallHarness>,
    client_id: String,
    next_id: CatalogId,
    end_id: CatalogId,
    checkpoint_every: usize,
    /// person id → titles the person voiced
    roles: OutcomeMemo<i64, Arc<BTreeSet<CatalogId>>>,
}

impl MalAdapter {
    /// Scan `start_id..=end_id`
    pub fn new(
        mal: Arc<CallHarness>,
        jikan: Arc<CallHarness>,
        client_id: impl Into<String>,
        start_id: CatalogId,
        end_id: CatalogId,
        checkpoint_every: usize,
        memo_capacity: usize,
    ) -> Self {
        Self {
            mal,
            jikan,
            client_id: client_id.into(),
            next_id: start_id,
            end_id,
            checkpoint_every,
            roles: OutcomeMemo::new(memo_capacity),
        }
    }

    async fn person_roles(&self, person_id: i64) -> CallOutcome<Arc<BTreeSet<CatalogId>>> {
        let jikan = &self.jikan;
        self.roles
            .get_or_fetch(person_id, || async move {
                let request = OutboundRequest::get(format!("{}/people/{}/voices", JIKAN_BASE, person_id));
                jikan
                    .call_json::<PersonRolesResponse>(&request)
                    .await
                    .map(|roles| {
                        Arc::new(
                            roles
                                .data
                                .into_iter()
                                .filter_map(|role| role.anime.map(|anime| anime.mal_id))
                                .collect(),
                        )
                    })
            })
            .await
    }

    async fn resolve_id(&self, id: CatalogId) -> IdOutcome {
        let request = OutboundRequest::get(format!("{}/anime/{}/characters?limit=1", MAL_BASE, id))
            .with_header(CLIENT_ID_HEADER, self.client_id.as_str());

        let characters = match self.mal.call_json::<CharactersResponse>(&request).await {
            CallOutcome::Success(characters) => characters,
            CallOutcome::PermanentMiss => return IdOutcome::absent(id),
            CallOutcome::TransientFailure(reason) => {
                warn!(id, reason = %reason, "Character lookup failed");
                return IdOutcome::failed(id);
            }
        };

        let Some(first) = characters.data.first() else {
            debug!(id, "No characters listed");
            return IdOutcome::present(id, BTreeSet::new());
        };
        let character_id = first.node.id;

        let request = OutboundRequest::get(format!("{}/characters/{}/voices", JIKAN_BASE, character_id));
        let voices = match self.jikan.call_json::<VoicesResponse>(&request).await {
            CallOutcome::Success(voices) => voices,
            CallOutcome::PermanentMiss => {
                debug!(id, character_id, "No voice data for character");
                return IdOutcome::present(id, BTreeSet::new());
            }
            CallOutcome::TransientFailure(reason) => {
                warn!(id, character_id, reason = %reason, "Voice actor lookup failed");
                return IdOutcome::failed(id);
            }
        };

        let mut languages: BTreeSet<LanguageKey> = BTreeSet::new();
        for entry in voices.data {
            let Some(language) = entry.language.as_deref().and_then(canonicalize_language) else {
                continue;
            };
            if languages.contains(&language) {
                continue;
            }
            let Some(person) = entry.person else {
                continue;
            };
            let Some(person_id) = person.mal_id else {
                continue;
            };

            debug!(
                id,
                person = person.name.as_deref().unwrap_or("unknown"),
                language = %language,
                "Checking voice actor"
            );

            match self.person_roles(person_id).await {
                CallOutcome::Success(titles) => {
                    if titles.contains(&id) {
                        languages.insert(language);
                    }
                }
                CallOutcome::PermanentMiss => {}
                CallOutcome::TransientFailure(reason) => {
                    warn!(id, person_id, reason = %reason, "Voice actor roles lookup failed");
                    return IdOutcome::failed(id);
                }
            }
        }

        IdOutcome::present(id, languages)
    }
}

#[async_trait]
impl SourceAdapter for MalAdapter {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn checkpoint_every(&self) -> usize {
        self.checkpoint_every
    }

    fn keeps_missing_cache(&self) -> bool {
        true
    }

    fn next_candidate(&mut self) -> Option<Candidate> {
        if self.next_id > self.end_id {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        Some(Candidate::Id(id))
    }

    async fn resolve(&mut self, candidate: Candidate) -> Resolution {
        match candidate {
            Candidate::Id(id) => Resolution::single(self.resolve_id(id).await),
            other => {
                warn!(candidate = %other, "Unsupported candidate for id-range scan");
                Resolution::batch(Vec::new(), Flow::More)
            }
        }
    }
}
