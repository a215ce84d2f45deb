//! Test helpers: scripted HTTP transport, scripted adapter, data-root seeding

#![allow(dead_code)]

use async_trait::async_trait;
use dublist_common::json_store;
use dublist_common::model::{FactFile, ManualOverride, MissingIdFile};
use dublist_common::{CatalogId, DataLayout, LanguageKey};
use dublist_sync::harness::{CallHarness, OutboundRequest, RawResponse, RetryPolicy, Transport, TransportError};
use dublist_sync::scan::{Candidate, Flow, Resolution, SourceAdapter};
use dublist_sync::tracker::IdOutcome;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub type Reply = Result<RawResponse, TransportError>;

pub fn ok(body: &str) -> Reply {
    Ok(RawResponse::new(200, body))
}

pub fn status(code: u16) -> Reply {
    Ok(RawResponse::new(code, ""))
}

pub fn rate_limited(server_delay: Option<Duration>) -> Reply {
    let response = RawResponse::new(429, "");
    Ok(match server_delay {
        Some(delay) => response.with_retry_after(delay),
        None => response,
    })
}

pub fn network_error() -> Reply {
    Err(TransportError("connection reset".to_string()))
}

/// Replies per exact URL, in order; the last reply repeats
///
/// An unscripted URL gets a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(Instant, String)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, url: &str, replies: Vec<Reply>) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), replies.into_iter().collect());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, url)| url.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(_, u)| u == url).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &OutboundRequest) -> Result<RawResponse, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), request.url.clone()));

        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&request.url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| status(404)),
            None => status(404),
        }
    }
}

pub fn harness(system: &str, interval: Duration, transport: Arc<ScriptedTransport>) -> Arc<CallHarness> {
    Arc::new(CallHarness::new(system, interval, RetryPolicy::default(), transport))
}

/// Adapter that replays a fixed list of outcomes, one id per candidate
pub struct ScriptedAdapter {
    pub provider: String,
    pub checkpoint_every: usize,
    pub outcomes: VecDeque<IdOutcome>,
    current: Option<IdOutcome>,
    pub resolved: Arc<AtomicUsize>,
    /// Panic when resolving this id
    pub panic_on: Option<CatalogId>,
    /// Never finish resolving this id
    pub hang_on: Option<CatalogId>,
}

impl ScriptedAdapter {
    pub fn new(provider: &str, outcomes: Vec<IdOutcome>) -> Self {
        Self {
            provider: provider.to_string(),
            checkpoint_every: 100,
            outcomes: outcomes.into_iter().collect(),
            current: None,
            resolved: Arc::new(AtomicUsize::new(0)),
            panic_on: None,
            hang_on: None,
        }
    }

    pub fn resolved(&self) -> usize {
        self.resolved.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn checkpoint_every(&self) -> usize {
        self.checkpoint_every
    }

    fn keeps_missing_cache(&self) -> bool {
        true
    }

    fn next_candidate(&mut self) -> Option<Candidate> {
        self.current = self.outcomes.pop_front();
        self.current.as_ref().map(|outcome| Candidate::Id(outcome.id))
    }

    async fn resolve(&mut self, candidate: Candidate) -> Resolution {
        let Candidate::Id(id) = candidate else {
            return Resolution::batch(Vec::new(), Flow::More);
        };
        if self.panic_on == Some(id) {
            panic!("adapter bug at {}", id);
        }
        if self.hang_on == Some(id) {
            std::future::pending::<()>().await;
        }
        self.resolved.fetch_add(1, Ordering::SeqCst);
        let outcome = self.current.take().unwrap();
        Resolution::single(outcome)
    }
}

/// Adapter whose ids are consumed by `next_candidate`, so cache skips advance
pub struct RangeAdapter {
    pub next: CatalogId,
    pub end: CatalogId,
    pub resolved: Vec<CatalogId>,
    pub outcome: fn(CatalogId) -> IdOutcome,
}

#[async_trait]
impl SourceAdapter for RangeAdapter {
    fn provider(&self) -> &str {
        "range"
    }

    fn checkpoint_every(&self) -> usize {
        1000
    }

    fn keeps_missing_cache(&self) -> bool {
        true
    }

    fn next_candidate(&mut self) -> Option<Candidate> {
        if self.next > self.end {
            return None;
        }
        self.next += 1;
        Some(Candidate::Id(self.next - 1))
    }

    async fn resolve(&mut self, candidate: Candidate) -> Resolution {
        let Candidate::Id(id) = candidate else {
            return Resolution::batch(Vec::new(), Flow::More);
        };
        self.resolved.push(id);
        Resolution::single((self.outcome)(id))
    }
}

pub fn lang(name: &str) -> LanguageKey {
    LanguageKey::from_canonical(name)
}

pub fn seed_provider(layout: &DataLayout, provider: &str, language: &str, ids: &[CatalogId]) {
    let language = lang(language);
    let path = layout
        .provider_dir(provider)
        .join(DataLayout::fact_file_name(&language));
    json_store::save_json(&path, &FactFile::new(&language, ids)).unwrap();
}

pub fn seed_manual(layout: &DataLayout, language: &str, manual: ManualOverride) {
    let path = layout
        .manual_dir()
        .join(DataLayout::fact_file_name(&lang(language)));
    json_store::save_json(&path, &manual).unwrap();
}

pub fn seed_missing(layout: &DataLayout, provider: &str, high_water_mark: Option<CatalogId>, missing: &[CatalogId]) {
    let file = MissingIdFile {
        high_water_mark,
        updated_at: None,
        missing: missing.to_vec(),
    };
    json_store::save_json(&layout.missing_cache_path(provider), &file).unwrap();
}

pub fn read_provider(layout: &DataLayout, provider: &str, language: &str) -> Vec<CatalogId> {
    let path = layout
        .provider_dir(provider)
        .join(DataLayout::fact_file_name(&lang(language)));
    let file: FactFile = json_store::load_json_or_default(&path);
    file.dubbed
}
