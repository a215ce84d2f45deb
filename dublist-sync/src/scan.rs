//! Scan runner
//!
//! Drives one [`SourceAdapter`] over its candidate sequence:
//!
//! 1. Ask the adapter for the next candidate (id, page or list offset)
//! 2. Skip ids the missing-id cache still vouches for (no calls at all)
//! 3. Let the adapter resolve the candidate into classified outcomes
//! 4. Record the outcomes; flush every `checkpoint_every` candidates
//!
//! A resolution that reports unresolved lookups puts the run into additions
//! only mode (see [`CrawlTracker::record_unresolved`]).
//!
//! The run ends on exhaustion, early stop, cancellation, an adapter error or
//! a panic. Every one of those paths goes through the same final flush.
//!
//! Two concurrent runs of the same provider against one data root are not
//! supported: both would rewrite the same files from different baselines.

use crate::error::SyncResult;
use crate::harness::FailureReason;
use crate::store::ProviderRunStore;
use crate::tracker::{Control, CrawlTracker, IdOutcome, TrackerStats};
use async_trait::async_trait;
use dublist_common::config::ScanConfig;
use dublist_common::{CatalogId, DataLayout};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One unit of work in an adapter's sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    /// A single catalog id (id-range scans)
    Id(CatalogId),
    /// 1-based page number (paged scans)
    Page(u32),
    /// Listing offset (list-then-detail scans)
    Offset(u64),
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Candidate::Id(id) => write!(f, "id {}", id),
            Candidate::Page(page) => write!(f, "page {}", page),
            Candidate::Offset(offset) => write!(f, "offset {}", offset),
        }
    }
}

/// What comes after a resolved candidate
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    More,
    /// The source reported no further candidates
    Exhausted,
    /// The source could not be read; later candidates stay unchecked
    Unavailable(FailureReason),
}

/// Classified outcomes for one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub outcomes: Vec<IdOutcome>,
    /// Lookups that gave up before their catalog id was known
    pub unresolved: usize,
    pub flow: Flow,
}

impl Resolution {
    pub fn single(outcome: IdOutcome) -> Self {
        Self::batch(vec![outcome], Flow::More)
    }

    pub fn batch(outcomes: Vec<IdOutcome>, flow: Flow) -> Self {
        Self {
            outcomes,
            unresolved: 0,
            flow,
        }
    }

    pub fn unavailable(reason: FailureReason) -> Self {
        Self::batch(Vec::new(), Flow::Unavailable(reason))
    }

    pub fn with_unresolved(mut self, unresolved: usize) -> Self {
        self.unresolved = unresolved;
        self
    }
}

/// One provider integration
///
/// All outbound calls must go through the adapter's call harnesses.
#[async_trait]
pub trait SourceAdapter: Send {
    /// Provider name, used for `sources/automatic_<provider>/`
    fn provider(&self) -> &str;

    /// Flush after this many resolved candidates
    fn checkpoint_every(&self) -> usize;

    /// Id-range scans keep `cache/<provider>_missing_ids.json` and skip its ids
    fn keeps_missing_cache(&self) -> bool {
        false
    }

    /// Next candidate; `None` once the configured range is done
    fn next_candidate(&mut self) -> Option<Candidate>;

    async fn resolve(&mut self, candidate: Candidate) -> Resolution;
}

/// Why a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    Completed,
    EarlyStop,
    Interrupted,
    SourceUnavailable(String),
    /// Adapter error or panic, caught and logged
    Failed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Completed => write!(f, "completed"),
            StopReason::EarlyStop => write!(f, "early stop"),
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::SourceUnavailable(reason) => write!(f, "source unavailable: {}", reason),
            StopReason::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Result of one adapter run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub provider: String,
    /// Candidates resolved (cache skips excluded)
    pub candidates: usize,
    pub stats: TrackerStats,
    pub checkpoints: usize,
    pub stop: StopReason,
}

pub struct ScanRunner {
    store: ProviderRunStore,
    tracker: CrawlTracker,
    candidates: usize,
    checkpoints: usize,
}

impl ScanRunner {
    /// Load the adapter's persisted state and seed a fresh tracker
    pub fn open<A>(layout: &DataLayout, adapter: &A, scan: &ScanConfig) -> SyncResult<Self>
    where
        A: SourceAdapter + ?Sized,
    {
        let store = ProviderRunStore::open(layout, adapter.provider())?;
        let missing = adapter.keeps_missing_cache().then(|| store.missing_cache());
        let tracker = CrawlTracker::new(missing, scan.early_stop_after);
        Ok(Self {
            store,
            tracker,
            candidates: 0,
            checkpoints: 0,
        })
    }

    /// Run `adapter` to the end and flush; only a failed final flush is an error
    pub async fn run<A>(mut self, adapter: &mut A, cancel: &CancellationToken) -> SyncResult<RunSummary>
    where
        A: SourceAdapter + ?Sized,
    {
        let provider = adapter.provider().to_string();
        info!(provider = %provider, "Scan started");

        let driven = AssertUnwindSafe(self.drive(adapter, cancel))
            .catch_unwind()
            .await;

        let stop = match driven {
            Ok(Ok(stop)) => stop,
            Ok(Err(e)) => {
                error!(provider = %provider, error = %e, "Scan failed, finalizing");
                StopReason::Failed(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(provider = %provider, panic = %message, "Scan panicked, finalizing");
                StopReason::Failed(message)
            }
        };

        if stop == StopReason::Interrupted {
            warn!(provider = %provider, "Interrupted, flushing state");
        }
        self.store.flush(&self.tracker)?;
        self.checkpoints += 1;

        let summary = RunSummary {
            provider,
            candidates: self.candidates,
            stats: self.tracker.stats(),
            checkpoints: self.checkpoints,
            stop,
        };
        info!(
            provider = %summary.provider,
            candidates = summary.candidates,
            present = summary.stats.present,
            absent = summary.stats.absent,
            failed = summary.stats.failed,
            skipped = summary.stats.skipped,
            stop = %summary.stop,
            "Scan finished"
        );
        Ok(summary)
    }

    async fn drive<A>(&mut self, adapter: &mut A, cancel: &CancellationToken) -> SyncResult<StopReason>
    where
        A: SourceAdapter + ?Sized,
    {
        let checkpoint_every = adapter.checkpoint_every().max(1);

        loop {
            if cancel.is_cancelled() {
                return Ok(StopReason::Interrupted);
            }

            let Some(candidate) = adapter.next_candidate() else {
                return Ok(StopReason::Completed);
            };

            if let Candidate::Id(id) = candidate {
                if self.tracker.skip_cached_missing(id) {
                    continue;
                }
            }

            debug!(provider = %adapter.provider(), candidate = %candidate, "Resolving");

            // An unfinished candidate is simply left unchecked
            let resolution = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StopReason::Interrupted),
                resolution = adapter.resolve(candidate) => resolution,
            };
            self.candidates += 1;

            self.tracker.record_unresolved(resolution.unresolved);
            let mut control = Control::Continue;
            for outcome in resolution.outcomes {
                if self.tracker.record(outcome) == Control::Stop {
                    control = Control::Stop;
                }
            }

            if self.candidates % checkpoint_every == 0 {
                info!(
                    provider = %adapter.provider(),
                    candidate = %candidate,
                    processed = self.candidates,
                    "Checkpoint"
                );
                self.store.flush(&self.tracker)?;
                self.checkpoints += 1;
            }

            if control == Control::Stop {
                return Ok(StopReason::EarlyStop);
            }

            match resolution.flow {
                Flow::More => {}
                Flow::Exhausted => return Ok(StopReason::Completed),
                Flow::Unavailable(reason) => {
                    warn!(
                        provider = %adapter.provider(),
                        candidate = %candidate,
                        reason = %reason,
                        "Source unavailable, ending scan"
                    );
                    return Ok(StopReason::SourceUnavailable(reason.to_string()));
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::EarlyStop.to_string(), "early stop");
        assert_eq!(
            StopReason::SourceUnavailable("HTTP status 502".into()).to_string(),
            "source unavailable: HTTP status 502"
        );
    }
}
