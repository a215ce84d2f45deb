//! Crawl verification tracker
//!
//! Classifies each catalog id touched by a scan and decides what the run is
//! allowed to conclude about it:
//!
//! ```text
//! Unchecked ─┬─> VerifiedPresent   (whole lookup chain completed, even with zero languages)
//!            ├─> VerifiedAbsent    (primary lookup was an authoritative miss)
//!            └─> TransientlyFailed (any lookup in the chain gave up)
//! ```
//!
//! Only verified ids enter the checked set, and only checked ids may be
//! removed from a provider's persisted fact set (see [`reconcile`]).
//!
//! Some sources hand back lookups that failed before their catalog id was
//! known. Such a run can no longer prove any absence, so the tracker drops to
//! additions only: [`CrawlTracker::removable`] is empty from then on.

use dublist_common::json_store;
use dublist_common::model::MissingIdFile;
use dublist_common::{CatalogId, FactSet, LanguageKey};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Final state of one id for this run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    VerifiedPresent,
    VerifiedAbsent,
    TransientlyFailed,
}

/// Classified outcome for one catalog id
#[derive(Debug, Clone, PartialEq)]
pub struct IdOutcome {
    pub id: CatalogId,
    pub languages: BTreeSet<LanguageKey>,
    pub verdict: Verdict,
}

impl IdOutcome {
    pub fn present(id: CatalogId, languages: BTreeSet<LanguageKey>) -> Self {
        Self {
            id,
            languages,
            verdict: Verdict::VerifiedPresent,
        }
    }

    pub fn absent(id: CatalogId) -> Self {
        Self {
            id,
            languages: BTreeSet::new(),
            verdict: Verdict::VerifiedAbsent,
        }
    }

    pub fn failed(id: CatalogId) -> Self {
        Self {
            id,
            languages: BTreeSet::new(),
            verdict: Verdict::TransientlyFailed,
        }
    }
}

/// Whether the scan should keep going after a recorded outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

// ============================================================================
// Missing-id cache
// ============================================================================

/// Ids confirmed absent from the primary catalog
///
/// A cached absence is trusted only up to the high-water mark, the highest
/// id seen to exist. Ids above the mark may simply not exist yet and are
/// always re-checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissingIdCache {
    high_water_mark: Option<CatalogId>,
    missing: BTreeSet<CatalogId>,
}

impl MissingIdCache {
    pub fn new(high_water_mark: Option<CatalogId>, missing: BTreeSet<CatalogId>) -> Self {
        Self {
            high_water_mark,
            missing,
        }
    }

    /// Load from disk; missing or corrupt files give an empty cache
    pub fn load(path: &Path) -> Self {
        let file: MissingIdFile = json_store::load_json_or_default(path);
        Self::from_file(file)
    }

    pub fn from_file(file: MissingIdFile) -> Self {
        Self {
            high_water_mark: file.high_water_mark,
            missing: file.missing.into_iter().collect(),
        }
    }

    /// Document shape without a timestamp; the store stamps it on write
    pub fn to_file(&self) -> MissingIdFile {
        MissingIdFile {
            high_water_mark: self.high_water_mark,
            updated_at: None,
            missing: self.missing.iter().copied().collect(),
        }
    }

    pub fn high_water_mark(&self) -> Option<CatalogId> {
        self.high_water_mark
    }

    pub fn contains(&self, id: CatalogId) -> bool {
        self.missing.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.missing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }

    /// Cached absence that is still trustworthy
    pub fn should_skip(&self, id: CatalogId) -> bool {
        self.missing.contains(&id) && self.high_water_mark.is_some_and(|mark| id <= mark)
    }

    fn mark_missing(&mut self, id: CatalogId) {
        self.missing.insert(id);
    }

    fn mark_present(&mut self, id: CatalogId) {
        self.missing.remove(&id);
        if self.high_water_mark.map_or(true, |mark| id > mark) {
            self.high_water_mark = Some(id);
        }
    }
}

// ============================================================================
// Tracker
// ============================================================================

static NO_REMOVALS: BTreeSet<CatalogId> = BTreeSet::new();

/// Per-run verdict counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub present: usize,
    pub absent: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Per-run state of a crawl over one provider
pub struct CrawlTracker {
    checked: BTreeSet<CatalogId>,
    found: FactSet,
    /// Only id-range scans keep a missing-id cache
    missing: Option<MissingIdCache>,
    additions_only: bool,
    consecutive_absent: u32,
    /// 0 disables early termination
    early_stop_after: u32,
    stats: TrackerStats,
}

impl CrawlTracker {
    pub fn new(missing: Option<MissingIdCache>, early_stop_after: u32) -> Self {
        Self {
            checked: BTreeSet::new(),
            found: FactSet::new(),
            missing,
            additions_only: false,
            consecutive_absent: 0,
            early_stop_after,
            stats: TrackerStats::default(),
        }
    }

    /// True when the id is a trusted cached absence; counts it as skipped
    pub fn skip_cached_missing(&mut self, id: CatalogId) -> bool {
        if self.missing.as_ref().is_some_and(|cache| cache.should_skip(id)) {
            self.stats.skipped += 1;
            debug!(id, "Skipping cached missing id");
            true
        } else {
            false
        }
    }

    pub fn record(&mut self, outcome: IdOutcome) -> Control {
        let IdOutcome {
            id,
            languages,
            verdict,
        } = outcome;

        match verdict {
            Verdict::VerifiedPresent => {
                self.checked.insert(id);
                for language in languages {
                    self.found.insert(language, id);
                }
                if let Some(cache) = self.missing.as_mut() {
                    cache.mark_present(id);
                }
                self.consecutive_absent = 0;
                self.stats.present += 1;
                Control::Continue
            }
            Verdict::VerifiedAbsent => {
                self.checked.insert(id);
                if let Some(cache) = self.missing.as_mut() {
                    cache.mark_missing(id);
                }
                self.consecutive_absent += 1;
                self.stats.absent += 1;

                if self.early_stop_after > 0 && self.consecutive_absent >= self.early_stop_after {
                    info!(
                        id,
                        consecutive = self.consecutive_absent,
                        "Consecutive misses reached threshold, assuming end of live range"
                    );
                    Control::Stop
                } else {
                    Control::Continue
                }
            }
            Verdict::TransientlyFailed => {
                // Not checked, not counted towards the miss streak, cache untouched
                self.stats.failed += 1;
                debug!(id, "Transient failure, prior state preserved");
                Control::Continue
            }
        }
    }

    /// Lookups that failed before yielding an id; removals are off for the rest of the run
    pub fn record_unresolved(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.stats.failed += count;
        if !self.additions_only {
            warn!(count, "Unresolved lookups, this run will only add ids");
            self.additions_only = true;
        }
    }

    pub fn additions_only(&self) -> bool {
        self.additions_only
    }

    pub fn checked(&self) -> &BTreeSet<CatalogId> {
        &self.checked
    }

    /// Ids this run may remove: the checked set, or nothing once additions only
    pub fn removable(&self) -> &BTreeSet<CatalogId> {
        if self.additions_only {
            &NO_REMOVALS
        } else {
            &self.checked
        }
    }

    pub fn found(&self) -> &FactSet {
        &self.found
    }

    pub fn missing_cache(&self) -> Option<&MissingIdCache> {
        self.missing.as_ref()
    }

    pub fn consecutive_absent(&self) -> u32 {
        self.consecutive_absent
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }
}

// ============================================================================
// Removal rule
// ============================================================================

/// `(old − (old ∩ checked − found)) ∪ found` for one language
///
/// An id leaves the set only if this run checked it and did not find it.
pub fn reconcile_language(
    old: &BTreeSet<CatalogId>,
    checked: &BTreeSet<CatalogId>,
    found: &BTreeSet<CatalogId>,
) -> BTreeSet<CatalogId> {
    old.iter()
        .filter(|id| !checked.contains(id) || found.contains(id))
        .chain(found.iter())
        .copied()
        .collect()
}

/// Apply [`reconcile_language`] across every language in either set
pub fn reconcile(old: &FactSet, checked: &BTreeSet<CatalogId>, found: &FactSet) -> FactSet {
    let empty = BTreeSet::new();
    let languages: BTreeSet<&LanguageKey> = old.languages().chain(found.languages()).collect();

    let mut merged = FactSet::new();
    for language in languages {
        let old_ids = old.ids(language).unwrap_or(&empty);
        let found_ids = found.ids(language).unwrap_or(&empty);
        merged.set(
            language.clone(),
            reconcile_language(old_ids, checked, found_ids),
        );
    }
    merged
}
