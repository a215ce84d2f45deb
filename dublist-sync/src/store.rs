//! Per-provider persisted state for one adapter run
//!
//! Loads the provider's fact set and missing-id cache at run start and
//! rewrites them from the tracker's state at every checkpoint. The fact set
//! written is always `reconcile(baseline, removable, found)` against the
//! state loaded at start, so repeated checkpoints converge on the same files.
//! The cache file is only touched when the tracker keeps one.

use crate::tracker::{reconcile, CrawlTracker, MissingIdCache};
use dublist_common::json_store;
use dublist_common::model::FactFile;
use dublist_common::{DataLayout, FactSet, Result};
use chrono::Utc;
use std::path::PathBuf;
use tracing::{debug, info};

/// What one flush touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub languages_written: usize,
    pub cache_written: bool,
}

pub struct ProviderRunStore {
    provider: String,
    provider_dir: PathBuf,
    cache_path: PathBuf,
    baseline: FactSet,
    /// Last state known to be on disk
    written: FactSet,
    written_cache: MissingIdCache,
}

impl ProviderRunStore {
    /// Load `sources/automatic_<provider>/` and `cache/<provider>_missing_ids.json`
    pub fn open(layout: &DataLayout, provider: &str) -> Result<Self> {
        let provider_dir = layout.provider_dir(provider);
        let cache_path = layout.missing_cache_path(provider);

        let baseline = FactSet::load_dir(&provider_dir)?;
        let cache = MissingIdCache::load(&cache_path);

        info!(
            provider,
            languages = baseline.languages().count(),
            cached_missing = cache.len(),
            high_water_mark = ?cache.high_water_mark(),
            "Loaded provider state"
        );

        Ok(Self {
            provider: provider.to_string(),
            provider_dir,
            cache_path,
            written: baseline.clone(),
            baseline,
            written_cache: cache,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn baseline(&self) -> &FactSet {
        &self.baseline
    }

    /// Missing-id cache as loaded, to seed the run's tracker
    pub fn missing_cache(&self) -> MissingIdCache {
        self.written_cache.clone()
    }

    /// Persist the tracker's view; languages whose set did not change are not rewritten
    pub fn flush(&mut self, tracker: &CrawlTracker) -> Result<FlushReport> {
        let merged = reconcile(&self.baseline, tracker.removable(), tracker.found());
        let mut report = FlushReport::default();

        for (language, ids) in merged.iter() {
            if self.written.ids(language) == Some(ids) {
                continue;
            }
            let path = self.provider_dir.join(DataLayout::fact_file_name(language));
            json_store::save_json(&path, &FactFile::new(language, ids))?;
            debug!(
                provider = %self.provider,
                language = %language,
                count = ids.len(),
                "Wrote fact file"
            );
            report.languages_written += 1;
        }
        self.written = merged;

        if let Some(cache) = tracker.missing_cache() {
            if cache != &self.written_cache {
                let mut file = cache.to_file();
                file.updated_at = Some(Utc::now());
                json_store::save_json(&self.cache_path, &file)?;
                self.written_cache = cache.clone();
                report.cache_written = true;
            }
        }

        debug!(
            provider = %self.provider,
            languages_written = report.languages_written,
            cache_written = report.cache_written,
            "Checkpoint flushed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::IdOutcome;
    use dublist_common::LanguageKey;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn english() -> LanguageKey {
        LanguageKey::from_canonical("english")
    }

    fn seed(layout: &DataLayout, ids: &[i64]) -> PathBuf {
        let path = layout
            .provider_dir("mal")
            .join(DataLayout::fact_file_name(&english()));
        json_store::save_json(&path, &FactFile::new(&english(), ids)).unwrap();
        path
    }

    #[test]
    fn test_transient_leaves_file_byte_identical() {
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path());
        let path = seed(&layout, &[5, 42]);
        let before = std::fs::read(&path).unwrap();

        let mut store = ProviderRunStore::open(&layout, "mal").unwrap();
        let mut tracker = CrawlTracker::new(Some(store.missing_cache()), 500);
        tracker.record(IdOutcome::failed(42));
        let report = store.flush(&tracker).unwrap();

        assert_eq!(report.languages_written, 0);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_verified_absent_is_removed_and_cached() {
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path());
        let path = seed(&layout, &[5, 42]);

        let mut store = ProviderRunStore::open(&layout, "mal").unwrap();
        let mut tracker = CrawlTracker::new(Some(store.missing_cache()), 500);
        tracker.record(IdOutcome::absent(42));
        tracker.record(IdOutcome::present(60, [english()].into_iter().collect()));
        let report = store.flush(&tracker).unwrap();

        assert_eq!(report.languages_written, 1);
        assert!(report.cache_written);

        let file: FactFile = json_store::load_json(&path).unwrap().unwrap();
        assert_eq!(file.dubbed, vec![5, 60]);

        let cache = MissingIdCache::load(&layout.missing_cache_path("mal"));
        assert!(cache.contains(42));
        assert_eq!(cache.high_water_mark(), Some(60));
    }

    #[test]
    fn test_repeated_flush_writes_nothing_new() {
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path());

        let mut store = ProviderRunStore::open(&layout, "anilist").unwrap();
        let mut tracker = CrawlTracker::new(Some(store.missing_cache()), 500);
        tracker.record(IdOutcome::present(1, [english()].into_iter().collect()));

        let first = store.flush(&tracker).unwrap();
        assert_eq!(first.languages_written, 1);
        let second = store.flush(&tracker).unwrap();
        assert_eq!(second, FlushReport::default());
    }

    #[test]
    fn test_corrupt_fact_file_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path());
        let path = layout
            .provider_dir("mal")
            .join(DataLayout::fact_file_name(&english()));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let store = ProviderRunStore::open(&layout, "mal").unwrap();
        assert_eq!(store.baseline().ids(&english()), Some(&BTreeSet::new()));
    }

    #[test]
    fn test_tracker_without_cache_leaves_cache_file_alone() {
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path());

        let mut store = ProviderRunStore::open(&layout, "anilist").unwrap();
        let mut tracker = CrawlTracker::new(None, 500);
        tracker.record(IdOutcome::present(1, [english()].into_iter().collect()));
        let report = store.flush(&tracker).unwrap();

        assert_eq!(report.languages_written, 1);
        assert!(!report.cache_written);
        assert!(!layout.missing_cache_path("anilist").exists());
    }

    #[test]
    fn test_additions_only_keeps_checked_ids() {
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path());
        let path = seed(&layout, &[10]);
        let before = std::fs::read(&path).unwrap();

        let mut store = ProviderRunStore::open(&layout, "mal").unwrap();
        let mut tracker = CrawlTracker::new(None, 500);
        tracker.record(IdOutcome::present(10, BTreeSet::new()));
        tracker.record_unresolved(1);
        store.flush(&tracker).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }
}
