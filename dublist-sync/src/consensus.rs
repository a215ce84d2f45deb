//! Consensus merge
//!
//! Recomputes every output from scratch: all provider fact sets plus the
//! manual overrides in, tiered lists and counts out. Nothing is patched
//! incrementally, so unchanged inputs give byte-identical outputs.
//!
//! Per language and tier threshold `t`:
//!
//! ```text
//! tier(t) = (manual.dubbed ∪ {id : support(id) ≥ t}) − manual.not_dubbed − manual.partial
//! ```
//!
//! `support(id)` counts distinct providers only. Manual `dubbed` is applied
//! after thresholding and never counts as a vote.

use dublist_common::json_store;
use dublist_common::model::{
    CountsDocument, FactFile, LanguageIndex, LanguageIndexEntry, ManualOverride, TierOutputFile,
    ATTRIBUTION, LICENSE, ORIGIN,
};
use dublist_common::{CatalogId, DataLayout, FactSet, LanguageKey, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Ordered confidence buckets over provider support
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfidenceTier {
    Low = 1,
    Normal = 2,
    High = 3,
    VeryHigh = 4,
}

impl ConfidenceTier {
    pub const ALL: [ConfidenceTier; 4] = [
        ConfidenceTier::Low,
        ConfidenceTier::Normal,
        ConfidenceTier::High,
        ConfidenceTier::VeryHigh,
    ];

    /// Minimum number of agreeing providers
    pub fn threshold(self) -> u32 {
        self as u32
    }

    /// Output directory name under `final/`
    pub fn name(self) -> &'static str {
        match self {
            ConfidenceTier::Low => "low",
            ConfidenceTier::Normal => "normal",
            ConfidenceTier::High => "high",
            ConfidenceTier::VeryHigh => "very_high",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything known about one language
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LanguageEvidence {
    /// provider → ids it asserts dubbed
    pub providers: BTreeMap<String, BTreeSet<CatalogId>>,
    pub manual: ManualOverride,
}

/// Computed result for one language
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageConsensus {
    /// Support per id; manual-only `dubbed` ids appear with 0
    pub counts: BTreeMap<CatalogId, u32>,
    pub tiers: BTreeMap<ConfidenceTier, BTreeSet<CatalogId>>,
    /// Manual partial ids, sorted and deduplicated
    pub partial: BTreeSet<CatalogId>,
}

impl LanguageConsensus {
    pub fn tier(&self, tier: ConfidenceTier) -> &BTreeSet<CatalogId> {
        static EMPTY: BTreeSet<CatalogId> = BTreeSet::new();
        self.tiers.get(&tier).unwrap_or(&EMPTY)
    }
}

/// Number of distinct providers asserting each id
pub fn support_counts(evidence: &LanguageEvidence) -> BTreeMap<CatalogId, u32> {
    let mut counts = BTreeMap::new();
    for ids in evidence.providers.values() {
        for id in ids {
            *counts.entry(*id).or_insert(0) += 1;
        }
    }
    counts
}

pub fn compute_language(evidence: &LanguageEvidence) -> LanguageConsensus {
    let support = support_counts(evidence);

    let forced: BTreeSet<CatalogId> = evidence.manual.dubbed.iter().copied().collect();
    let excluded: BTreeSet<CatalogId> = evidence.manual.not_dubbed.iter().copied().collect();
    let partial: BTreeSet<CatalogId> = evidence.manual.partial.iter().copied().collect();

    let mut tiers = BTreeMap::new();
    for tier in ConfidenceTier::ALL {
        let result: BTreeSet<CatalogId> = support
            .iter()
            .filter(|(_, count)| **count >= tier.threshold())
            .map(|(id, _)| *id)
            .chain(forced.iter().copied())
            .filter(|id| !excluded.contains(id) && !partial.contains(id))
            .collect();
        tiers.insert(tier, result);
    }

    let mut counts = support;
    for id in &forced {
        counts.entry(*id).or_insert(0);
    }

    LanguageConsensus {
        counts,
        tiers,
        partial,
    }
}

/// Totals for one merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub languages: usize,
    pub files_written: usize,
    pub files_removed: usize,
    /// `normal` tier ids gained, across languages
    pub normal_added: usize,
    /// `normal` tier ids lost, across languages
    pub normal_removed: usize,
}

pub struct ConsensusEngine {
    layout: DataLayout,
}

impl ConsensusEngine {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    /// Read every provider directory and the manual directory
    pub fn gather(&self) -> Result<BTreeMap<LanguageKey, LanguageEvidence>> {
        let mut evidence: BTreeMap<LanguageKey, LanguageEvidence> = BTreeMap::new();

        for provider in self.layout.providers()? {
            let facts = FactSet::load_dir(&self.layout.provider_dir(&provider))?;
            debug!(provider = %provider, languages = facts.languages().count(), "Loaded provider");
            for (language, ids) in facts.iter() {
                evidence
                    .entry(language.clone())
                    .or_default()
                    .providers
                    .insert(provider.clone(), ids.clone());
            }
        }

        for (language, path) in DataLayout::language_files(&self.layout.manual_dir())? {
            let manual: ManualOverride = json_store::load_json_or_default(&path);
            evidence.entry(language).or_default().manual = manual;
        }

        Ok(evidence)
    }

    /// Regenerate `final/` from the current inputs
    pub fn run(&self) -> Result<MergeReport> {
        let evidence = self.gather()?;
        let mut report = MergeReport {
            languages: evidence.len(),
            ..MergeReport::default()
        };
        let mut index = Vec::with_capacity(evidence.len());

        for (language, language_evidence) in &evidence {
            let consensus = compute_language(language_evidence);
            let file_name = DataLayout::fact_file_name(language);
            let partial: Vec<CatalogId> = consensus.partial.iter().copied().collect();

            let normal_path = self.layout.tier_dir(ConfidenceTier::Normal.name()).join(&file_name);
            let previous: FactFile = json_store::load_json_or_default(&normal_path);
            let previous: BTreeSet<CatalogId> = previous.dubbed.into_iter().collect();
            let current = consensus.tier(ConfidenceTier::Normal);
            let added = current.difference(&previous).count();
            let removed = previous.difference(current).count();
            if added > 0 || removed > 0 {
                info!(language = %language, added, removed, "Normal tier changed");
            }
            report.normal_added += added;
            report.normal_removed += removed;

            let mut dubbed_counts = BTreeMap::new();
            for tier in ConfidenceTier::ALL {
                let ids = consensus.tier(tier);
                let output = TierOutputFile {
                    license: LICENSE.to_string(),
                    attribution: ATTRIBUTION.to_string(),
                    origin: ORIGIN.to_string(),
                    language: language.display_name(),
                    confidence: tier.name().to_string(),
                    dubbed: ids.iter().copied().collect(),
                    incomplete: partial.clone(),
                };
                let path = self.layout.tier_dir(tier.name()).join(&file_name);
                if json_store::save_json_if_changed(&path, &output)? {
                    report.files_written += 1;
                }
                dubbed_counts.insert(tier.name().to_string(), ids.len());
            }

            let counts = CountsDocument {
                language: language.display_name(),
                counts: consensus.counts.clone(),
                incomplete: language_evidence.manual.partial.clone(),
            };
            let path = self.layout.counts_dir().join(&file_name);
            if json_store::save_json_if_changed(&path, &counts)? {
                report.files_written += 1;
            }

            index.push(LanguageIndexEntry {
                key: language.as_str().to_string(),
                english_name: language.english_name(),
                native_name: language.native_name(),
                file: file_name,
                dubbed_counts,
                incomplete_count: consensus.partial.len(),
            });
        }

        let live: BTreeSet<&LanguageKey> = evidence.keys().collect();
        for tier in ConfidenceTier::ALL {
            report.files_removed += remove_stale(&self.layout.tier_dir(tier.name()), &live)?;
        }
        report.files_removed += remove_stale(&self.layout.counts_dir(), &live)?;

        let normal = ConfidenceTier::Normal.name();
        index.sort_by(|a, b| {
            let a_count = a.dubbed_counts.get(normal).copied().unwrap_or(0);
            let b_count = b.dubbed_counts.get(normal).copied().unwrap_or(0);
            b_count.cmp(&a_count).then_with(|| a.key.cmp(&b.key))
        });
        let index = LanguageIndex { languages: index };
        if json_store::save_json_if_changed(&self.layout.language_index_path(), &index)? {
            report.files_written += 1;
        }

        info!(
            languages = report.languages,
            files_written = report.files_written,
            files_removed = report.files_removed,
            normal_added = report.normal_added,
            normal_removed = report.normal_removed,
            "Merge complete"
        );
        Ok(report)
    }
}

/// Delete language files in `dir` whose language has no inputs left
fn remove_stale(dir: &Path, live: &BTreeSet<&LanguageKey>) -> Result<usize> {
    let mut removed = 0;
    for (language, path) in DataLayout::language_files(dir)? {
        if live.contains(&language) {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "Removed stale output");
                removed += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Could not remove stale output"),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[CatalogId]) -> BTreeSet<CatalogId> {
        values.iter().copied().collect()
    }

    fn evidence(providers: &[(&str, &[CatalogId])], manual: ManualOverride) -> LanguageEvidence {
        LanguageEvidence {
            providers: providers
                .iter()
                .map(|(name, values)| (name.to_string(), ids(values)))
                .collect(),
            manual,
        }
    }

    #[test]
    fn test_two_providers_with_overrides() {
        let manual = ManualOverride {
            dubbed: vec![400],
            not_dubbed: vec![300],
            ..ManualOverride::default()
        };
        let result = compute_language(&evidence(&[("p1", &[100, 200]), ("p2", &[200, 300])], manual));

        assert_eq!(
            result.counts,
            [(100, 1), (200, 2), (300, 2), (400, 0)].into_iter().collect()
        );
        assert_eq!(result.tier(ConfidenceTier::Normal), &ids(&[200, 400]));
        assert_eq!(result.tier(ConfidenceTier::Low), &ids(&[100, 200, 400]));
        // Manual dubbed survives every threshold
        assert_eq!(result.tier(ConfidenceTier::VeryHigh), &ids(&[400]));
    }

    #[test]
    fn test_not_dubbed_beats_dubbed() {
        let manual = ManualOverride {
            dubbed: vec![7],
            not_dubbed: vec![7],
            ..ManualOverride::default()
        };
        let result = compute_language(&evidence(&[("p1", &[7]), ("p2", &[7])], manual));
        for tier in ConfidenceTier::ALL {
            assert!(!result.tier(tier).contains(&7));
        }
    }

    #[test]
    fn test_partial_never_in_tiers() {
        let manual = ManualOverride {
            dubbed: vec![9],
            partial: vec![9, 5, 9],
            ..ManualOverride::default()
        };
        let result = compute_language(&evidence(
            &[("a", &[5, 9]), ("b", &[5, 9]), ("c", &[5, 9]), ("d", &[5, 9])],
            manual,
        ));
        for tier in ConfidenceTier::ALL {
            assert!(result.tier(tier).is_empty());
        }
        assert_eq!(result.partial, ids(&[5, 9]));
    }

    #[test]
    fn test_tiers_nest() {
        let result = compute_language(&evidence(
            &[("a", &[1, 2, 3, 4]), ("b", &[2, 3, 4]), ("c", &[3, 4]), ("d", &[4])],
            ManualOverride::default(),
        ));
        for pair in ConfidenceTier::ALL.windows(2) {
            assert!(result.tier(pair[0]).is_superset(result.tier(pair[1])));
        }
        assert_eq!(result.tier(ConfidenceTier::High), &ids(&[3, 4]));
    }

    #[test]
    fn test_tier_names() {
        let names: Vec<_> = ConfidenceTier::ALL.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["low", "normal", "high", "very_high"]);
        assert_eq!(ConfidenceTier::VeryHigh.threshold(), 4);
    }
}
