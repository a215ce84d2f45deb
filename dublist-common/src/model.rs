//! Catalog identifiers and on-disk document shapes
//!
//! Every persisted document keeps id arrays sorted ascending so that
//! rewriting unchanged state produces byte-identical files.

use crate::json_store;
use crate::language::LanguageKey;
use crate::layout::DataLayout;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// Primary identifier for a title, shared join key across all providers
pub type CatalogId = i64;

pub const LICENSE: &str = "CC BY 4.0 - https://creativecommons.org/licenses/by/4.0/";
pub const ATTRIBUTION: &str = "MyDubList - https://mydublist.com - (CC BY 4.0)";
pub const ORIGIN: &str = "https://github.com/Joelis57/MyDubList";

/// Treat `null` the same as a missing array
fn nullable_ids<'de, D>(deserializer: D) -> std::result::Result<Vec<CatalogId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<CatalogId>>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Fact sets
// ============================================================================

/// Per-language sets of catalog ids asserted dubbed by one source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactSet {
    by_language: BTreeMap<LanguageKey, BTreeSet<CatalogId>>,
}

impl FactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, language: LanguageKey, id: CatalogId) {
        self.by_language.entry(language).or_default().insert(id);
    }

    /// Replace the whole id set for one language
    pub fn set(&mut self, language: LanguageKey, ids: BTreeSet<CatalogId>) {
        self.by_language.insert(language, ids);
    }

    pub fn ids(&self, language: &LanguageKey) -> Option<&BTreeSet<CatalogId>> {
        self.by_language.get(language)
    }

    pub fn contains(&self, language: &LanguageKey, id: CatalogId) -> bool {
        self.by_language
            .get(language)
            .is_some_and(|ids| ids.contains(&id))
    }

    pub fn languages(&self) -> impl Iterator<Item = &LanguageKey> {
        self.by_language.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LanguageKey, &BTreeSet<CatalogId>)> {
        self.by_language.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.by_language.values().all(|ids| ids.is_empty())
    }

    /// Load every `dubbed_<lang>.json` in a provider directory
    ///
    /// A missing directory is an empty fact set. A corrupt file is an empty
    /// set for that language only.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut facts = FactSet::new();
        for (language, path) in DataLayout::language_files(dir)? {
            let file: FactFile = json_store::load_json_or_default(&path);
            debug!(
                path = %path.display(),
                language = %language,
                count = file.dubbed.len(),
                "Loaded fact file"
            );
            facts.set(language, file.dubbed.into_iter().collect());
        }
        Ok(facts)
    }
}

// ============================================================================
// Documents
// ============================================================================

/// Per-(provider, language) fact file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FactFile {
    #[serde(rename = "_license", default)]
    pub license: String,
    #[serde(rename = "_attribution", default)]
    pub attribution: String,
    #[serde(rename = "_origin", default)]
    pub origin: String,
    #[serde(default)]
    pub language: String,
    #[serde(default, deserialize_with = "nullable_ids")]
    pub dubbed: Vec<CatalogId>,
}

impl FactFile {
    /// Build a fact file with the standard attribution header
    pub fn new<'a>(language: &LanguageKey, ids: impl IntoIterator<Item = &'a CatalogId>) -> Self {
        let mut dubbed: Vec<CatalogId> = ids.into_iter().copied().collect();
        dubbed.sort_unstable();
        dubbed.dedup();
        Self {
            license: LICENSE.to_string(),
            attribution: ATTRIBUTION.to_string(),
            origin: ORIGIN.to_string(),
            language: language.display_name(),
            dubbed,
        }
    }
}

/// Human-curated corrections for one language
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ManualOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Force-include
    #[serde(default, deserialize_with = "nullable_ids")]
    pub dubbed: Vec<CatalogId>,
    /// Force-exclude, highest priority
    #[serde(default, deserialize_with = "nullable_ids")]
    pub not_dubbed: Vec<CatalogId>,
    /// Force-exclude from every tier, tracked separately; kept verbatim
    #[serde(rename = "incomplete", alias = "partial", default, deserialize_with = "nullable_ids")]
    pub partial: Vec<CatalogId>,
}

/// One confidence tier's output for one language
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierOutputFile {
    #[serde(rename = "_license")]
    pub license: String,
    #[serde(rename = "_attribution")]
    pub attribution: String,
    #[serde(rename = "_origin")]
    pub origin: String,
    pub language: String,
    pub confidence: String,
    pub dubbed: Vec<CatalogId>,
    pub incomplete: Vec<CatalogId>,
}

/// Raw support counts for one language
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CountsDocument {
    pub language: String,
    /// id → number of distinct providers asserting the dub
    pub counts: BTreeMap<CatalogId, u32>,
    /// Manual partial list, verbatim
    pub incomplete: Vec<CatalogId>,
}

/// Ids confirmed permanently absent from the primary catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MissingIdFile {
    #[serde(default)]
    pub high_water_mark: Option<CatalogId>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "nullable_ids")]
    pub missing: Vec<CatalogId>,
}

/// Row of the language index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageIndexEntry {
    pub key: String,
    pub english_name: String,
    pub native_name: String,
    pub file: String,
    /// Tier name → dubbed count at that tier
    pub dubbed_counts: BTreeMap<String, usize>,
    pub incomplete_count: usize,
}

/// `final/_languages.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LanguageIndex {
    pub languages: Vec<LanguageIndexEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_file_sorts_and_dedups() {
        let lang = LanguageKey::from_canonical("english");
        let file = FactFile::new(&lang, &[300, 100, 200, 100]);
        assert_eq!(file.dubbed, vec![100, 200, 300]);
        assert_eq!(file.language, "English");
    }

    #[test]
    fn test_manual_override_reads_incomplete_and_nulls() {
        let json = r#"{"dubbed": [1, 2], "not_dubbed": null, "incomplete": [9, 3]}"#;
        let manual: ManualOverride = serde_json::from_str(json).unwrap();
        assert_eq!(manual.dubbed, vec![1, 2]);
        assert!(manual.not_dubbed.is_empty());
        assert_eq!(manual.partial, vec![9, 3]);

        let alias = r#"{"partial": [4]}"#;
        let manual: ManualOverride = serde_json::from_str(alias).unwrap();
        assert_eq!(manual.partial, vec![4]);
    }

    #[test]
    fn test_counts_document_keys_are_numeric_order() {
        let mut doc = CountsDocument::default();
        doc.counts.insert(1000, 1);
        doc.counts.insert(20, 3);
        doc.counts.insert(3, 2);
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains(r#""counts":{"3":2,"20":3,"1000":1}"#));
    }

    #[test]
    fn test_fact_set_membership() {
        let lang = LanguageKey::from_canonical("german");
        let mut facts = FactSet::new();
        assert!(facts.is_empty());
        facts.insert(lang.clone(), 5);
        assert!(facts.contains(&lang, 5));
        assert!(!facts.contains(&lang, 6));
        assert_eq!(facts.languages().count(), 1);
    }
}
