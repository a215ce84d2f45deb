//! Data folder layout
//!
//! ```text
//! <root>/sources/automatic_<provider>/dubbed_<lang>.json
//! <root>/sources/manual/dubbed_<lang>.json
//! <root>/cache/<provider>_missing_ids.json
//! <root>/final/<tier>/dubbed_<lang>.json
//! <root>/final/counts/dubbed_<lang>.json
//! <root>/final/_languages.json
//! ```

use crate::language::LanguageKey;
use crate::Result;
use std::path::{Path, PathBuf};

const PROVIDER_DIR_PREFIX: &str = "automatic_";
const FACT_FILE_PREFIX: &str = "dubbed_";
const FACT_FILE_SUFFIX: &str = ".json";

/// Resolved paths under one data root
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.root.join("sources")
    }

    pub fn provider_dir(&self, provider: &str) -> PathBuf {
        self.sources_dir()
            .join(format!("{}{}", PROVIDER_DIR_PREFIX, provider))
    }

    pub fn manual_dir(&self) -> PathBuf {
        self.sources_dir().join("manual")
    }

    pub fn missing_cache_path(&self, provider: &str) -> PathBuf {
        self.root
            .join("cache")
            .join(format!("{}_missing_ids.json", provider))
    }

    pub fn final_dir(&self) -> PathBuf {
        self.root.join("final")
    }

    pub fn tier_dir(&self, tier: &str) -> PathBuf {
        self.final_dir().join(tier)
    }

    pub fn counts_dir(&self) -> PathBuf {
        self.final_dir().join("counts")
    }

    pub fn language_index_path(&self) -> PathBuf {
        self.final_dir().join("_languages.json")
    }

    /// `dubbed_<token>.json`
    pub fn fact_file_name(language: &LanguageKey) -> String {
        format!(
            "{}{}{}",
            FACT_FILE_PREFIX,
            language.file_token(),
            FACT_FILE_SUFFIX
        )
    }

    /// Providers with a directory under `sources/`, sorted by name
    pub fn providers(&self) -> Result<Vec<String>> {
        let dir = self.sources_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut providers = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(provider) = name.strip_prefix(PROVIDER_DIR_PREFIX) {
                if !provider.is_empty() {
                    providers.push(provider.to_string());
                }
            }
        }
        providers.sort();
        Ok(providers)
    }

    /// Every `dubbed_<lang>.json` in `dir`, sorted by language
    ///
    /// A missing directory yields an empty list.
    pub fn language_files(dir: &Path) -> Result<Vec<(LanguageKey, PathBuf)>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let token = name
                .strip_prefix(FACT_FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(FACT_FILE_SUFFIX));
            if let Some(token) = token {
                if !token.is_empty() && entry.file_type()?.is_file() {
                    files.push((LanguageKey::from_file_token(token), entry.path()));
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths() {
        let layout = DataLayout::new("/data");
        assert_eq!(layout.provider_dir("mal"), PathBuf::from("/data/sources/automatic_mal"));
        assert_eq!(layout.manual_dir(), PathBuf::from("/data/sources/manual"));
        assert_eq!(
            layout.missing_cache_path("mal"),
            PathBuf::from("/data/cache/mal_missing_ids.json")
        );
        assert_eq!(layout.tier_dir("very_high"), PathBuf::from("/data/final/very_high"));
        let lang = LanguageKey::from_canonical("old norse");
        assert_eq!(DataLayout::fact_file_name(&lang), "dubbed_old_norse.json");
    }

    #[test]
    fn test_discovery_ignores_unrelated_entries() {
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path());
        std::fs::create_dir_all(layout.provider_dir("mal")).unwrap();
        std::fs::create_dir_all(layout.provider_dir("anilist")).unwrap();
        std::fs::create_dir_all(layout.manual_dir()).unwrap();
        std::fs::write(layout.sources_dir().join("automatic_file.json"), "{}").unwrap();

        assert_eq!(layout.providers().unwrap(), vec!["anilist", "mal"]);

        let mal = layout.provider_dir("mal");
        std::fs::write(mal.join("dubbed_english.json"), "{}").unwrap();
        std::fs::write(mal.join("dubbed_old_norse.json"), "{}").unwrap();
        std::fs::write(mal.join("notes.txt"), "").unwrap();
        let langs: Vec<String> = DataLayout::language_files(&mal)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k.to_string())
            .collect();
        assert_eq!(langs, vec!["english", "old norse"]);
    }
}
