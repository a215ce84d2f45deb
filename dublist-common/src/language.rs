//! Language canonicalization
//!
//! Providers report dub languages in many spellings ("Portuguese (BR)",
//! "Mandarin", "Filipino", "English "). Every observation is folded to a
//! lowercase [`LanguageKey`] before it touches a fact set, so two providers
//! talking about the same dub always land in the same per-language file.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonicalized lowercase dub-language name (e.g. "english", "portuguese")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageKey(String);

impl LanguageKey {
    /// Wrap an already-canonical key
    ///
    /// Callers holding raw provider text should use [`canonicalize_language`].
    pub fn from_canonical(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Recover the key from a file token (`brazilian_portuguese` → `brazilian portuguese`)
    pub fn from_file_token(token: &str) -> Self {
        Self(token.replace('_', " "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filename-friendly token: spaces become underscores
    pub fn file_token(&self) -> String {
        self.0.replace(' ', "_")
    }

    /// Capitalized English display name ("english" → "English")
    pub fn display_name(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Title-cased English name used by the language index ("old norse" → "Old Norse")
    pub fn english_name(&self) -> String {
        self.0
            .split(' ')
            .map(|word| LanguageKey::from_canonical(word).display_name())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Native-script name when known, otherwise the English name
    pub fn native_name(&self) -> String {
        NATIVE_NAMES
            .iter()
            .find(|(key, _)| *key == self.0)
            .map(|(_, native)| native.to_string())
            .unwrap_or_else(|| self.english_name())
    }
}

impl fmt::Display for LanguageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fold a provider's raw language string into a [`LanguageKey`]
///
/// Total and deterministic. Returns `None` when nothing is left after
/// normalization (empty input, or input that was only a parenthetical).
/// Underscores read as spaces, so every key survives the trip through its
/// file token unchanged.
pub fn canonicalize_language(raw: &str) -> Option<LanguageKey> {
    let lowered = raw.replace('_', " ").trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }

    // Regional variants fold onto the base language
    if lowered.starts_with("portuguese") || lowered.starts_with("brazilian portuguese") {
        return Some(LanguageKey::from_canonical("portuguese"));
    }
    if lowered.starts_with("mandarin") {
        return Some(LanguageKey::from_canonical("chinese"));
    }

    let stripped = strip_parentheticals(&lowered);
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    match collapsed.as_str() {
        "" => None,
        "filipino" => Some(LanguageKey::from_canonical("tagalog")),
        _ => Some(LanguageKey(collapsed)),
    }
}

/// Remove every `( ... )` chunk, non-greedy, leaving unmatched `(` in place
fn strip_parentheticals(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find('(') {
        match rest[open..].find(')') {
            Some(close) => {
                out.push_str(&rest[..open]);
                rest = &rest[open + close + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

const NATIVE_NAMES: &[(&str, &str)] = &[
    ("arabic", "العربية"),
    ("catalan", "Català"),
    ("chinese", "中文"),
    ("danish", "Dansk"),
    ("dutch", "Nederlands"),
    ("english", "English"),
    ("finnish", "Suomi"),
    ("french", "Français"),
    ("german", "Deutsch"),
    ("hebrew", "עברית"),
    ("hindi", "हिन्दी"),
    ("hungarian", "Magyar"),
    ("indonesian", "Bahasa Indonesia"),
    ("italian", "Italiano"),
    ("japanese", "日本語"),
    ("korean", "한국어"),
    ("norwegian", "Norsk"),
    ("polish", "Polski"),
    ("portuguese", "Português"),
    ("russian", "Русский"),
    ("spanish", "Español"),
    ("swedish", "Svenska"),
    ("tagalog", "Tagalog"),
    ("thai", "ไทย"),
    ("turkish", "Türkçe"),
    ("vietnamese", "Tiếng Việt"),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> Option<String> {
        canonicalize_language(raw).map(|k| k.as_str().to_string())
    }

    #[test]
    fn test_regional_variants_fold() {
        assert_eq!(key("Brazilian Portuguese").as_deref(), Some("portuguese"));
        assert_eq!(key("Portuguese (BR)").as_deref(), Some("portuguese"));
        assert_eq!(key("Mandarin").as_deref(), Some("chinese"));
        assert_eq!(key("Filipino").as_deref(), Some("tagalog"));
    }

    #[test]
    fn test_parenthetical_and_whitespace() {
        assert_eq!(key("  Spanish (Latin America) ").as_deref(), Some("spanish"));
        assert_eq!(key("Old   Norse").as_deref(), Some("old norse"));
        assert_eq!(key("(unknown)"), None);
        assert_eq!(key("   "), None);
    }

    #[test]
    fn test_unmatched_paren_is_kept() {
        assert_eq!(key("german (x").as_deref(), Some("german (x"));
    }

    #[test]
    fn test_file_token_round_trip() {
        let k = LanguageKey::from_canonical("old norse");
        assert_eq!(k.file_token(), "old_norse");
        assert_eq!(LanguageKey::from_file_token("old_norse"), k);
    }

    #[test]
    fn test_underscores_fold_to_spaces() {
        assert_eq!(key("Old_Norse").as_deref(), Some("old norse"));
        assert_eq!(key("_Brazilian_Portuguese_").as_deref(), Some("portuguese"));
        assert_eq!(key("___"), None);

        let raw = canonicalize_language("Old_Norse").unwrap();
        let spaced = canonicalize_language("Old Norse").unwrap();
        assert_eq!(raw, spaced);
        assert_eq!(LanguageKey::from_file_token(&raw.file_token()), raw);
    }

    #[test]
    fn test_display_names() {
        let k = LanguageKey::from_canonical("english");
        assert_eq!(k.display_name(), "English");
        assert_eq!(k.native_name(), "English");
        assert_eq!(LanguageKey::from_canonical("french").native_name(), "Français");
        assert_eq!(LanguageKey::from_canonical("old norse").native_name(), "Old Norse");
    }
}
