//! Runtime configuration resolution for dublist-sync
//!
//! MAL client id priority: CLI → ENV → TOML.
//! Throttle intervals: TOML `[providers.<system>] min_interval_ms` → built-in table.

use dublist_common::config::TomlConfig;
use dublist_common::{Error, Result};
use std::time::Duration;
use tracing::{info, warn};

pub const MAL_CLIENT_ID_ENV_VAR: &str = "DUBLIST_MAL_CLIENT_ID";

/// External system names; each owns exactly one call harness
pub const SYSTEM_MAL: &str = "mal";
pub const SYSTEM_JIKAN: &str = "jikan";
pub const SYSTEM_ANILIST: &str = "anilist";
pub const SYSTEM_UNIQUESTREAM: &str = "uniquestream";
/// myanimelist.net web pages, separate from the MAL API
pub const SYSTEM_MAL_WEB: &str = "mal_web";

const DEFAULT_MIN_INTERVAL_MS: u64 = 1000;

/// Built-in minimum spacing between calls to one system
fn default_min_interval_ms(system: &str) -> u64 {
    match system {
        SYSTEM_MAL => 2000,
        SYSTEM_JIKAN => 1000,
        SYSTEM_ANILIST => 2000,
        SYSTEM_UNIQUESTREAM => 100,
        SYSTEM_MAL_WEB => 2000,
        _ => DEFAULT_MIN_INTERVAL_MS,
    }
}

/// Throttle interval for `system`, TOML override first
pub fn min_interval(system: &str, config: &TomlConfig) -> Duration {
    let ms = config
        .provider(system)
        .min_interval_ms
        .unwrap_or_else(|| default_min_interval_ms(system));
    Duration::from_millis(ms)
}

/// Resolve the MAL API client id from CLI, environment and TOML
pub fn resolve_mal_client_id(cli_arg: Option<&str>, config: &TomlConfig) -> Result<String> {
    let cli_key = cli_arg.filter(|k| is_valid_key(k)).map(str::to_string);
    let env_key = std::env::var(MAL_CLIENT_ID_ENV_VAR)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = config
        .provider(SYSTEM_MAL)
        .client_id
        .filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        cli_key.as_ref().map(|_| "command line"),
        env_key.as_ref().map(|_| "environment"),
        toml_key.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if sources.len() > 1 {
        warn!(
            "MAL client id found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(key) = cli_key {
        info!("MAL client id taken from command line");
        return Ok(key);
    }
    if let Some(key) = env_key {
        info!("MAL client id loaded from environment variable");
        return Ok(key);
    }
    if let Some(key) = toml_key {
        info!("MAL client id loaded from TOML config");
        return Ok(key);
    }

    Err(Error::Config(format!(
        "MAL client id not configured. Provide one of:\n\
         1. Command line: --client-id <id>\n\
         2. Environment: {}=<id>\n\
         3. TOML config: [providers.mal] client_id = \"<id>\"",
        MAL_CLIENT_ID_ENV_VAR
    )))
}

/// Non-empty, non-whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dublist_common::config::ProviderConfig;
    use serial_test::serial;

    fn config_with_mal(client_id: Option<&str>, interval: Option<u64>) -> TomlConfig {
        let mut config = TomlConfig::default();
        config.providers.insert(
            SYSTEM_MAL.to_string(),
            ProviderConfig {
                client_id: client_id.map(str::to_string),
                min_interval_ms: interval,
            },
        );
        config
    }

    #[test]
    fn test_min_interval_defaults_and_override() {
        let config = TomlConfig::default();
        assert_eq!(min_interval(SYSTEM_MAL, &config), Duration::from_secs(2));
        assert_eq!(min_interval(SYSTEM_JIKAN, &config), Duration::from_secs(1));
        assert_eq!(min_interval(SYSTEM_UNIQUESTREAM, &config), Duration::from_millis(100));

        let config = config_with_mal(None, Some(4500));
        assert_eq!(min_interval(SYSTEM_MAL, &config), Duration::from_millis(4500));
    }

    #[test]
    #[serial]
    fn test_cli_client_id_wins() {
        std::env::set_var(MAL_CLIENT_ID_ENV_VAR, "from-env");
        let config = config_with_mal(Some("from-toml"), None);
        let key = resolve_mal_client_id(Some("from-cli"), &config).unwrap();
        assert_eq!(key, "from-cli");
        std::env::remove_var(MAL_CLIENT_ID_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_env_client_id_before_toml() {
        std::env::set_var(MAL_CLIENT_ID_ENV_VAR, "from-env");
        let config = config_with_mal(Some("from-toml"), None);
        let key = resolve_mal_client_id(Some("   "), &config).unwrap();
        assert_eq!(key, "from-env");
        std::env::remove_var(MAL_CLIENT_ID_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_toml_client_id_and_missing() {
        std::env::remove_var(MAL_CLIENT_ID_ENV_VAR);
        let config = config_with_mal(Some("from-toml"), None);
        assert_eq!(resolve_mal_client_id(None, &config).unwrap(), "from-toml");

        let err = resolve_mal_client_id(None, &TomlConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
