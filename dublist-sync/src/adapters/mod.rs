//! Provider integrations
//!
//! Each adapter owns the call harnesses for the external systems it talks
//! to and turns their payloads into classified [`IdOutcome`]s.
//!
//! [`IdOutcome`]: crate::tracker::IdOutcome

pub mod anilist;
pub mod crunchyroll;
pub mod forum;
pub mod mal;

pub use anilist::AniListAdapter;
pub use crunchyroll::CrunchyrollAdapter;
pub use forum::{ForumSource, ForumSync};
pub use mal::MalAdapter;

use crate::config::min_interval;
use crate::harness::{CallHarness, RetryPolicy, Transport};
use dublist_common::config::TomlConfig;
use std::sync::Arc;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("dublist-sync/", env!("CARGO_PKG_VERSION"));
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the harness for `system` from the configured interval and retry policy
pub fn build_harness(
    system: &str,
    config: &TomlConfig,
    transport: Arc<dyn Transport>,
) -> Arc<CallHarness> {
    Arc::new(CallHarness::new(
        system,
        min_interval(system, config),
        RetryPolicy::from_config(&config.retry),
        transport,
    ))
}
