//! dublist-sync - provider crawls and consensus merge
//!
//! Each provider run drives a [`scan::SourceAdapter`] through the
//! [`scan::ScanRunner`]. Outbound traffic goes through one
//! [`harness::CallHarness`] per external system, verdicts are classified by
//! the [`tracker::CrawlTracker`], and the per-provider fact sets are
//! persisted by the [`store::ProviderRunStore`]. The
//! [`consensus::ConsensusEngine`] later recomputes the tiered outputs from
//! every persisted source.

pub mod adapters;
pub mod config;
pub mod consensus;
pub mod error;
pub mod harness;
pub mod scan;
pub mod store;
pub mod tracker;

pub use error::{SyncError, SyncResult};
