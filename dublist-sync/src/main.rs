//! dublist-sync - command line entry point
//!
//! Subcommands:
//! - `mal`: crawl a MyAnimeList id range
//! - `anilist`: crawl AniList pages
//! - `anilist-pages`: print AniList's total page count
//! - `crunchyroll`: crawl the Crunchyroll catalog listing
//! - `forum`: rewrite the curated forum list of English dubs
//! - `merge`: regenerate the tiered outputs from every source

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use dublist_common::config::{load_bootstrap_config, resolve_root_folder, TomlConfig};
use dublist_common::DataLayout;
use dublist_sync::adapters::{
    self, anilist, forum, AniListAdapter, CrunchyrollAdapter, ForumSource, ForumSync, MalAdapter,
};
use dublist_sync::config::{
    resolve_mal_client_id, SYSTEM_ANILIST, SYSTEM_JIKAN, SYSTEM_MAL, SYSTEM_MAL_WEB,
    SYSTEM_UNIQUESTREAM,
};
use dublist_sync::consensus::ConsensusEngine;
use dublist_sync::harness::{CallOutcome, ReqwestTransport, Transport};
use dublist_sync::scan::{RunSummary, ScanRunner, SourceAdapter, StopReason};
use dublist_sync::SyncError;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for dublist-sync
#[derive(Parser, Debug)]
#[command(name = "dublist-sync")]
#[command(about = "Collect dub observations from providers and merge them into confidence tiers")]
#[command(version)]
struct Args {
    /// Data root holding sources/, cache/ and final/
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Bootstrap TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl a MyAnimeList id range (inclusive)
    Mal {
        #[arg(long)]
        start: i64,
        #[arg(long)]
        end: i64,
        /// MyAnimeList API client id
        #[arg(long)]
        client_id: Option<String>,
    },
    /// Crawl AniList pages (1-based, inclusive)
    Anilist {
        #[arg(long)]
        start_page: Option<u32>,
        #[arg(long)]
        end_page: Option<u32>,
    },
    /// Print the number of AniList pages and exit
    AnilistPages,
    /// Crawl the Crunchyroll catalog
    Crunchyroll,
    /// Rewrite the English list kept in a MyAnimeList forum topic
    Forum,
    /// Regenerate final/ from all sources and manual overrides
    Merge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_bootstrap_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    init_tracing(args.debug, &config);

    let root = resolve_root_folder(args.root.as_deref(), &config);
    info!("Data root: {}", root.display());
    let layout = DataLayout::new(root);

    match args.command {
        Command::Merge => {
            let report = ConsensusEngine::new(layout)
                .run()
                .context("Merge failed")?;
            info!(
                "Merged {} languages ({} files written, {} removed)",
                report.languages, report.files_written, report.files_removed
            );
        }
        Command::AnilistPages => {
            let transport = http_transport()?;
            let harness = adapters::build_harness(SYSTEM_ANILIST, &config, transport);
            match anilist::total_pages(&harness).await {
                CallOutcome::Success(pages) => println!("{}", pages),
                CallOutcome::PermanentMiss => bail!("AniList page info not found"),
                CallOutcome::TransientFailure(reason) => {
                    bail!("Failed to fetch AniList total pages: {}", reason)
                }
            }
        }
        Command::Mal {
            start,
            end,
            client_id,
        } => {
            if start > end {
                return Err(SyncError::InvalidArgument(format!(
                    "--start ({}) must not exceed --end ({})",
                    start, end
                ))
                .into());
            }
            let client_id = resolve_mal_client_id(client_id.as_deref(), &config)?;
            let transport = http_transport()?;
            let mut adapter = MalAdapter::new(
                adapters::build_harness(SYSTEM_MAL, &config, transport.clone()),
                adapters::build_harness(SYSTEM_JIKAN, &config, transport),
                client_id,
                start,
                end,
                config.scan.checkpoint_every_ids,
                config.scan.memo_capacity,
            );
            run_scan(&layout, &config, &mut adapter).await?;
        }
        Command::Anilist {
            start_page,
            end_page,
        } => {
            if let (Some(start), Some(end)) = (start_page, end_page) {
                if start > end {
                    return Err(SyncError::InvalidArgument(format!(
                        "--start-page ({}) must not exceed --end-page ({})",
                        start, end
                    ))
                    .into());
                }
            }
            let transport = http_transport()?;
            let mut adapter = AniListAdapter::new(
                adapters::build_harness(SYSTEM_ANILIST, &config, transport),
                start_page,
                end_page,
                config.scan.checkpoint_every_pages,
            );
            run_scan(&layout, &config, &mut adapter).await?;
            let stats = adapter.stats();
            info!(
                "AniList totals: pages={}, media={}, with_mal={}, with_languages={}",
                stats.pages, stats.media, stats.with_mal, stats.with_languages
            );
        }
        Command::Crunchyroll => {
            let transport = http_transport()?;
            let mut adapter = CrunchyrollAdapter::new(
                adapters::build_harness(SYSTEM_UNIQUESTREAM, &config, transport),
                config.scan.fan_out,
                config.scan.checkpoint_every_pages,
            );
            run_scan(&layout, &config, &mut adapter).await?;
            info!("Crunchyroll series listed: {}", adapter.listed());
        }
        Command::Forum => {
            let transport = http_transport()?;
            let source = ForumSource::new(
                adapters::build_harness(SYSTEM_MAL_WEB, &config, transport),
                forum::TOPIC_URL,
                forum::AUTHOR,
                forum::POST_LIMIT,
            );
            match source.sync(&layout).await.context("Forum sync failed")? {
                ForumSync::Written { ids } => info!("Forum list rewritten with {} ids", ids),
                ForumSync::Unchanged { ids } => info!("Forum list unchanged ({} ids)", ids),
                ForumSync::Skipped(reason) => warn!("Forum list left as is: {}", reason),
            }
        }
    }

    Ok(())
}

/// `RUST_LOG` wins, then `--debug`, then the TOML level
fn init_tracing(debug: bool, config: &TomlConfig) {
    let default_level = if debug {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "dublist_sync={level},dublist_common={level},warn",
                level = default_level
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn http_transport() -> Result<Arc<dyn Transport>> {
    let transport = ReqwestTransport::new(adapters::USER_AGENT, adapters::HTTP_TIMEOUT)
        .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;
    Ok(Arc::new(transport))
}

async fn run_scan<A>(layout: &DataLayout, config: &TomlConfig, adapter: &mut A) -> Result<RunSummary>
where
    A: SourceAdapter,
{
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_signal(cancel.clone()));

    let runner = ScanRunner::open(layout, &*adapter, &config.scan)?;
    let summary = runner.run(adapter, &cancel).await;
    watcher.abort();

    let summary = summary.context("Final flush failed")?;
    if let StopReason::Failed(reason) = &summary.stop {
        warn!("Scan ended with an error after flushing: {}", reason);
    }
    Ok(summary)
}

/// Cancel on Ctrl+C or SIGTERM
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
    cancel.cancel();
}
