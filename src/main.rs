//! # Legal Index Sync Main Driver
//!
//! ## Purpose
//! Main entry point for the legal index synchronization server. Builds one
//! synchronizer per configured document kind and drives them on a fixed
//! schedule, with one-shot and operator modes for rebuilds, ad-hoc
//! changelogs, lock recovery, and health checks.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration file, command line arguments, environment
//!   variables
//! - **Output**: Search index kept in step with the document buckets
//!
//! ## Key Features
//! - Scheduled synchronization per document kind
//! - Explicit full-rebuild and ad-hoc changelog modes
//! - Structured logging with optional JSON output
//! - Signal handling for clean shutdown
//!
//! ## Architecture Flow
//! 1. Parse command line arguments and load configuration
//! 2. Initialize logging and tracing
//! 3. Build object store and search index per document kind
//! 4. Dispatch operator modes, or enter the synchronization schedule
//! 5. Handle shutdown signals gracefully, flushing the index

use clap::{Arg, Command};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use legal_index_sync::{
    config::StoreBackend,
    errors::{Result, SyncError},
    index::{SearchIndex, SledSearchIndex},
    store::{FsObjectStore, HttpObjectStore, ObjectStore},
    sync::{state, Synchronizer},
    Config, DocumentKind,
};

/// Everything one document kind needs at runtime.
struct KindRuntime {
    kind: DocumentKind,
    store: Arc<dyn ObjectStore>,
    index: Arc<SledSearchIndex>,
    synchronizer: Synchronizer,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let matches = Command::new("legal-sync-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Keeps the legal document search index in step with the document buckets")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("kind")
                .short('k')
                .long("kind")
                .value_name("KIND")
                .help("Restrict to one document kind (norm, case-law, literature, administrative-directive)"),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Run one synchronization pass and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("reindex")
                .long("reindex")
                .help("Force a full index rebuild and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("apply-changelog")
                .long("apply-changelog")
                .value_name("FILE")
                .help("Apply one changelog file ad hoc and exit"),
        )
        .arg(
            Arg::new("release-lock")
                .long("release-lock")
                .help("Release held synchronization locks and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check-health")
                .long("check-health")
                .help("Run health checks and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    // Load configuration
    let config_path = matches.get_one::<String>("config").unwrap();
    let config = if Path::new(config_path).exists() {
        Config::from_file(config_path)?
    } else {
        Config::from_env()?
    };

    // Initialize logging
    init_logging(&config)?;

    info!("Starting legal index sync v{}", env!("CARGO_PKG_VERSION"));
    if Path::new(config_path).exists() {
        info!("Configuration loaded from: {}", config_path);
    } else {
        info!("No configuration file at {}, using defaults and environment", config_path);
    }

    // Select document kinds
    let kinds: Vec<DocumentKind> = match matches.get_one::<String>("kind") {
        Some(raw) => vec![raw.parse()?],
        None => config.sync.kinds.clone(),
    };
    if kinds.is_empty() {
        return Err(SyncError::Config {
            message: "no document kinds configured".to_string(),
        });
    }

    // Initialize per-kind components
    let runtimes = build_runtimes(&config, &kinds)?;

    // Operator modes
    if matches.get_flag("check-health") {
        return run_health_checks(&runtimes).await;
    }
    if matches.get_flag("release-lock") {
        return release_locks(&runtimes).await;
    }
    if let Some(path) = matches.get_one::<String>("apply-changelog") {
        return apply_changelog_file(&runtimes, path).await;
    }
    if matches.get_flag("reindex") {
        for runtime in &runtimes {
            let run = runtime.synchronizer.force_reindex().await?;
            info!(
                kind = %runtime.kind,
                upserted = run.stats.upserted,
                deleted = run.stats.deleted,
                failed = run.stats.failed,
                "full rebuild completed"
            );
        }
        return shutdown(&runtimes).await;
    }
    if matches.get_flag("once") {
        run_all(&runtimes).await;
        return shutdown(&runtimes).await;
    }

    // Scheduled operation
    let mut interval = tokio::time::interval(Duration::from_secs(config.sync.interval_secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    if !config.sync.run_on_startup {
        // consume the immediate first tick
        interval.tick().await;
    }
    info!(
        interval_secs = config.sync.interval_secs,
        kinds = kinds.len(),
        "entering synchronization schedule"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => run_all(&runtimes).await,
            _ = signal::ctrl_c() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
        }
    }

    shutdown(&runtimes).await?;
    info!("Legal index sync shut down successfully");
    Ok(())
}

/// Initialize logging and tracing
fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.logging.level).map_err(|e| SyncError::Config {
        message: format!("Invalid log level '{}': {}", config.logging.level, e),
    })?;

    if config.logging.json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .json()
                    .with_filter(filter),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_filter(filter),
            )
            .init();
    }
    Ok(())
}

/// Build the object store, search index, and synchronizer for each kind
fn build_runtimes(config: &Config, kinds: &[DocumentKind]) -> Result<Vec<KindRuntime>> {
    let mut runtimes = Vec::new();
    for kind in kinds {
        let store = build_store(config, *kind)?;

        let mut index_config = config.index.clone();
        index_config.path = config.index.path.join(kind.as_str());
        let index = Arc::new(SledSearchIndex::new(&index_config)?);

        let synchronizer = Synchronizer::new(
            *kind,
            store.clone(),
            index.clone() as Arc<dyn SearchIndex>,
            &config.sync,
        );
        info!(kind = %kind, backend = ?config.store.backend, "initialized synchronizer");
        runtimes.push(KindRuntime {
            kind: *kind,
            store,
            index,
            synchronizer,
        });
    }
    Ok(runtimes)
}

fn build_store(config: &Config, kind: DocumentKind) -> Result<Arc<dyn ObjectStore>> {
    let bucket = config.store.buckets.for_kind(kind);
    match config.store.backend {
        StoreBackend::Fs => Ok(Arc::new(FsObjectStore::new(
            config.store.root_dir.join(bucket),
        ))),
        StoreBackend::Http => Ok(Arc::new(HttpObjectStore::new(
            &config.store.base_url,
            bucket,
            config.store.timeout_secs,
        )?)),
    }
}

/// One synchronization pass over every kind. Failed runs are reported and
/// retried on the next tick.
async fn run_all(runtimes: &[KindRuntime]) {
    for runtime in runtimes {
        if let Err(e) = runtime.synchronizer.run().await {
            error!(
                kind = %runtime.kind,
                error = %e,
                retryable = e.is_retryable(),
                "synchronization run failed"
            );
        }
    }
}

/// Apply one changelog file ad hoc, outside the scheduled stream
async fn apply_changelog_file(runtimes: &[KindRuntime], path: &str) -> Result<()> {
    let [runtime] = runtimes else {
        return Err(SyncError::Config {
            message: "--apply-changelog needs exactly one document kind, pass --kind".to_string(),
        });
    };

    let body = tokio::fs::read_to_string(path).await?;
    let run = runtime.synchronizer.apply_adhoc_json(&body).await?;
    info!(
        kind = %runtime.kind,
        outcome = ?run.outcome,
        upserted = run.stats.upserted,
        deleted = run.stats.deleted,
        failed = run.stats.failed,
        "ad-hoc changelog applied"
    );
    shutdown(runtimes).await
}

/// Run comprehensive health checks
async fn run_health_checks(runtimes: &[KindRuntime]) -> Result<()> {
    info!("Running health checks...");
    info!("✓ Configuration is valid");

    for runtime in runtimes {
        runtime.index.health_check().await?;
        info!(kind = %runtime.kind, "✓ Search index is healthy");

        runtime.store.list_keys(state::INDEXING_PREFIX).await?;
        info!(kind = %runtime.kind, "✓ Object store is reachable");

        if runtime.store.get(state::LOCK_KEY).await?.is_some() {
            match state::current_lock(runtime.store.as_ref()).await? {
                Some(lock) => warn!(
                    kind = %runtime.kind,
                    run_id = %lock.run_id,
                    acquired_at = %lock.acquired_at,
                    "synchronization lock is currently held"
                ),
                None => warn!(
                    kind = %runtime.kind,
                    "synchronization lock is held by an unreadable marker"
                ),
            }
        }
    }

    info!("All health checks passed!");
    Ok(())
}

/// Release held synchronization locks, e.g. after a crashed run
async fn release_locks(runtimes: &[KindRuntime]) -> Result<()> {
    for runtime in runtimes {
        if runtime.store.get(state::LOCK_KEY).await?.is_none() {
            info!(kind = %runtime.kind, "no lock held");
            continue;
        }
        let marker = state::current_lock(runtime.store.as_ref()).await?;
        state::release_lock(runtime.store.as_ref()).await?;
        match marker {
            Some(lock) => info!(
                kind = %runtime.kind,
                run_id = %lock.run_id,
                acquired_at = %lock.acquired_at,
                "released synchronization lock"
            ),
            None => warn!(kind = %runtime.kind, "removed unreadable lock marker"),
        }
    }
    Ok(())
}

/// Gracefully shut down, flushing pending index writes
async fn shutdown(runtimes: &[KindRuntime]) -> Result<()> {
    for runtime in runtimes {
        if let Err(e) = runtime.index.flush().await {
            warn!(kind = %runtime.kind, error = %e, "index flush failed during shutdown");
        }
    }
    Ok(())
}
