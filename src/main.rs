//! traffic-watch: live road-segment speeds with a CSV history.
//!
//! Single-binary Tokio application that:
//! 1. Pulls the regional traffic feed on a fixed schedule
//! 2. Caches the latest snapshot (15 min TTL, rate-limited forced reloads)
//! 3. Appends one row per segment to monthly CSV files
//! 4. Serves snapshots and history over HTTP

mod config;
mod http;

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing::{error, info};

use feed_client::FeedCollector;
use refresh::{HistoryFileCache, HistoryLogger, RefreshCache};

/// Road traffic snapshot service
#[derive(Parser)]
#[command(name = "traffic-watch", about = "Road traffic snapshot and history service")]
struct Cli {
    /// Run one forced refresh, print the snapshot, and exit.
    #[arg(long)]
    once: bool,

    /// Path to the TOML config file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "traffic_watch=info,refresh=info,feed_client=info,tower_http=warn".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    info!("traffic-watch starting up...");

    // Load configuration.
    let cfg = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("Segments: {:?}", cfg.segments);
    info!(
        "Cache: ttl={}s, force≤1/{}s, refresh every {}s, log wait {}s",
        cfg.cache.ttl_secs,
        cfg.cache.force_period_secs,
        cfg.cache.refresh_interval_secs,
        cfg.cache.log_wait_secs,
    );
    info!(
        "History: dir={}, read cache {} entries / {}s",
        cfg.history.log_dir, cfg.history.cache_capacity, cfg.history.cache_ttl_secs,
    );

    let collector = match FeedCollector::from_config(&cfg.feed, cfg.segments.clone()) {
        Ok(c) => c,
        Err(e) => {
            error!("Feed client initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    // ── Shared state ─────────────────────────────────────────────────
    let history_logger = Arc::new(HistoryLogger::new(&cfg.history.log_dir, cfg.segments.clone()));
    let cache = Arc::new(RefreshCache::from_config(
        Arc::new(collector),
        history_logger,
        &cfg.cache,
    ));
    let history_cache = Arc::new(HistoryFileCache::new(
        &cfg.history.log_dir,
        cfg.history.cache_capacity,
        cfg.history.cache_ttl(),
    ));

    // ── One-shot mode ────────────────────────────────────────────────
    if cli.once {
        match cache.force().await {
            Ok(snapshot) => match serde_json::to_string_pretty(snapshot.as_ref()) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("Snapshot serialization failed: {}", e),
            },
            Err(e) => {
                error!("Refresh failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // ── Spawn tasks ──────────────────────────────────────────────────
    let refresh_handle = refresh::schedule(cfg.cache.refresh_interval(), cache.clone());

    let listener = match tokio::net::TcpListener::bind(&cfg.server.bind).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", cfg.server.bind, e);
            std::process::exit(1);
        }
    };
    let app = http::router(http::AppState {
        cache: cache.clone(),
        history: history_cache,
    });
    info!("Listening on http://{}", cfg.server.bind);
    let server_handle = tokio::spawn(async move { axum::serve(listener, app).await });

    // ── Wait for shutdown ────────────────────────────────────────────
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        r = refresh_handle => {
            error!("Refresh task exited: {:?}", r);
        }
        r = server_handle => {
            error!("HTTP server exited: {:?}", r);
        }
    }

    info!("traffic-watch stopped");
}
