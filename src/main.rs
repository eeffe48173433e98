//! SENTINEL — Continuous Market Anomaly Monitoring Core
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the market-data providers, and runs the scan loop with the
//! console display until Ctrl+C triggers a graceful stop.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use sentinel::config;
use sentinel::dashboard::{self, DashboardState};
use sentinel::display;
use sentinel::engine::{MonitorHandle, ScanLoop};
use sentinel::providers::replay::ReplayMarketData;
use sentinel::providers::rest::RestMarketData;
use sentinel::providers::{EnrichmentProvider, SnapshotSource};
use tokio::sync::watch;

const BANNER: &str = r#"
 ____  _____ _   _ _____ ___ _   _ _____ _
/ ___|| ____| \ | |_   _|_ _| \ | | ____| |
\___ \|  _| |  \| | | |  | ||  \| |  _| | |
 ___) | |___| |\  | | |  | || |\  | |___| |___
|____/|_____|_| \_| |_| |___|_| \_|_____|_____|

  Continuous Market Anomaly Monitoring Core
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        monitor = %cfg.monitor.name,
        in_session_interval_secs = cfg.monitor.in_session_interval_secs,
        pool_capacity = cfg.pool.capacity,
        pool_ttl_secs = cfg.pool.ttl_secs,
        offline = cfg.providers.offline,
        "SENTINEL starting up"
    );

    // -- Providers ---------------------------------------------------------

    let (snapshot_source, enrichment): (Arc<dyn SnapshotSource>, Arc<dyn EnrichmentProvider>) =
        if cfg.providers.offline {
            warn!("Offline mode — using the built-in replay provider");
            let replay = Arc::new(ReplayMarketData::new());
            (replay.clone(), replay)
        } else {
            let rest = Arc::new(RestMarketData::new(&cfg.providers)?);
            info!(base_url = %cfg.providers.base_url, "Using REST market-data gateway");
            (rest.clone(), rest)
        };

    // -- Scan loop ---------------------------------------------------------

    let scan_loop = ScanLoop::new(cfg.clone(), snapshot_source, enrichment);
    let pool = scan_loop.pool();
    let stats = scan_loop.stats();
    let log_tail = scan_loop.log_tail();

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(
            Arc::new(DashboardState {
                pool: pool.clone(),
                stats: stats.clone(),
                log_tail,
            }),
            cfg.dashboard.port,
        )?;
    }

    let handle = MonitorHandle::spawn(scan_loop);

    // -- Display + shutdown ------------------------------------------------

    let (display_stop_tx, display_stop_rx) = watch::channel(false);
    let display_task = if cfg.display.enabled {
        Some(tokio::spawn(display::run_display(
            cfg.display.clone(),
            pool,
            stats,
            display_stop_rx,
        )))
    } else {
        None
    };

    info!("Running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    let _ = display_stop_tx.send(true);
    if let Some(task) = display_task {
        let _ = task.await;
    }

    handle
        .stop(Duration::from_secs(cfg.monitor.shutdown_timeout_secs))
        .await?;
    info!("SENTINEL shut down cleanly.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sentinel=info"));

    let json_logging = std::env::var("SENTINEL_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
