//! SHARPLINE: sportsbook odds aggregation and pricing analytics.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the history store, starts the refresh scheduler and the query
//! surface, and logs a status line until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use sharpline::config;
use sharpline::dashboard::{self, routes::DashboardState};
use sharpline::data::odds_api::OddsApiClient;
use sharpline::engine::budget::ConsumptionBudget;
use sharpline::engine::cache::FreshnessCache;
use sharpline::engine::orchestrator::FetchOrchestrator;
use sharpline::engine::{scheduler, MarketEngine};
use sharpline::pricing::PricingEngine;
use sharpline::storage::{HistoryStore, SqliteHistoryStore};

const BANNER: &str = r#"
 ____  _   _    _    ____  ____  _     ___ _   _ _____
/ ___|| | | |  / \  |  _ \|  _ \| |   |_ _| \ | | ____|
\___ \| |_| | / _ \ | |_) | |_) | |    | ||  \| |  _|
 ___) |  _  |/ ___ \|  _ <|  __/| |___ | || |\  | |___
|____/|_| |_/_/   \_\_| \_\_|   |_____|___|_| \_|_____|

  No-vig consensus, +EV, arbitrage and middles
  v0.1.0
"#;

/// How often the main loop logs budget and cache status.
const STATUS_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        sports = ?cfg.feed.sports,
        regions = ?cfg.feed.regions,
        odds_format = %cfg.feed.odds_format,
        props_enabled = cfg.refresh.props_enabled,
        alt_lines_enabled = cfg.refresh.alt_lines_enabled,
        "SHARPLINE starting up"
    );

    // -- History store ---------------------------------------------------

    let store = SqliteHistoryStore::connect(&cfg.history.database_url)
        .await
        .with_context(|| format!("Failed to open history store at {}", cfg.history.database_url))?;
    if cfg.history.reset_on_start {
        store.reset().await.context("Failed to reset history")?;
    }
    let history: Arc<dyn HistoryStore> = Arc::new(store);

    // -- Engine ----------------------------------------------------------

    let client = OddsApiClient::new(
        cfg.api_key()?,
        cfg.feed.base_url.clone(),
        Duration::from_secs(cfg.feed.timeout_secs),
    )?;

    let orchestrator = FetchOrchestrator::new(
        Arc::new(client),
        Arc::new(FreshnessCache::new(cfg.cache_ttls())),
        Arc::new(ConsumptionBudget::new(cfg.budget_thresholds())),
        cfg.orchestrator(),
    );
    let pricing = PricingEngine::new(cfg.pricing(), Arc::new(cfg.density()));
    let engine = Arc::new(MarketEngine::new(
        orchestrator,
        pricing,
        cfg.price_overrides(),
        history,
        cfg.feed.sports.clone(),
    ));

    let sports = engine.load_sports().await;
    if sports.is_empty() {
        warn!("No configured sport is offered upstream; nothing will refresh");
    }

    // -- Scheduler + dashboard -------------------------------------------

    let handle = scheduler::spawn(Arc::clone(&engine), cfg.intervals());

    let server = if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(Arc::clone(&engine), Some(handle.trigger())));
        Some(dashboard::spawn_dashboard(state, cfg.dashboard.port).await?)
    } else {
        None
    };

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(STATUS_INTERVAL_SECS));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Entering main loop. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = interval.tick() => log_status(&engine),
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    handle.shutdown();
    if let Some(server) = server {
        server.abort();
    }
    log_status(&engine);
    info!("SHARPLINE shut down cleanly.");

    Ok(())
}

/// Log one budget/cache/board status line.
fn log_status(engine: &MarketEngine) {
    let budget = engine.budget();
    let cache = engine.cache_stats();
    let ev: usize = engine
        .sports()
        .iter()
        .filter_map(|s| engine.snapshot(s))
        .map(|snap| snap.game_opportunities.ev.len() + snap.prop_opportunities.ev.len())
        .sum();

    info!(
        credits = %budget.status,
        tier = ?budget.tier,
        cache_entries = cache.entries,
        cache_hit_rate = format!("{:.2}", cache.hit_rate),
        ev_bets = ev,
        "Status"
    );
    if let Some(warning) = budget.warning {
        warn!(remaining = ?budget.remaining, "{warning}");
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sharpline=info"));

    let json_logging = std::env::var("SHARPLINE_LOG_JSON").is_ok();

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
