// =============================================================================
// AlgoTerminal — Main Entry Point
// =============================================================================
//
// Boots the market dashboard core:
//   config -> provider client -> data source -> watchlist -> app state
//   -> poller -> HTTP/WebSocket API, then waits for Ctrl+C.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod calculator;
mod indicators;
mod market_data;
mod runtime_config;
mod types;
mod view_model;
mod watchlist;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::market_data::{spawn_poller, CoinGeckoClient, DataSource, MarketProvider};
use crate::runtime_config::RuntimeConfig;
use crate::watchlist::{LocalStore, RemoteIdentity, RemoteWatchlist, SupabaseWatchlist, WatchlistSync};

const CONFIG_PATH: &str = "runtime_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        AlgoTerminal — Starting Up                        ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = match RuntimeConfig::load(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "failed to load config, using defaults");
            let defaults = RuntimeConfig::default();
            if !Path::new(CONFIG_PATH).exists() {
                if let Err(e) = defaults.save(CONFIG_PATH) {
                    warn!(error = %e, "could not write default config");
                }
            }
            defaults
        }
    };
    config.apply_env(|key| std::env::var(key).ok());
    config.sanitise();

    info!(
        poll_interval_secs = config.poll_interval_secs,
        page_size = config.page_size,
        sma = config.sma_period,
        ema = config.ema_period,
        remote_store = config.remote_store.is_configured(),
        "configuration ready"
    );

    // ── 2. Market data ───────────────────────────────────────────────────
    let provider: Arc<dyn MarketProvider> = Arc::new(
        CoinGeckoClient::new(&config.provider).context("failed to build market data client")?,
    );
    let data_source = Arc::new(DataSource::new(provider));

    // ── 3. Watchlist ─────────────────────────────────────────────────────
    let remote: Option<Arc<dyn RemoteWatchlist>> = match (
        config.remote_store.is_configured(),
        config.remote_store.url.as_deref(),
        config.remote_store.anon_key.as_deref(),
    ) {
        (true, Some(url), Some(key)) => Some(Arc::new(
            SupabaseWatchlist::new(url, key).context("failed to build remote watchlist client")?,
        )),
        _ => {
            info!("no remote watchlist store configured, favorites stay local");
            None
        }
    };

    let watchlist = Arc::new(
        WatchlistSync::new(LocalStore::new(&config.watchlist_path), remote)
            .context("failed to open local watchlist store")?,
    );

    let injected_identity = match (
        config.remote_store.user_id.as_deref(),
        config.remote_store.access_token.as_deref(),
    ) {
        (Some(uid), Some(token)) => {
            let parsed = RemoteIdentity::parse(uid, token);
            if parsed.is_none() {
                warn!(user_id = uid, "injected user id is not a UUID, staying signed out");
            }
            parsed
        }
        _ => None,
    };

    // ── 4. Shared state ──────────────────────────────────────────────────
    let bind_addr = config.bind_addr.clone();
    let poll_interval = config.poll_interval();
    let state = Arc::new(AppState::new(config, data_source.clone(), watchlist));

    if let Some(who) = injected_identity {
        let load = state.start_session(who).await;
        info!(?load, "injected session started");
    }

    // ── 5. Poller ────────────────────────────────────────────────────────
    let poll_state = state.clone();
    let poller = spawn_poller(data_source, poll_interval, move |outcome| {
        poll_state.apply_poll_outcome(outcome);
    });

    // ── 6. API server ────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::rest::router(state.clone());
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 7. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received, stopping");

    poller.detach();
    server.abort();

    info!(
        favorites = state.watchlist.favorites().len(),
        "AlgoTerminal shut down complete."
    );
    Ok(())
}
