// =============================================================================
// Central Application State — AlgoTerminal dashboard
// =============================================================================
//
// Ties the components together and provides a unified snapshot for the REST
// API and the WebSocket feed.  Everything is injected through `new`; there is
// no global state.
//
// Thread safety:
//   - AtomicU64 state version, bumped after every observable mutation.
//   - parking_lot::RwLock around the view model and the config.
//   - Arc'd components (DataSource, WatchlistSync) manage their own interior
//     mutability.
//   - No lock is held across an .await.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::calculator::{ProfitScenario, ScenarioResult};
use crate::indicators::{compute_series, IndicatorPeriods, IndicatorPoint};
use crate::market_data::{CoinDetail, DataSource, PollOutcome, ProviderError};
use crate::runtime_config::RuntimeConfig;
use crate::types::SortKey;
use crate::view_model::{MarketPage, ViewModel};
use crate::watchlist::{RemoteIdentity, SessionLoad, ToggleReceipt, WatchlistSync};

// =============================================================================
// Snapshots
// =============================================================================

/// Page movement requested by the pager buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStep {
    Next,
    Prev,
}

/// Full dashboard payload for `GET /markets` and the WebSocket feed.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_secs: u64,
    pub market: MarketPage,
    pub watchlist: Vec<String>,
    pub session_user: Option<String>,
    pub remote_sync_failures: u64,
    /// Count of WebSocket snapshot messages sent across all connections.
    pub ws_sequence_number: u64,
}

/// Detail page payload: provider detail, chart series and a seeded scenario.
#[derive(Debug, Clone, Serialize)]
pub struct CoinView {
    pub detail: CoinDetail,
    pub is_favorite: bool,
    pub periods: IndicatorPeriods,
    pub series: Vec<IndicatorPoint>,
    pub scenario: ProfitScenario,
    pub scenario_result: Option<ScenarioResult>,
}

// =============================================================================
// AppState
// =============================================================================

pub struct AppState {
    /// Incremented on every meaningful mutation; the WebSocket feed pushes
    /// whenever it moves.
    pub state_version: AtomicU64,

    /// WebSocket message sequence number (incremented per message sent).
    pub ws_sequence_number: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    pub data_source: Arc<DataSource>,
    pub view: RwLock<ViewModel>,
    pub watchlist: Arc<WatchlistSync>,

    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        config: RuntimeConfig,
        data_source: Arc<DataSource>,
        watchlist: Arc<WatchlistSync>,
    ) -> Self {
        let view = ViewModel::new(config.page_size);

        Self {
            state_version: AtomicU64::new(1),
            ws_sequence_number: AtomicU64::new(0),
            runtime_config: Arc::new(RwLock::new(config)),
            data_source,
            view: RwLock::new(view),
            watchlist,
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    /// Claim the sequence number for the next outgoing WebSocket message.
    pub fn next_ws_sequence(&self) -> u64 {
        self.ws_sequence_number.fetch_add(1, Ordering::Relaxed) + 1
    }

    // ── Feed ────────────────────────────────────────────────────────────

    /// Forward a settled poll into the view. Failed polls leave the view's
    /// assets alone but still change the feed status, so the version moves.
    pub fn apply_poll_outcome(&self, outcome: PollOutcome) {
        if let PollOutcome::Updated { count } = outcome {
            self.view.write().replace_assets(self.data_source.snapshot());
            debug!(count, "view model received fresh snapshot");
        }
        self.increment_version();
    }

    /// Manual reload: poll now and apply the result.
    pub async fn reload(&self) -> PollOutcome {
        let outcome = self.data_source.reload().await;
        self.apply_poll_outcome(outcome);
        outcome
    }

    // ── View commands ───────────────────────────────────────────────────

    pub fn set_search(&self, text: &str) {
        self.view.write().set_search(text);
        self.increment_version();
    }

    pub fn set_favorites_only(&self, enabled: bool) {
        self.view.write().set_favorites_only(enabled);
        self.increment_version();
    }

    pub fn toggle_sort(&self, key: SortKey) {
        self.view.write().toggle_sort(key);
        self.increment_version();
    }

    pub fn set_page(&self, page: usize) -> usize {
        let favorites = self.watchlist.favorites();
        let landed = self.view.write().set_page(page, &favorites);
        self.increment_version();
        landed
    }

    pub fn step_page(&self, step: PageStep) -> usize {
        let favorites = self.watchlist.favorites();
        let landed = {
            let mut view = self.view.write();
            match step {
                PageStep::Next => view.next_page(&favorites),
                PageStep::Prev => view.prev_page(&favorites),
            }
        };
        self.increment_version();
        landed
    }

    // ── Watchlist ───────────────────────────────────────────────────────

    pub fn toggle_favorite(&self, asset_id: &str) -> ToggleReceipt {
        let receipt = self.watchlist.toggle(asset_id);
        self.increment_version();
        receipt
    }

    pub async fn start_session(&self, who: RemoteIdentity) -> SessionLoad {
        let load = self.watchlist.start_session(who).await;
        self.increment_version();
        load
    }

    pub fn end_session(&self) {
        self.watchlist.end_session();
        self.increment_version();
    }

    // ── Detail ──────────────────────────────────────────────────────────

    /// Fetch detail and history for `id`, then derive the indicator series.
    /// `None` periods fall back to the configured defaults.
    pub async fn coin_view(
        &self,
        id: &str,
        sma: Option<usize>,
        ema: Option<usize>,
    ) -> Result<CoinView, ProviderError> {
        let defaults = self.runtime_config.read().indicator_periods();
        let periods = IndicatorPeriods {
            sma: sma.unwrap_or(defaults.sma),
            ema: ema.unwrap_or(defaults.ema),
        };

        let provider = self.data_source.provider();
        let (detail, history) =
            tokio::try_join!(provider.fetch_detail(id), provider.fetch_history(id))?;

        let series = compute_series(&history, periods);
        let scenario = ProfitScenario::for_price(detail.current_price);
        info!(id, points = series.len(), sma = periods.sma, ema = periods.ema, "coin view built");

        Ok(CoinView {
            is_favorite: self.watchlist.contains(id),
            scenario_result: scenario.evaluate(),
            scenario,
            periods,
            series,
            detail,
        })
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    pub fn market_page(&self) -> MarketPage {
        let favorites = self.watchlist.favorites();
        let feed = self.data_source.status();
        self.view.read().render(&favorites, &feed)
    }

    pub fn build_snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            market: self.market_page(),
            watchlist: self.watchlist.favorites().ids(),
            session_user: self.watchlist.identity().map(|who| who.user_id.to_string()),
            remote_sync_failures: self.watchlist.remote_failures(),
            ws_sequence_number: self.ws_sequence_number.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::market_data::testing::{asset, ScriptedProvider, Step};
    use crate::market_data::MarketProvider;
    use crate::types::FeedError;
    use crate::view_model::EmptyState;
    use crate::watchlist::LocalStore;

    pub(crate) fn state_with(
        provider: ScriptedProvider,
        dir: &tempfile::TempDir,
    ) -> Arc<AppState> {
        let provider: Arc<dyn MarketProvider> = Arc::new(provider);
        let data_source = Arc::new(DataSource::new(provider));
        let watchlist = Arc::new(
            WatchlistSync::new(LocalStore::new(dir.path().join("watchlist.json")), None).unwrap(),
        );
        Arc::new(AppState::new(RuntimeConfig::default(), data_source, watchlist))
    }

    fn ranked(n: u32) -> Vec<crate::types::Asset> {
        (1..=n).map(|r| asset(&format!("coin-{r:02}"), r)).collect()
    }

    #[tokio::test]
    async fn successful_poll_reaches_the_view() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(ScriptedProvider::new(vec![Step::Markets(ranked(25))]), &dir);

        let before = state.current_state_version();
        let outcome = state.reload().await;
        assert_eq!(outcome, PollOutcome::Updated { count: 25 });
        assert!(state.current_state_version() > before);

        let page = state.market_page();
        assert_eq!(page.rows.len(), 20);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.rows[0].asset.id, "coin-01");
    }

    #[tokio::test]
    async fn failed_poll_keeps_rows_and_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(
            ScriptedProvider::new(vec![Step::Markets(ranked(3)), Step::RateLimited]),
            &dir,
        );

        state.reload().await;
        assert_eq!(state.reload().await, PollOutcome::RateLimited);

        let page = state.market_page();
        assert_eq!(page.rows.len(), 3);
        assert_eq!(page.feed.error, Some(FeedError::RateLimited));
        assert!(page.empty.is_none());
    }

    #[tokio::test]
    async fn rate_limit_before_first_snapshot_renders_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(ScriptedProvider::new(vec![Step::RateLimited]), &dir);

        state.reload().await;
        let page = state.market_page();
        assert!(page.rows.is_empty());
        assert_eq!(page.empty.unwrap().state, EmptyState::RateLimited);
    }

    #[tokio::test]
    async fn favorites_only_view_follows_toggles() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(ScriptedProvider::new(vec![Step::Markets(ranked(5))]), &dir);
        state.reload().await;

        state.set_favorites_only(true);
        assert_eq!(state.market_page().empty.unwrap().state, EmptyState::EmptyWatchlist);

        assert!(state.toggle_favorite("coin-04").is_favorite);
        let page = state.market_page();
        assert_eq!(page.rows.len(), 1);
        assert!(page.rows[0].is_favorite);
        assert_eq!(state.build_snapshot().watchlist, vec!["coin-04"]);
    }

    #[tokio::test]
    async fn snapshot_carries_ws_sequence_number() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(ScriptedProvider::new(vec![]), &dir);
        assert_eq!(state.build_snapshot().ws_sequence_number, 0);

        assert_eq!(state.next_ws_sequence(), 1);
        assert_eq!(state.next_ws_sequence(), 2);
        let json = serde_json::to_value(state.build_snapshot()).unwrap();
        assert_eq!(json["ws_sequence_number"], 2);
    }

    #[tokio::test]
    async fn page_steps_clamp() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(ScriptedProvider::new(vec![Step::Markets(ranked(41))]), &dir);
        state.reload().await;

        assert_eq!(state.step_page(PageStep::Prev), 1);
        assert_eq!(state.set_page(3), 3);
        assert_eq!(state.step_page(PageStep::Next), 3);
        state.toggle_sort(SortKey::Price);
        assert_eq!(state.market_page().page, 1);
    }

    #[tokio::test]
    async fn coin_view_uses_default_or_requested_periods() {
        let dir = tempfile::tempdir().unwrap();
        let prices: Vec<f64> = (1..=30).map(f64::from).collect();
        let state = state_with(
            ScriptedProvider::new(vec![]).with_history("bitcoin", prices),
            &dir,
        );

        let view = state.coin_view("bitcoin", None, None).await.unwrap();
        assert_eq!(view.periods, IndicatorPeriods { sma: 20, ema: 12 });
        assert_eq!(view.series.len(), 30);
        assert!(view.series[18].sma.is_none());
        assert_eq!(view.series[19].sma, Some(10.5));
        assert!(view.series[11].ema.is_none());
        assert!(view.series[12].ema.is_some());
        assert!(view.scenario_result.is_some());

        let custom = state.coin_view("bitcoin", Some(5), Some(0)).await.unwrap();
        assert_eq!(custom.series[4].sma, Some(3.0));
        assert!(custom.series.iter().all(|p| p.ema.is_none()));
    }

    #[tokio::test]
    async fn coin_view_surfaces_provider_errors() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(ScriptedProvider::new(vec![]), &dir);
        assert!(matches!(
            state.coin_view("nope", None, None).await,
            Err(ProviderError::NotFound(_))
        ));

        let limited = state_with(
            ScriptedProvider::new(vec![])
                .with_history("bitcoin", vec![1.0])
                .with_rate_limited_history(),
            &dir,
        );
        assert!(matches!(
            limited.coin_view("bitcoin", None, None).await,
            Err(ProviderError::RateLimited)
        ));
    }
}
