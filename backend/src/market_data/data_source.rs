// =============================================================================
// Market Data Source — frozen-on-error snapshot of the ranked asset list
// =============================================================================
//
// Holds the latest successfully fetched snapshot plus a classified error
// state.  A failed poll never touches the snapshot: stale-but-valid data is
// preferable to an empty table.
//
//   success  => snapshot replaced wholesale, error cleared
//   HTTP 429 => error = RATE_LIMITED, snapshot kept
//   other    => error = FETCH_FAILED, snapshot kept
//
// Every poll (scheduled or manual reload) goes through `poll_gate`, so two
// requests never interleave and results are applied strictly in order.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::market_data::coingecko::{MarketProvider, ProviderError};
use crate::types::{Asset, FeedError};

/// Result of one poll, reported to whoever scheduled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PollOutcome {
    Updated { count: usize },
    RateLimited,
    Failed,
}

/// Serialisable view of the feed's health, used for the status badge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedStatus {
    /// Whether any poll has ever succeeded.
    pub has_snapshot: bool,
    pub asset_count: usize,
    pub error: Option<FeedError>,
    pub is_updating: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub successful_polls: u64,
    pub failed_polls: u64,
}

#[derive(Debug, Default)]
struct FeedState {
    snapshot: Arc<Vec<Asset>>,
    has_snapshot: bool,
    error: Option<FeedError>,
    is_updating: bool,
    last_success: Option<DateTime<Utc>>,
    last_error_at: Option<DateTime<Utc>>,
    successful_polls: u64,
    failed_polls: u64,
}

/// Periodically refreshed market snapshot.
pub struct DataSource {
    provider: Arc<dyn MarketProvider>,
    state: RwLock<FeedState>,
    poll_gate: tokio::sync::Mutex<()>,
}

impl DataSource {
    pub fn new(provider: Arc<dyn MarketProvider>) -> Self {
        Self {
            provider,
            state: RwLock::new(FeedState::default()),
            poll_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// The provider this source polls (also used for on-demand detail
    /// requests, which do not touch the snapshot).
    pub fn provider(&self) -> &Arc<dyn MarketProvider> {
        &self.provider
    }

    /// Issue one fetch and apply its result.
    pub async fn poll(&self) -> PollOutcome {
        let _gate = self.poll_gate.lock().await;

        let updating = UpdatingFlag::raise(&self.state);
        let result = self.provider.fetch_markets().await;
        drop(updating);

        let mut state = self.state.write();

        match result {
            Ok(assets) => {
                let count = assets.len();
                state.snapshot = Arc::new(assets);
                state.has_snapshot = true;
                state.error = None;
                state.last_success = Some(Utc::now());
                state.successful_polls += 1;
                debug!(count, "market snapshot replaced");
                PollOutcome::Updated { count }
            }
            Err(e) => {
                let kind = classify(&e);
                state.error = Some(kind);
                state.last_error_at = Some(Utc::now());
                state.failed_polls += 1;
                let held = state.snapshot.len();
                match kind {
                    FeedError::RateLimited => {
                        warn!(held_assets = held, "market poll rate limited, keeping snapshot");
                        PollOutcome::RateLimited
                    }
                    FeedError::FetchFailed => {
                        warn!(error = %e, held_assets = held, "market poll failed, keeping snapshot");
                        PollOutcome::Failed
                    }
                }
            }
        }
    }

    /// Force an immediate poll (the "reload" recovery action).
    pub async fn reload(&self) -> PollOutcome {
        info!("manual market reload requested");
        self.poll().await
    }

    /// The latest successful snapshot (empty until the first success).
    pub fn snapshot(&self) -> Arc<Vec<Asset>> {
        self.state.read().snapshot.clone()
    }

    pub fn status(&self) -> FeedStatus {
        let state = self.state.read();
        FeedStatus {
            has_snapshot: state.has_snapshot,
            asset_count: state.snapshot.len(),
            error: state.error,
            is_updating: state.is_updating,
            last_success: state.last_success,
            last_error_at: state.last_error_at,
            successful_polls: state.successful_polls,
            failed_polls: state.failed_polls,
        }
    }
}

/// Keeps `is_updating` raised for as long as it lives, so a poll future
/// dropped mid-fetch still lowers the flag.
struct UpdatingFlag<'a>(&'a RwLock<FeedState>);

impl<'a> UpdatingFlag<'a> {
    fn raise(state: &'a RwLock<FeedState>) -> Self {
        state.write().is_updating = true;
        Self(state)
    }
}

impl Drop for UpdatingFlag<'_> {
    fn drop(&mut self) {
        self.0.write().is_updating = false;
    }
}

fn classify(e: &ProviderError) -> FeedError {
    if e.is_rate_limited() {
        FeedError::RateLimited
    } else {
        FeedError::FetchFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::testing::{asset, ScriptedProvider, Step};
    use std::time::Duration;

    fn source(steps: Vec<Step>) -> (Arc<ScriptedProvider>, DataSource) {
        let provider = Arc::new(ScriptedProvider::new(steps));
        let source = DataSource::new(provider.clone());
        (provider, source)
    }

    #[tokio::test]
    async fn success_replaces_snapshot_and_clears_error() {
        let (_, src) = source(vec![
            Step::RateLimited,
            Step::Markets(vec![asset("bitcoin", 1)]),
        ]);

        assert_eq!(src.poll().await, PollOutcome::RateLimited);
        assert_eq!(src.status().error, Some(FeedError::RateLimited));

        assert_eq!(src.poll().await, PollOutcome::Updated { count: 1 });
        assert_eq!(src.status().error, None);
        assert_eq!(src.snapshot()[0].id, "bitcoin");
        assert!(src.status().last_success.is_some());
    }

    #[tokio::test]
    async fn failed_polls_never_erase_existing_snapshot() {
        let first = vec![asset("bitcoin", 1), asset("ethereum", 2)];
        let (_, src) = source(vec![
            Step::Markets(first.clone()),
            Step::RateLimited,
            Step::Fail,
            Step::Malformed,
        ]);

        src.poll().await;
        for expected in [FeedError::RateLimited, FeedError::FetchFailed, FeedError::FetchFailed] {
            src.poll().await;
            assert_eq!(src.status().error, Some(expected));
            assert_eq!(*src.snapshot(), first);
            assert!(src.status().has_snapshot);
        }

        let status = src.status();
        assert_eq!(status.successful_polls, 1);
        assert_eq!(status.failed_polls, 3);
    }

    #[tokio::test]
    async fn rate_limit_without_prior_snapshot_is_empty_not_a_crash() {
        let (_, src) = source(vec![Step::RateLimited]);
        assert_eq!(src.poll().await, PollOutcome::RateLimited);
        assert!(src.snapshot().is_empty());
        assert!(!src.status().has_snapshot);
        assert_eq!(src.status().error, Some(FeedError::RateLimited));
    }

    #[tokio::test]
    async fn empty_successful_poll_still_counts_as_snapshot() {
        let (_, src) = source(vec![Step::Markets(Vec::new())]);
        src.poll().await;
        assert!(src.status().has_snapshot);
        assert_eq!(src.status().asset_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_polls_are_serialised() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![
                Step::Markets(vec![asset("a", 1)]),
                Step::Markets(vec![asset("b", 1)]),
            ])
            .with_latency(Duration::from_secs(3)),
        );
        let src = DataSource::new(provider.clone());

        let (first, second) = tokio::join!(src.poll(), src.reload());
        assert_eq!(first, PollOutcome::Updated { count: 1 });
        assert_eq!(second, PollOutcome::Updated { count: 1 });
        assert_eq!(provider.calls(), 2);
        assert_eq!(provider.max_in_flight(), 1);
        assert_eq!(src.snapshot()[0].id, "b");
        assert!(!src.status().is_updating);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_poll_lowers_updating_flag() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![Step::Markets(vec![asset("a", 1)])])
                .with_latency(Duration::from_secs(10)),
        );
        let src = DataSource::new(provider.clone());

        {
            let poll = src.poll();
            tokio::pin!(poll);
            assert!(tokio::time::timeout(Duration::from_secs(1), poll.as_mut()).await.is_err());
            assert!(src.status().is_updating);
        }

        let status = src.status();
        assert!(!status.is_updating);
        assert!(!status.has_snapshot);
        assert_eq!(status.successful_polls, 0);

        assert_eq!(src.poll().await, PollOutcome::Updated { count: 1 });
    }
}
