// Scripted in-memory provider shared by the market-data, app-state and API
// tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use crate::market_data::coingecko::{CoinDetail, MarketProvider, ProviderError};
use crate::types::{Asset, PricePoint};

/// One scripted answer to `fetch_markets`.
#[derive(Debug, Clone)]
pub enum Step {
    Markets(Vec<Asset>),
    RateLimited,
    Fail,
    Malformed,
}

impl Step {
    fn into_result(self) -> Result<Vec<Asset>, ProviderError> {
        match self {
            Step::Markets(assets) => Ok(assets),
            Step::RateLimited => Err(ProviderError::RateLimited),
            Step::Fail => Err(ProviderError::Status {
                status: 503,
                body: "upstream unavailable".into(),
            }),
            Step::Malformed => Err(ProviderError::Parse("expected array".into())),
        }
    }
}

/// Replays `steps` in order; once exhausted it repeats the last one.
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    histories: HashMap<String, Vec<f64>>,
    history_rate_limited: bool,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            histories: HashMap::new(),
            history_rate_limited: false,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_history(mut self, id: &str, prices: Vec<f64>) -> Self {
        self.histories.insert(id.to_string(), prices);
        self
    }

    pub fn with_rate_limited_history(mut self) -> Self {
        self.history_rate_limited = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let next = self.steps.lock().pop_front();
        let mut last = self.last.lock();
        match next {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last.clone().unwrap_or(Step::Markets(Vec::new())),
        }
    }
}

impl MarketProvider for ScriptedProvider {
    fn fetch_markets(&self) -> BoxFuture<'_, Result<Vec<Asset>, ProviderError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.next_step().into_result()
        })
    }

    fn fetch_history<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<PricePoint>, ProviderError>> {
        Box::pin(async move {
            if self.history_rate_limited {
                return Err(ProviderError::RateLimited);
            }
            let Some(prices) = self.histories.get(id) else {
                return Err(ProviderError::NotFound(id.to_string()));
            };
            Ok(prices
                .iter()
                .enumerate()
                .map(|(i, &price)| PricePoint {
                    timestamp: Utc
                        .timestamp_millis_opt(1_700_000_000_000 + i as i64 * 3_600_000)
                        .unwrap(),
                    price,
                })
                .collect::<Vec<_>>())
        })
    }

    fn fetch_detail<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<CoinDetail, ProviderError>> {
        Box::pin(async move {
            if !self.histories.contains_key(id) {
                return Err(ProviderError::NotFound(id.to_string()));
            }
            Ok(CoinDetail {
                id: id.to_string(),
                name: id.to_uppercase(),
                symbol: id.chars().take(3).collect(),
                rank: Some(1),
                image: None,
                current_price: 100.0,
                change_24h_percent: Some(1.0),
                market_cap: 1.0e9,
                total_volume: 1.0e8,
                circulating_supply: 1.0e7,
                description: "No description available.".into(),
            })
        })
    }
}

/// Minimal asset with the given id and rank; name/symbol derive from the id.
pub fn asset(id: &str, rank: u32) -> Asset {
    Asset {
        id: id.to_string(),
        name: id.to_string(),
        symbol: id.chars().take(3).collect(),
        rank: Some(rank),
        current_price: 0.0,
        change_24h_percent: None,
        total_volume: 0.0,
        market_cap: 0.0,
        sparkline: Vec::new(),
        image: None,
    }
}
