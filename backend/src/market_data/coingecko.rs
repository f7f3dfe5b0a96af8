// =============================================================================
// CoinGecko REST API Client — public market data
// =============================================================================
//
// Three read-only endpoints back the dashboard:
//   - /coins/markets            ranked asset list with 7d sparkline
//   - /coins/{id}/market_chart  trailing price history for the detail chart
//   - /coins/{id}               extended detail (supply, description)
//
// HTTP 429 is classified separately from every other failure so the feed can
// report "rate limited, will retry" instead of "failed".
// =============================================================================

use std::collections::HashMap;

use anyhow::Context;
use chrono::{TimeZone, Utc};
use futures_util::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::runtime_config::ProviderConfig;
use crate::types::{Asset, PricePoint};

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited by market data provider")]
    RateLimited,

    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to parse provider response: {0}")]
    Parse(String),
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

// =============================================================================
// Provider seam
// =============================================================================

/// Source of market data. The poller and the detail endpoint only talk to
/// this trait, so both run headlessly against a scripted fake in tests.
pub trait MarketProvider: Send + Sync {
    /// Ranked asset list (one full snapshot).
    fn fetch_markets(&self) -> BoxFuture<'_, Result<Vec<Asset>, ProviderError>>;

    /// Trailing price history for `id`, ascending by timestamp.
    fn fetch_history<'a>(&'a self, id: &'a str)
        -> BoxFuture<'a, Result<Vec<PricePoint>, ProviderError>>;

    /// Extended detail record for `id`.
    fn fetch_detail<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<CoinDetail, ProviderError>>;
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct MarketEntry {
    id: String,
    symbol: String,
    name: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    current_price: Option<f64>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    market_cap_rank: Option<u32>,
    #[serde(default)]
    total_volume: Option<f64>,
    #[serde(default)]
    price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    sparkline_in_7d: Option<SparklineWire>,
}

#[derive(Debug, Deserialize)]
struct SparklineWire {
    #[serde(default)]
    price: Vec<Option<f64>>,
}

impl From<MarketEntry> for Asset {
    fn from(e: MarketEntry) -> Self {
        let sparkline = e
            .sparkline_in_7d
            .map(|s| s.price.into_iter().flatten().collect())
            .unwrap_or_default();

        Asset {
            id: e.id,
            name: e.name,
            symbol: e.symbol,
            rank: e.market_cap_rank,
            current_price: e.current_price.unwrap_or(0.0),
            change_24h_percent: e.price_change_percentage_24h,
            total_volume: e.total_volume.unwrap_or(0.0),
            market_cap: e.market_cap.unwrap_or(0.0),
            sparkline,
            image: e.image,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MarketChartWire {
    #[serde(default)]
    prices: Vec<(f64, f64)>,
}

#[derive(Debug, Default, Deserialize)]
struct DetailImageWire {
    #[serde(default)]
    large: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DetailDescriptionWire {
    #[serde(default)]
    en: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DetailMarketDataWire {
    #[serde(default)]
    current_price: HashMap<String, f64>,
    #[serde(default)]
    market_cap: HashMap<String, f64>,
    #[serde(default)]
    total_volume: HashMap<String, f64>,
    #[serde(default)]
    price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    circulating_supply: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DetailWire {
    id: String,
    symbol: String,
    name: String,
    #[serde(default)]
    market_cap_rank: Option<u32>,
    #[serde(default)]
    image: DetailImageWire,
    #[serde(default)]
    description: DetailDescriptionWire,
    #[serde(default)]
    market_data: DetailMarketDataWire,
}

/// Extended per-asset record shown on the detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinDetail {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub rank: Option<u32>,
    pub image: Option<String>,
    pub current_price: f64,
    pub change_24h_percent: Option<f64>,
    pub market_cap: f64,
    pub total_volume: f64,
    pub circulating_supply: f64,
    pub description: String,
}

impl DetailWire {
    fn into_detail(self, currency: &str) -> CoinDetail {
        let pick = |m: &HashMap<String, f64>| m.get(currency).copied().unwrap_or(0.0);
        let description = self
            .description
            .en
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| "No description available.".to_string());

        CoinDetail {
            current_price: pick(&self.market_data.current_price),
            market_cap: pick(&self.market_data.market_cap),
            total_volume: pick(&self.market_data.total_volume),
            change_24h_percent: self.market_data.price_change_percentage_24h,
            circulating_supply: self.market_data.circulating_supply.unwrap_or(0.0),
            id: self.id,
            name: self.name,
            symbol: self.symbol,
            rank: self.market_cap_rank,
            image: self.image.large,
            description,
        }
    }
}

/// Convert `[ms, price]` pairs into ascending PricePoints, dropping entries
/// whose timestamp cannot be represented.
fn to_price_points(raw: Vec<(f64, f64)>) -> Vec<PricePoint> {
    let mut points: Vec<PricePoint> = raw
        .into_iter()
        .filter_map(|(ms, price)| {
            Utc.timestamp_millis_opt(ms as i64)
                .single()
                .map(|timestamp| PricePoint { timestamp, price })
        })
        .collect();
    points.sort_by_key(|p| p.timestamp);
    points
}

// =============================================================================
// Client
// =============================================================================

/// CoinGecko public API client.
#[derive(Clone)]
pub struct CoinGeckoClient {
    base_url: Url,
    vs_currency: String,
    markets_per_page: u32,
    history_days: u32,
    client: reqwest::Client,
}

impl CoinGeckoClient {
    /// Build a client from the provider section of the runtime config.
    pub fn new(config: &ProviderConfig) -> anyhow::Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("accept", HeaderValue::from_static("application/json"));
        if let Some(key) = config.api_key.as_deref() {
            if let Ok(val) = HeaderValue::from_str(key) {
                default_headers.insert("x-cg-demo-api-key", val);
            }
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("invalid provider base url {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("provider base url {} cannot carry a path", config.base_url);
        }

        debug!(base_url = %base_url, "CoinGeckoClient initialised");

        Ok(Self {
            base_url,
            vs_currency: config.vs_currency.clone(),
            markets_per_page: config.markets_per_page,
            history_days: config.history_days,
            client,
        })
    }

    /// GET /coins/markets — top assets by market cap with sparkline.
    #[instrument(skip(self), name = "coingecko::get_markets")]
    pub async fn get_markets(&self) -> Result<Vec<Asset>, ProviderError> {
        let mut url = self.endpoint(&["coins", "markets"]);
        url.query_pairs_mut()
            .append_pair("vs_currency", &self.vs_currency)
            .append_pair("order", "market_cap_desc")
            .append_pair("per_page", &self.markets_per_page.to_string())
            .append_pair("page", "1")
            .append_pair("sparkline", "true")
            .append_pair("price_change_percentage", "24h");

        let entries: Vec<MarketEntry> = self.get_json(url, None).await?;
        let assets: Vec<Asset> = entries.into_iter().map(Asset::from).collect();

        debug!(count = assets.len(), "markets fetched");
        Ok(assets)
    }

    /// GET /coins/{id}/market_chart — trailing price history.
    #[instrument(skip(self), name = "coingecko::get_price_history")]
    pub async fn get_price_history(&self, id: &str) -> Result<Vec<PricePoint>, ProviderError> {
        let mut url = self.endpoint(&["coins", id, "market_chart"]);
        url.query_pairs_mut()
            .append_pair("vs_currency", &self.vs_currency)
            .append_pair("days", &self.history_days.to_string());

        let chart: MarketChartWire = self.get_json(url, Some(id)).await?;
        let points = to_price_points(chart.prices);

        debug!(id, count = points.len(), "price history fetched");
        Ok(points)
    }

    /// GET /coins/{id} — extended detail.
    #[instrument(skip(self), name = "coingecko::get_coin_detail")]
    pub async fn get_coin_detail(&self, id: &str) -> Result<CoinDetail, ProviderError> {
        let mut url = self.endpoint(&["coins", id]);
        url.query_pairs_mut()
            .append_pair("localization", "false")
            .append_pair("tickers", "false")
            .append_pair("community_data", "false")
            .append_pair("developer_data", "false");

        let wire: DetailWire = self.get_json(url, Some(id)).await?;
        debug!(id, "coin detail fetched");
        Ok(wire.into_detail(&self.vs_currency))
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    /// Base url extended by `segments`, each percent-encoded as one path
    /// segment (an id containing `/` or `?` stays inside its segment).
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Issue a GET and decode the body, classifying the status first.
    /// `not_found_id` turns a 404 into [`ProviderError::NotFound`].
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        not_found_id: Option<&str>,
    ) -> Result<T, ProviderError> {
        let resp = self.client.get(url.clone()).send().await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(url = %url, "market data provider rate limit reached");
            return Err(ProviderError::RateLimited);
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = not_found_id {
                return Err(ProviderError::NotFound(id.to_string()));
            }
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

impl MarketProvider for CoinGeckoClient {
    fn fetch_markets(&self) -> BoxFuture<'_, Result<Vec<Asset>, ProviderError>> {
        Box::pin(self.get_markets())
    }

    fn fetch_history<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<PricePoint>, ProviderError>> {
        Box::pin(self.get_price_history(id))
    }

    fn fetch_detail<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<CoinDetail, ProviderError>> {
        Box::pin(self.get_coin_detail(id))
    }
}

impl std::fmt::Debug for CoinGeckoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinGeckoClient")
            .field("base_url", &self.base_url.as_str())
            .field("vs_currency", &self.vs_currency)
            .field("markets_per_page", &self.markets_per_page)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_entry_with_nulls_normalises_to_zero() {
        let json = r#"[{
            "id": "newcoin", "symbol": "new", "name": "New Coin",
            "image": null, "current_price": null, "market_cap": null,
            "market_cap_rank": null, "total_volume": 1200.5,
            "price_change_percentage_24h": null,
            "sparkline_in_7d": { "price": [1.0, null, 3.0] }
        }]"#;
        let entries: Vec<MarketEntry> = serde_json::from_str(json).unwrap();
        let asset = Asset::from(entries.into_iter().next().unwrap());

        assert_eq!(asset.current_price, 0.0);
        assert_eq!(asset.market_cap, 0.0);
        assert_eq!(asset.total_volume, 1200.5);
        assert_eq!(asset.rank, None);
        assert_eq!(asset.change_24h_percent, None);
        assert_eq!(asset.sparkline, vec![1.0, 3.0]);
    }

    #[test]
    fn market_entry_without_sparkline() {
        let json = r#"{ "id": "btc", "symbol": "btc", "name": "Bitcoin", "market_cap_rank": 1 }"#;
        let entry: MarketEntry = serde_json::from_str(json).unwrap();
        let asset = Asset::from(entry);
        assert!(asset.sparkline.is_empty());
        assert_eq!(asset.rank, Some(1));
    }

    #[test]
    fn market_chart_points_are_sorted_ascending() {
        let json = r#"{ "prices": [[1700000360000, 3.0], [1700000000000, 1.0], [1700000180000, 2.0]] }"#;
        let chart: MarketChartWire = serde_json::from_str(json).unwrap();
        let points = to_price_points(chart.prices);
        let prices: Vec<f64> = points.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![1.0, 2.0, 3.0]);
        assert!(points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn detail_picks_configured_currency() {
        let json = r#"{
            "id": "ethereum", "symbol": "eth", "name": "Ethereum", "market_cap_rank": 2,
            "image": { "large": "https://img/eth.png" },
            "description": { "en": "" },
            "market_data": {
                "current_price": { "usd": 3000.0, "eur": 2800.0 },
                "market_cap": { "usd": 3.6e11 },
                "total_volume": { "usd": 1.5e10 },
                "price_change_percentage_24h": -2.5,
                "circulating_supply": 120000000.0
            }
        }"#;
        let wire: DetailWire = serde_json::from_str(json).unwrap();
        let detail = wire.into_detail("eur");
        assert_eq!(detail.current_price, 2800.0);
        assert_eq!(detail.market_cap, 0.0);
        assert_eq!(detail.change_24h_percent, Some(-2.5));
        assert_eq!(detail.description, "No description available.");
        assert_eq!(detail.image.as_deref(), Some("https://img/eth.png"));
    }

    #[test]
    fn client_builds_from_default_config() {
        let client = CoinGeckoClient::new(&ProviderConfig::default()).unwrap();
        let dbg = format!("{client:?}");
        assert!(dbg.contains("api.coingecko.com"));
    }

    #[test]
    fn asset_ids_stay_inside_their_path_segment() {
        let client = CoinGeckoClient::new(&ProviderConfig::default()).unwrap();

        let url = client.endpoint(&["coins", "foo/bar?x#y", "market_chart"]);
        assert_eq!(url.path(), "/api/v3/coins/foo%2Fbar%3Fx%23y/market_chart");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);

        let plain = client.endpoint(&["coins", "bitcoin"]);
        assert_eq!(plain.as_str(), "https://api.coingecko.com/api/v3/coins/bitcoin");
    }

    #[test]
    fn trailing_slash_base_and_bad_base_urls() {
        let slashed = ProviderConfig {
            base_url: "https://example.test/api/v3/".into(),
            ..ProviderConfig::default()
        };
        let client = CoinGeckoClient::new(&slashed).unwrap();
        assert_eq!(client.endpoint(&["coins", "markets"]).path(), "/api/v3/coins/markets");

        for bad in ["not a url", "mailto:someone@example.test"] {
            let config = ProviderConfig {
                base_url: bad.into(),
                ..ProviderConfig::default()
            };
            assert!(CoinGeckoClient::new(&config).is_err());
        }
    }

    #[test]
    fn rate_limited_is_distinct() {
        assert!(ProviderError::RateLimited.is_rate_limited());
        assert!(!ProviderError::Parse("x".into()).is_rate_limited());
    }
}
