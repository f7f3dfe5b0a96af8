// =============================================================================
// Shared types used across the AlgoTerminal dashboard core
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One market-tracked asset as of the latest snapshot.
///
/// Numeric fields the provider left null are normalised to `0.0` at the wire
/// boundary, except `change_24h_percent` which stays optional so the view
/// can tell "flat" from "unknown".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub current_price: f64,
    #[serde(default)]
    pub change_24h_percent: Option<f64>,
    #[serde(default)]
    pub total_volume: f64,
    #[serde(default)]
    pub market_cap: f64,
    #[serde(default)]
    pub sparkline: Vec<f64>,
    #[serde(default)]
    pub image: Option<String>,
}

impl Asset {
    /// Comparison value for `key`. Missing values compare as zero.
    pub fn sort_value(&self, key: SortKey) -> f64 {
        match key {
            SortKey::Rank => self.rank.map(f64::from).unwrap_or(0.0),
            SortKey::Price => self.current_price,
            SortKey::Change24h => self.change_24h_percent.unwrap_or(0.0),
            SortKey::Volume => self.total_volume,
            SortKey::MarketCap => self.market_cap,
        }
    }

    /// 24h change with the "absent means flat" rule applied.
    pub fn change_24h(&self) -> f64 {
        self.change_24h_percent.unwrap_or(0.0)
    }

    /// Whether the trend (sparkline colour, change badge) reads as positive.
    pub fn is_positive(&self) -> bool {
        self.change_24h() >= 0.0
    }
}

/// A single `(timestamp, price)` sample of a price history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Column the market table is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Rank,
    Price,
    #[serde(rename = "change_24h")]
    Change24h,
    Volume,
    MarketCap,
}

impl Default for SortKey {
    fn default() -> Self {
        Self::Rank
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rank => write!(f, "rank"),
            Self::Price => write!(f, "price"),
            Self::Change24h => write!(f, "change_24h"),
            Self::Volume => write!(f, "volume"),
            Self::MarketCap => write!(f, "market_cap"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

impl Default for SortDirection {
    fn default() -> Self {
        Self::Asc
    }
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

/// Classified error state of the market feed. Both variants are recoverable
/// and clear on the next successful poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedError {
    /// Provider answered HTTP 429.
    RateLimited,
    /// Transport, status or decode failure.
    FetchFailed,
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "RATE_LIMITED"),
            Self::FetchFailed => write!(f, "FETCH_FAILED"),
        }
    }
}
