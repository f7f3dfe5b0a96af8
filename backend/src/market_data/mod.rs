// =============================================================================
// Market Data Module
// =============================================================================
//
// Provider client, the frozen-on-error snapshot holder, and the fixed-cadence
// poll task that keeps it fresh.

pub mod coingecko;
pub mod data_source;
pub mod poller;

#[cfg(test)]
pub mod testing;

pub use coingecko::{CoinDetail, CoinGeckoClient, MarketProvider, ProviderError};
pub use data_source::{DataSource, FeedStatus, PollOutcome};
pub use poller::spawn_poller;
