// =============================================================================
// Runtime Configuration — dashboard settings with atomic save
// =============================================================================
//
// Every tunable of the dashboard lives here: provider endpoint, poll cadence,
// view page size, indicator periods and storage locations.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::indicators::IndicatorPeriods;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_provider_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_vs_currency() -> String {
    "usd".to_string()
}

fn default_markets_per_page() -> u32 {
    100
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_page_size() -> usize {
    20
}

fn default_sma_period() -> usize {
    20
}

fn default_ema_period() -> usize {
    12
}

fn default_history_days() -> u32 {
    7
}

fn default_watchlist_path() -> PathBuf {
    PathBuf::from("watchlist.json")
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

// =============================================================================
// ProviderConfig
// =============================================================================

/// Market-data provider (CoinGecko) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Quote currency for every price field.
    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,

    /// How many ranked assets one poll requests.
    #[serde(default = "default_markets_per_page")]
    pub markets_per_page: u32,

    /// Trailing window of the detail price history, in days.
    #[serde(default = "default_history_days")]
    pub history_days: u32,

    /// Optional demo API key, sent as `x-cg-demo-api-key`.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            vs_currency: default_vs_currency(),
            markets_per_page: default_markets_per_page(),
            history_days: default_history_days(),
            api_key: None,
        }
    }
}

// =============================================================================
// RemoteStoreConfig
// =============================================================================

/// Optional remote watchlist store (Supabase PostgREST).
///
/// `user_id` / `access_token` are the injected identity; when either is
/// missing the dashboard runs local-only until a session is started via the
/// API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteStoreConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl RemoteStoreConfig {
    pub fn is_configured(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty())
            && self.anon_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the dashboard.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Seconds between two scheduled polls of the markets list.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Rows per page of the market table.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Default SMA look-back for the detail chart.
    #[serde(default = "default_sma_period")]
    pub sma_period: usize,

    /// Default EMA look-back for the detail chart.
    #[serde(default = "default_ema_period")]
    pub ema_period: usize,

    /// Local durable store holding the favorites set.
    #[serde(default = "default_watchlist_path")]
    pub watchlist_path: PathBuf,

    #[serde(default)]
    pub remote_store: RemoteStoreConfig,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            poll_interval_secs: default_poll_interval_secs(),
            page_size: default_page_size(),
            sma_period: default_sma_period(),
            ema_period: default_ema_period(),
            watchlist_path: default_watchlist_path(),
            remote_store: RemoteStoreConfig::default(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            poll_interval_secs = config.poll_interval_secs,
            provider = %config.provider.base_url,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply environment overrides on top of the file values.
    ///
    /// `lookup` is `std::env::var` in production; tests pass a closure over a
    /// fixed map so they never touch the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = non_empty("ALGOTERMINAL_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(key) = non_empty("COINGECKO_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = non_empty("SUPABASE_URL") {
            self.remote_store.url = Some(url.trim_end_matches('/').to_string());
        }
        if let Some(key) = non_empty("SUPABASE_ANON_KEY") {
            self.remote_store.anon_key = Some(key);
        }
        if let Some(uid) = non_empty("ALGOTERMINAL_USER_ID") {
            self.remote_store.user_id = Some(uid);
        }
        if let Some(token) = non_empty("ALGOTERMINAL_ACCESS_TOKEN") {
            self.remote_store.access_token = Some(token);
        }
    }

    /// Clamp values that would otherwise break the poller or the pager.
    pub fn sanitise(&mut self) {
        self.poll_interval_secs = self.poll_interval_secs.max(1);
        self.page_size = self.page_size.max(1);
        self.provider.markets_per_page = self.provider.markets_per_page.clamp(1, 250);
        self.provider.history_days = self.provider.history_days.max(1);
    }

    pub fn indicator_periods(&self) -> IndicatorPeriods {
        IndicatorPeriods {
            sma: self.sma_period,
            ema: self.ema_period,
        }
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }
}
