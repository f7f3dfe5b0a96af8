// =============================================================================
// Remote Watchlist Store — Supabase PostgREST table
// =============================================================================
//
// Table `watchlist(user_id uuid, coin_id text)`, one row per favorite:
//   list   GET    /rest/v1/watchlist?select=coin_id&user_id=eq.<uid>
//   insert POST   /rest/v1/watchlist            {"user_id", "coin_id"}
//   delete DELETE /rest/v1/watchlist?user_id=eq.<uid>&coin_id=eq.<id>
//
// Every request carries the project `apikey` plus the user's access token, so
// row-level security scopes the rows to that user.
// =============================================================================

use futures_util::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("remote store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid remote store credentials: {0}")]
    Credentials(String),

    #[error("remote operation was cancelled before completing")]
    Cancelled,
}

/// The signed-in user on whose behalf remote rows are read and written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIdentity {
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub access_token: String,
}

impl RemoteIdentity {
    pub fn new(user_id: Uuid, access_token: impl Into<String>) -> Self {
        Self {
            user_id,
            access_token: access_token.into(),
        }
    }

    /// Parse a textual user id; `None` when it is not a UUID.
    pub fn parse(user_id: &str, access_token: impl Into<String>) -> Option<Self> {
        Uuid::parse_str(user_id.trim())
            .ok()
            .map(|uid| Self::new(uid, access_token))
    }
}

/// Remote copy of the favorites, keyed by `(identity, asset_id)`.
pub trait RemoteWatchlist: Send + Sync {
    fn list_ids<'a>(&'a self, who: &'a RemoteIdentity) -> BoxFuture<'a, Result<Vec<String>, SyncError>>;

    fn insert<'a>(&'a self, who: &'a RemoteIdentity, asset_id: &'a str)
        -> BoxFuture<'a, Result<(), SyncError>>;

    fn delete<'a>(&'a self, who: &'a RemoteIdentity, asset_id: &'a str)
        -> BoxFuture<'a, Result<(), SyncError>>;
}

#[derive(Debug, Deserialize)]
struct WatchlistRow {
    coin_id: String,
}

#[derive(Debug, Serialize)]
struct NewWatchlistRow<'a> {
    user_id: Uuid,
    coin_id: &'a str,
}

/// PostgREST-backed implementation.
#[derive(Clone)]
pub struct SupabaseWatchlist {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
}

impl SupabaseWatchlist {
    pub fn new(base_url: &str, anon_key: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            base_url: format!("{}/rest/v1/watchlist", base_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
            client,
        })
    }

    fn headers(&self, who: &RemoteIdentity) -> Result<HeaderMap, SyncError> {
        let mut headers = HeaderMap::new();
        let apikey = HeaderValue::from_str(&self.anon_key)
            .map_err(|_| SyncError::Credentials("anon key is not a valid header".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", who.access_token))
            .map_err(|_| SyncError::Credentials("access token is not a valid header".into()))?;
        headers.insert("apikey", apikey);
        headers.insert(reqwest::header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, SyncError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(SyncError::Status {
            status: status.as_u16(),
            body,
        })
    }

    #[instrument(skip(self, who), fields(user = %who.user_id), name = "supabase::list_ids")]
    async fn get_ids(&self, who: &RemoteIdentity) -> Result<Vec<String>, SyncError> {
        let user_filter = format!("eq.{}", who.user_id);
        let resp = self
            .client
            .get(&self.base_url)
            .headers(self.headers(who)?)
            .query(&[("select", "coin_id"), ("user_id", user_filter.as_str())])
            .send()
            .await?;

        let rows: Vec<WatchlistRow> = Self::check(resp).await?.json().await?;
        debug!(count = rows.len(), "remote watchlist fetched");
        Ok(rows.into_iter().map(|r| r.coin_id).collect())
    }

    #[instrument(skip(self, who), fields(user = %who.user_id), name = "supabase::insert")]
    async fn post_row(&self, who: &RemoteIdentity, asset_id: &str) -> Result<(), SyncError> {
        let resp = self
            .client
            .post(&self.base_url)
            .headers(self.headers(who)?)
            .header("Prefer", "return=minimal")
            .json(&NewWatchlistRow {
                user_id: who.user_id,
                coin_id: asset_id,
            })
            .send()
            .await?;

        Self::check(resp).await?;
        debug!(asset_id, "remote watchlist row inserted");
        Ok(())
    }

    #[instrument(skip(self, who), fields(user = %who.user_id), name = "supabase::delete")]
    async fn delete_row(&self, who: &RemoteIdentity, asset_id: &str) -> Result<(), SyncError> {
        let user_filter = format!("eq.{}", who.user_id);
        let coin_filter = format!("eq.{asset_id}");
        let resp = self
            .client
            .delete(&self.base_url)
            .headers(self.headers(who)?)
            .query(&[("user_id", user_filter.as_str()), ("coin_id", coin_filter.as_str())])
            .send()
            .await?;

        Self::check(resp).await?;
        debug!(asset_id, "remote watchlist row deleted");
        Ok(())
    }
}

impl RemoteWatchlist for SupabaseWatchlist {
    fn list_ids<'a>(&'a self, who: &'a RemoteIdentity) -> BoxFuture<'a, Result<Vec<String>, SyncError>> {
        Box::pin(self.get_ids(who))
    }

    fn insert<'a>(
        &'a self,
        who: &'a RemoteIdentity,
        asset_id: &'a str,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        Box::pin(self.post_row(who, asset_id))
    }

    fn delete<'a>(
        &'a self,
        who: &'a RemoteIdentity,
        asset_id: &'a str,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        Box::pin(self.delete_row(who, asset_id))
    }
}

impl std::fmt::Debug for SupabaseWatchlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseWatchlist")
            .field("base_url", &self.base_url)
            .field("anon_key", &"<redacted>")
            .finish()
    }
}
