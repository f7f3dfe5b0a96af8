// =============================================================================
// Watchlist Sync — optimistic local toggles mirrored to a remote store
// =============================================================================
//
// The local set is authoritative for the UI:
//   - toggle() flips and persists locally, then returns the new membership.
//   - If a remote identity is present, the matching insert/delete runs as a
//     detached task.  The caller gets a RemoteCompletion for that leg.
//   - Remote failures are logged as REMOTE_SYNC_FAILED and counted.  They
//     never roll back the local change, and nothing is retried.
//
// Remote operations are chained: each task awaits its predecessor before
// issuing its own request, so an add followed by a remove reaches the store
// in that order and the two sides converge.
//
// start_session() fetches the remote set once and replaces the local set
// wholesale (no merge).  end_session() drops the identity and keeps the
// local set as it is.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::watchlist::favorites::{FavoriteSet, LocalStore};
use crate::watchlist::remote::{RemoteIdentity, RemoteWatchlist, SyncError};

/// Handle for the remote leg of one toggle.
#[derive(Debug)]
pub struct RemoteCompletion {
    rx: oneshot::Receiver<Result<(), SyncError>>,
}

impl RemoteCompletion {
    /// Wait for the remote write to settle.
    pub async fn wait(self) -> Result<(), SyncError> {
        self.rx.await.unwrap_or(Err(SyncError::Cancelled))
    }
}

/// What a toggle did locally, plus the pending remote leg if any.
#[derive(Debug)]
pub struct ToggleReceipt {
    pub asset_id: String,
    pub is_favorite: bool,
    pub remote: Option<RemoteCompletion>,
}

/// How a session start resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SessionLoad {
    /// Remote set fetched; local set replaced with `count` ids.
    Replaced { count: usize },
    /// Remote fetch failed; local set left untouched.
    RemoteUnavailable,
    /// No remote store configured; identity kept for later but nothing synced.
    LocalOnly,
}

#[derive(Clone, Copy)]
enum RemoteOp {
    Insert,
    Delete,
}

pub struct WatchlistSync {
    favorites: RwLock<FavoriteSet>,
    store: LocalStore,
    remote: Option<Arc<dyn RemoteWatchlist>>,
    identity: RwLock<Option<RemoteIdentity>>,
    last_remote: Mutex<Option<JoinHandle<()>>>,
    remote_failures: Arc<AtomicU64>,
}

impl WatchlistSync {
    /// Open the local store and load the current set (empty if absent).
    pub fn new(store: LocalStore, remote: Option<Arc<dyn RemoteWatchlist>>) -> Result<Self> {
        let favorites = store.load_favorites()?;
        info!(
            path = %store.path().display(),
            count = favorites.len(),
            remote = remote.is_some(),
            "watchlist initialised"
        );

        Ok(Self {
            favorites: RwLock::new(favorites),
            store,
            remote,
            identity: RwLock::new(None),
            last_remote: Mutex::new(None),
            remote_failures: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn favorites(&self) -> FavoriteSet {
        self.favorites.read().clone()
    }

    pub fn contains(&self, asset_id: &str) -> bool {
        self.favorites.read().contains(asset_id)
    }

    pub fn identity(&self) -> Option<RemoteIdentity> {
        self.identity.read().clone()
    }

    pub fn remote_failures(&self) -> u64 {
        self.remote_failures.load(Ordering::Relaxed)
    }

    /// Flip membership of `asset_id` locally and mirror it remotely.
    ///
    /// Must run inside a Tokio runtime when a remote identity is present.
    pub fn toggle(&self, asset_id: &str) -> ToggleReceipt {
        // The write guard spans flip, save and enqueue, so disk, memory and
        // the remote chain all see toggles in the same order.
        let mut favorites = self.favorites.write();
        let is_favorite = favorites.toggle(asset_id);

        if let Err(e) = self.store.save_favorites(&favorites) {
            warn!(asset_id, error = %e, "failed to persist local watchlist");
        }
        debug!(asset_id, is_favorite, "watchlist toggled");

        let op = if is_favorite {
            RemoteOp::Insert
        } else {
            RemoteOp::Delete
        };
        let who = self.identity.read().clone();
        let remote = who.and_then(|who| self.spawn_remote(who, asset_id, op));
        drop(favorites);

        ToggleReceipt {
            asset_id: asset_id.to_string(),
            is_favorite,
            remote,
        }
    }

    fn spawn_remote(
        &self,
        who: RemoteIdentity,
        asset_id: &str,
        op: RemoteOp,
    ) -> Option<RemoteCompletion> {
        let remote = self.remote.clone()?;

        let (tx, rx) = oneshot::channel();
        let failures = self.remote_failures.clone();
        let asset_id = asset_id.to_string();

        let mut last = self.last_remote.lock();
        let previous = last.take();
        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }

            let result = match op {
                RemoteOp::Insert => remote.insert(&who, &asset_id).await,
                RemoteOp::Delete => remote.delete(&who, &asset_id).await,
            };

            if let Err(e) = &result {
                failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    code = "REMOTE_SYNC_FAILED",
                    asset_id = %asset_id,
                    error = %e,
                    "remote watchlist write failed, local state kept"
                );
            }
            let _ = tx.send(result);
        });
        *last = Some(task);

        Some(RemoteCompletion { rx })
    }

    /// Adopt `who` as the signed-in identity and load its remote set.
    ///
    /// The identity is published only once the load has settled, together
    /// with the replacement, so a toggle made while the load is in flight
    /// stays local and is overwritten rather than mirrored.
    pub async fn start_session(&self, who: RemoteIdentity) -> SessionLoad {
        let Some(remote) = self.remote.clone() else {
            *self.identity.write() = Some(who.clone());
            info!(user = %who.user_id, "session started without remote store");
            return SessionLoad::LocalOnly;
        };

        let loaded = remote.list_ids(&who).await;

        let mut favorites = self.favorites.write();
        let load = match loaded {
            Ok(ids) => {
                *favorites = ids.into_iter().collect();
                if let Err(e) = self.store.save_favorites(&favorites) {
                    warn!(error = %e, "failed to persist remote watchlist locally");
                }
                let count = favorites.len();
                info!(user = %who.user_id, count, "remote watchlist loaded, local set replaced");
                SessionLoad::Replaced { count }
            }
            Err(e) => {
                self.remote_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    code = "REMOTE_SYNC_FAILED",
                    user = %who.user_id,
                    error = %e,
                    "remote watchlist load failed, keeping local set"
                );
                SessionLoad::RemoteUnavailable
            }
        };
        *self.identity.write() = Some(who);
        drop(favorites);

        load
    }

    /// Sign out. The local set stays as it is.
    pub fn end_session(&self) {
        if let Some(who) = self.identity.write().take() {
            info!(user = %who.user_id, "session ended");
        }
    }
}
