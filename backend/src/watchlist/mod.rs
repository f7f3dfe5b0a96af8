// =============================================================================
// Watchlist Module
// =============================================================================
//
// The user's favorite assets: a local durable set, an optional remote copy
// keyed by the signed-in identity, and the optimistic sync between the two.

pub mod favorites;
pub mod remote;
pub mod sync;

pub use favorites::{FavoriteSet, LocalStore};
pub use remote::{RemoteIdentity, RemoteWatchlist, SupabaseWatchlist};
pub use sync::{SessionLoad, ToggleReceipt, WatchlistSync};
