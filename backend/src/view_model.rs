// =============================================================================
// Market View Model — filter / search / sort / paginate
// =============================================================================
//
// Derives the visible table page deterministically from
// (assets, favorites, query).  Pipeline order is fixed:
//   1. favorites-only filter (if enabled)
//   2. case-insensitive substring search on name OR symbol
//   3. sort by key + direction, ties broken by id ascending
//   4. slice into pages of `page_size`
//
// Changing search text, the favorites-only flag or the sort resets the page
// to 1.  Page numbers are clamped to [1, max(total_pages, 1)] both when set
// and when rendering, since the asset list can shrink under a stale page.
// =============================================================================

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::market_data::FeedStatus;
use crate::types::{Asset, FeedError, SortDirection, SortKey};
use crate::watchlist::FavoriteSet;

/// Current table configuration. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewQuery {
    pub search_text: String,
    pub favorites_only: bool,
    pub sort_key: SortKey,
    pub sort_direction: SortDirection,
    pub page: usize,
}

impl Default for ViewQuery {
    fn default() -> Self {
        Self {
            search_text: String::new(),
            favorites_only: false,
            sort_key: SortKey::Rank,
            sort_direction: SortDirection::Asc,
            page: 1,
        }
    }
}

/// One table row: the asset plus per-viewer flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetRow {
    #[serde(flatten)]
    pub asset: Asset,
    pub is_favorite: bool,
    pub is_positive: bool,
}

/// Why a rendered page has no rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmptyState {
    /// Feed is rate limited and nothing was ever fetched.
    RateLimited,
    /// Feed failed and nothing was ever fetched.
    FetchFailed,
    /// The search text matched nothing.
    NoSearchResults { query: String },
    /// Favorites-only with an empty watchlist.
    EmptyWatchlist,
    /// First poll still outstanding.
    Loading,
    /// A poll succeeded but returned no assets.
    NoMarkets,
}

impl EmptyState {
    pub fn message(&self) -> String {
        match self {
            Self::RateLimited => {
                "Market data provider is rate limiting requests. Data will reload automatically."
                    .to_string()
            }
            Self::FetchFailed => "Market data is unavailable right now.".to_string(),
            Self::NoSearchResults { query } => format!("No results for \"{query}\""),
            Self::EmptyWatchlist => "Watchlist is empty.".to_string(),
            Self::Loading => "Fetching market data...".to_string(),
            Self::NoMarkets => "The provider returned no assets.".to_string(),
        }
    }

    /// Whether the UI should offer the manual reload action.
    pub fn offers_reload(&self) -> bool {
        matches!(self, Self::RateLimited | Self::FetchFailed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmptyNotice {
    pub state: EmptyState,
    pub message: String,
    pub offers_reload: bool,
}

impl From<EmptyState> for EmptyNotice {
    fn from(state: EmptyState) -> Self {
        Self {
            message: state.message(),
            offers_reload: state.offers_reload(),
            state,
        }
    }
}

/// Everything the table needs to draw one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketPage {
    pub rows: Vec<AssetRow>,
    pub query: ViewQuery,
    pub page: usize,
    pub total_pages: usize,
    /// Assets left after filter + search.
    pub total_count: usize,
    /// 1-based inclusive range shown ("showing X-Y of N"); 0..0 when empty.
    pub range_start: usize,
    pub range_end: usize,
    pub has_prev: bool,
    pub has_next: bool,
    pub feed: FeedStatus,
    pub empty: Option<EmptyNotice>,
}

pub struct ViewModel {
    assets: Arc<Vec<Asset>>,
    query: ViewQuery,
    page_size: usize,
}

impl ViewModel {
    pub fn new(page_size: usize) -> Self {
        Self {
            assets: Arc::new(Vec::new()),
            query: ViewQuery::default(),
            page_size: page_size.max(1),
        }
    }

    /// Swap in a fresh snapshot. The page is kept and clamped at render.
    pub fn replace_assets(&mut self, assets: Arc<Vec<Asset>>) {
        self.assets = assets;
    }

    pub fn set_search(&mut self, text: &str) {
        self.query.search_text = text.to_string();
        self.query.page = 1;
    }

    pub fn set_favorites_only(&mut self, enabled: bool) {
        self.query.favorites_only = enabled;
        self.query.page = 1;
    }

    /// Same key flips the direction; a new key starts descending.
    pub fn toggle_sort(&mut self, key: SortKey) {
        if self.query.sort_key == key {
            self.query.sort_direction = self.query.sort_direction.flipped();
        } else {
            self.query.sort_key = key;
            self.query.sort_direction = SortDirection::Desc;
        }
        self.query.page = 1;
    }

    /// Jump to `page`, clamped to the valid range. Returns the page landed on.
    pub fn set_page(&mut self, page: usize, favorites: &FavoriteSet) -> usize {
        let total = self.total_pages(favorites);
        self.query.page = clamp_page(page, total);
        self.query.page
    }

    pub fn next_page(&mut self, favorites: &FavoriteSet) -> usize {
        self.set_page(self.query.page.saturating_add(1), favorites)
    }

    pub fn prev_page(&mut self, favorites: &FavoriteSet) -> usize {
        self.set_page(self.query.page.saturating_sub(1), favorites)
    }

    pub fn total_pages(&self, favorites: &FavoriteSet) -> usize {
        self.filtered_sorted(favorites).len().div_ceil(self.page_size)
    }

    /// Steps 1-3 of the pipeline.
    pub fn filtered_sorted(&self, favorites: &FavoriteSet) -> Vec<&Asset> {
        let needle = self.query.search_text.to_lowercase();

        let mut rows: Vec<&Asset> = self
            .assets
            .iter()
            .filter(|a| !self.query.favorites_only || favorites.contains(&a.id))
            .filter(|a| needle.is_empty() || matches_search(a, &needle))
            .collect();

        let key = self.query.sort_key;
        let direction = self.query.sort_direction;
        rows.sort_by(|a, b| compare(a, b, key, direction));
        rows
    }

    pub fn render(&self, favorites: &FavoriteSet, feed: &FeedStatus) -> MarketPage {
        let matched = self.filtered_sorted(favorites);
        let total_count = matched.len();
        let total_pages = total_count.div_ceil(self.page_size);
        let page = clamp_page(self.query.page, total_pages);

        let start = (page - 1) * self.page_size;
        let rows: Vec<AssetRow> = matched
            .into_iter()
            .skip(start)
            .take(self.page_size)
            .map(|a| AssetRow {
                is_favorite: favorites.contains(&a.id),
                is_positive: a.is_positive(),
                asset: a.clone(),
            })
            .collect();

        let (range_start, range_end) = if rows.is_empty() {
            (0, 0)
        } else {
            (start + 1, start + rows.len())
        };

        let empty = rows.is_empty().then(|| self.empty_state(feed).into());

        MarketPage {
            rows,
            query: ViewQuery {
                page,
                ..self.query.clone()
            },
            page,
            total_pages,
            total_count,
            range_start,
            range_end,
            has_prev: page > 1,
            has_next: page < total_pages,
            feed: feed.clone(),
            empty,
        }
    }

    fn empty_state(&self, feed: &FeedStatus) -> EmptyState {
        match feed.error {
            Some(FeedError::RateLimited) if !feed.has_snapshot => return EmptyState::RateLimited,
            Some(FeedError::FetchFailed) if !feed.has_snapshot => return EmptyState::FetchFailed,
            _ => {}
        }
        if !self.query.search_text.is_empty() {
            EmptyState::NoSearchResults {
                query: self.query.search_text.clone(),
            }
        } else if self.query.favorites_only {
            EmptyState::EmptyWatchlist
        } else if feed.has_snapshot {
            EmptyState::NoMarkets
        } else {
            EmptyState::Loading
        }
    }
}

fn matches_search(asset: &Asset, needle: &str) -> bool {
    asset.name.to_lowercase().contains(needle) || asset.symbol.to_lowercase().contains(needle)
}

fn compare(a: &Asset, b: &Asset, key: SortKey, direction: SortDirection) -> Ordering {
    let primary = a.sort_value(key).total_cmp(&b.sort_value(key));
    let primary = match direction {
        SortDirection::Asc => primary,
        SortDirection::Desc => primary.reverse(),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

fn clamp_page(page: usize, total_pages: usize) -> usize {
    page.clamp(1, total_pages.max(1))
}
