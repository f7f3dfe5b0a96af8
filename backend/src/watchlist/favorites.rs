// =============================================================================
// Favorites — the local, durable watchlist
// =============================================================================
//
// The local store is a small JSON key-value file.  The favorites live under a
// single key; other keys in the file are preserved on save.  Writes use the
// same atomic tmp + rename pattern as the runtime config.
// =============================================================================

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Key under which the favorites set is stored.
pub const WATCHLIST_KEY: &str = "algoterminal-watchlist";

/// Set of favorite asset ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FavoriteSet(BTreeSet<String>);

impl FavoriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Flip membership of `id`; returns the new membership.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.0.remove(id) {
            false
        } else {
            self.0.insert(id.to_string());
            true
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn ids(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl FromIterator<String> for FavoriteSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// File-backed key-value store surviving process restarts.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the favorites set. A missing file or key means an empty set.
    pub fn load_favorites(&self) -> Result<FavoriteSet> {
        let entries = self.read_entries()?;
        let favorites = match entries.get(WATCHLIST_KEY) {
            Some(value) => serde_json::from_value(value.clone()).with_context(|| {
                format!("malformed '{WATCHLIST_KEY}' entry in {}", self.path.display())
            })?,
            None => FavoriteSet::new(),
        };

        debug!(path = %self.path.display(), count = favorites.len(), "local watchlist loaded");
        Ok(favorites)
    }

    /// Persist the favorites set atomically (write `.tmp`, then rename).
    pub fn save_favorites(&self, favorites: &FavoriteSet) -> Result<()> {
        let mut entries = self.read_entries()?;
        entries.insert(
            WATCHLIST_KEY.to_string(),
            serde_json::to_value(favorites).context("failed to serialise watchlist")?,
        );

        let content = serde_json::to_string_pretty(&Value::Object(entries))
            .context("failed to serialise local store")?;
        let tmp_path = self.path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp store to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to rename tmp store to {}", self.path.display()))?;

        debug!(path = %self.path.display(), count = favorites.len(), "local watchlist saved");
        Ok(())
    }

    fn read_entries(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no local store yet, starting empty");
            return Ok(Map::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read local store {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse local store {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_twice_restores_membership() {
        let mut set = FavoriteSet::new();
        assert!(set.toggle("bitcoin"));
        assert!(set.contains("bitcoin"));
        assert!(!set.toggle("bitcoin"));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("watchlist.json"));
        assert_eq!(store.load_favorites().unwrap().len(), 0);
    }

    #[test]
    fn saved_set_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchlist.json");

        let set: FavoriteSet = ["solana".to_string(), "bitcoin".to_string()].into_iter().collect();
        LocalStore::new(&path).save_favorites(&set).unwrap();

        let reopened = LocalStore::new(&path).load_favorites().unwrap();
        assert_eq!(reopened, set);
        assert_eq!(reopened.ids(), vec!["bitcoin", "solana"]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn save_preserves_unrelated_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{ "theme": "dark" }"#).unwrap();

        let store = LocalStore::new(&path);
        store.save_favorites(&FavoriteSet::from_iter(["xrp".to_string()])).unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw[WATCHLIST_KEY], serde_json::json!(["xrp"]));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchlist.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(LocalStore::new(&path).load_favorites().is_err());
    }
}
