//! Persistent key/value session for plugin-owned records.
//!
//! The session is a JSON document of named tables, each mapping string keys
//! to arbitrary JSON values. It lives in memory while the gateway runs and is
//! written back with [`Session::commit`]. Only the router task touches it,
//! so the shared handle is a plain mutex.
//!
//! Plugins must release the lock before awaiting anything:
//!
//! ```rust,ignore
//! let total = {
//!     let mut session = ctx.session.lock();
//!     let count: i64 = session.get("karma", "cake")?.unwrap_or(0);
//!     session.put("karma", "cake", &(count + 1))?;
//!     count + 1
//! };
//! ctx.outbox.reply(format!("cake: {total}"), channel).await?;
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::SessionResult;

/// Session handle shared by the router and all plugins.
pub type SharedSession = Arc<Mutex<Session>>;

type Tables = BTreeMap<String, BTreeMap<String, Value>>;

/// Table-oriented JSON store.
#[derive(Debug, Default)]
pub struct Session {
    path: Option<PathBuf>,
    tables: Tables,
    dirty: bool,
}

impl Session {
    /// A session that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the session stored at `path`. A missing file yields an empty
    /// session that will be created on the first commit.
    pub fn open(path: impl AsRef<Path>) -> SessionResult<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                Tables::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            debug!(path = %path.display(), "No session file yet, starting empty");
            Tables::new()
        };

        info!(path = %path.display(), tables = tables.len(), "Session loaded");
        Ok(Self {
            path: Some(path),
            tables,
            dirty: false,
        })
    }

    /// Wraps the session for sharing.
    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    /// Reads and deserializes a value.
    pub fn get<T: DeserializeOwned>(&self, table: &str, key: &str) -> SessionResult<Option<T>> {
        self.tables
            .get(table)
            .and_then(|t| t.get(key))
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(Into::into)
    }

    /// Serializes and stores a value, replacing any previous one.
    pub fn put<T: Serialize>(&mut self, table: &str, key: &str, value: &T) -> SessionResult<()> {
        let value = serde_json::to_value(value)?;
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self.dirty = true;
        Ok(())
    }

    /// Removes a value, returning whether it existed.
    pub fn remove(&mut self, table: &str, key: &str) -> bool {
        let removed = self
            .tables
            .get_mut(table)
            .and_then(|t| t.remove(key))
            .is_some();
        self.dirty |= removed;
        removed
    }

    /// Iterates over the raw entries of a table in key order.
    pub fn entries(&self, table: &str) -> impl Iterator<Item = (&str, &Value)> {
        self.tables
            .get(table)
            .into_iter()
            .flat_map(|t| t.iter().map(|(k, v)| (k.as_str(), v)))
    }

    /// Whether there are uncommitted changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Writes pending changes to disk.
    ///
    /// The document is written to a sibling temporary file and renamed over
    /// the target so a crash mid-write never leaves a truncated session.
    /// In-memory sessions and clean sessions are a no-op.
    pub fn commit(&mut self) -> SessionResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let Some(path) = &self.path else {
            self.dirty = false;
            return Ok(());
        };

        let data = serde_json::to_vec_pretty(&self.tables)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, path)?;
        self.dirty = false;

        debug!(path = %path.display(), "Session committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let mut session = Session::in_memory();
        session.put("karma", "cake", &3i64).unwrap();
        assert_eq!(session.get::<i64>("karma", "cake").unwrap(), Some(3));
        assert_eq!(session.get::<i64>("karma", "pie").unwrap(), None);
        assert!(session.remove("karma", "cake"));
        assert!(!session.remove("karma", "cake"));
        assert_eq!(session.entries("karma").count(), 0);
    }

    #[test]
    fn test_type_mismatch_is_error() {
        let mut session = Session::in_memory();
        session.put("t", "k", &"text").unwrap();
        assert!(session.get::<i64>("t", "k").is_err());
    }

    #[test]
    fn test_commit_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");

        let mut session = Session::open(&path).unwrap();
        session.put("karma", "cake", &7i64).unwrap();
        assert!(session.is_dirty());
        session.commit().unwrap();
        assert!(!session.is_dirty());

        let reopened = Session::open(&path).unwrap();
        assert_eq!(reopened.get::<i64>("karma", "cake").unwrap(), Some(7));
    }

    #[test]
    fn test_clean_commit_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let mut session = Session::open(&path).unwrap();
        session.commit().unwrap();
        assert!(!path.exists());
    }
}
