//! SQLite-backed version store.
//!
//! Versions are stored one row each, with the canonical content and actor
//! set serialized as JSON. Rows are ordered by an autoincrement sequence so
//! "latest" means "most recently inserted", matching the in-memory store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::store::{StoreResult, VersionStore};
use super::{DocumentKey, Version, VersionMeta};
use crate::error::FolioError;
use crate::hash::ContentHash;

const VERSION_COLUMNS: &str =
    "id, document_key, created_at, content_hash, actor_ids, content, expires_at, label";

/// SQLite-backed version storage.
///
/// # Thread Safety
///
/// The connection is wrapped in a `Mutex` for thread-safe access.
pub struct SqliteVersionStore {
    conn: Mutex<Connection>,
}

impl SqliteVersionStore {
    /// Open or create a SQLite database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or if schema
    /// initialization fails.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database for testing.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS versions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                document_key TEXT NOT NULL,
                created_at TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                actor_ids TEXT NOT NULL,
                content TEXT NOT NULL,
                -- RFC 3339 with fixed precision, so text order is time order
                expires_at TEXT,
                label TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_versions_key_seq ON versions(document_key, seq);
            CREATE INDEX IF NOT EXISTS idx_versions_expires ON versions(expires_at);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| FolioError::Store("version store lock poisoned".to_string()))
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| FolioError::Store(format!("invalid timestamp '{}': {}", s, e)))
}

/// Raw column values of a `versions` row.
struct VersionRow {
    id: String,
    document_key: String,
    created_at: String,
    content_hash: String,
    actor_ids: String,
    content: String,
    expires_at: Option<String>,
    label: Option<String>,
}

impl VersionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            document_key: row.get(1)?,
            created_at: row.get(2)?,
            content_hash: row.get(3)?,
            actor_ids: row.get(4)?,
            content: row.get(5)?,
            expires_at: row.get(6)?,
            label: row.get(7)?,
        })
    }

    fn into_version(self) -> StoreResult<Version> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| FolioError::Store(format!("invalid version id '{}': {}", self.id, e)))?;

        Ok(Version {
            id,
            document_key: self.document_key.parse()?,
            created_at: parse_timestamp(&self.created_at)?,
            content_hash: ContentHash::from_hex(self.content_hash),
            actor_ids: serde_json::from_str(&self.actor_ids)?,
            content: serde_json::from_str(&self.content)?,
            expires_at: self.expires_at.as_deref().map(parse_timestamp).transpose()?,
            label: self.label,
        })
    }
}

impl VersionStore for SqliteVersionStore {
    fn find_latest(&self, key: &DocumentKey) -> StoreResult<Option<Version>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {VERSION_COLUMNS} FROM versions WHERE document_key = ? ORDER BY seq DESC LIMIT 1"
                ),
                params![key.to_string()],
                VersionRow::from_row,
            )
            .optional()?;
        row.map(VersionRow::into_version).transpose()
    }

    fn insert(&self, version: &Version) -> StoreResult<()> {
        let conn = self.lock()?;
        let id = version.id.to_string();

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM versions WHERE id = ?)",
            params![id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(FolioError::DuplicateVersion(version.id));
        }

        conn.execute(
            "INSERT INTO versions (id, document_key, created_at, content_hash, actor_ids, content, expires_at, label)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                version.document_key.to_string(),
                format_timestamp(&version.created_at),
                version.content_hash.as_str(),
                serde_json::to_string(&version.actor_ids)?,
                serde_json::to_string(&version.content)?,
                version.expires_at.as_ref().map(format_timestamp),
                version.label,
            ],
        )?;
        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Version>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {VERSION_COLUMNS} FROM versions WHERE id = ?"),
                params![id.to_string()],
                VersionRow::from_row,
            )
            .optional()?;
        row.map(VersionRow::into_version).transpose()
    }

    fn list(&self, key: &DocumentKey, limit: Option<usize>) -> StoreResult<Vec<VersionMeta>> {
        let conn = self.lock()?;
        // SQLite treats a negative LIMIT as "no limit"
        let limit = limit.map(|l| l.min(i64::MAX as usize) as i64).unwrap_or(-1);

        let mut stmt = conn.prepare(&format!(
            "SELECT {VERSION_COLUMNS} FROM versions WHERE document_key = ? ORDER BY seq DESC LIMIT ?"
        ))?;
        let rows = stmt
            .query_map(params![key.to_string(), limit], VersionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|row| row.into_version().map(|v| v.meta()))
            .collect()
    }

    fn set_label(&self, id: Uuid, label: Option<&str>) -> StoreResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE versions SET label = ? WHERE id = ?",
            params![label, id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.lock()?;
        let purged = conn.execute(
            "DELETE FROM versions WHERE expires_at IS NOT NULL AND expires_at <= ?",
            params![format_timestamp(&now)],
        )?;
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::CanonicalNode;
    use std::collections::BTreeSet;

    fn version(key: &str, text: &str) -> Version {
        Version::new(
            key.parse().unwrap(),
            CanonicalNode::doc(vec![CanonicalNode::paragraph(text)]),
            BTreeSet::from(["alice".to_string(), "bob".to_string()]),
            Utc::now(),
        )
    }

    #[test]
    fn test_sqlite_insert_and_find() {
        let store = SqliteVersionStore::in_memory().unwrap();
        let v = version("p1", "Hello").with_expiry(Utc::now() + chrono::Duration::days(30));
        store.insert(&v).unwrap();

        assert_eq!(store.find_by_id(v.id).unwrap(), Some(v.clone()));
        assert_eq!(store.find_latest(&"p1".parse().unwrap()).unwrap(), Some(v));
        assert!(store.find_latest(&"p2".parse().unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_sqlite_latest_is_last_inserted() {
        let store = SqliteVersionStore::in_memory().unwrap();
        let v1 = version("p1:draft", "one");
        let v2 = version("p1:draft", "two");
        store.insert(&v1).unwrap();
        store.insert(&v2).unwrap();

        let latest = store
            .find_latest(&"p1:draft".parse().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, v2.id);
    }

    #[test]
    fn test_sqlite_rejects_duplicate_id() {
        let store = SqliteVersionStore::in_memory().unwrap();
        let v = version("p1", "one");
        store.insert(&v).unwrap();
        assert!(matches!(
            store.insert(&v),
            Err(FolioError::DuplicateVersion(_))
        ));
    }

    #[test]
    fn test_sqlite_list_and_label() {
        let store = SqliteVersionStore::in_memory().unwrap();
        let key: DocumentKey = "p1".parse().unwrap();
        let v1 = version("p1", "one");
        let v2 = version("p1", "two");
        store.insert(&v1).unwrap();
        store.insert(&v2).unwrap();

        assert!(store.set_label(v1.id, Some("First")).unwrap());
        assert!(!store.set_label(Uuid::new_v4(), None).unwrap());

        let listed = store.list(&key, None).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, v2.id);
        assert_eq!(listed[1].label.as_deref(), Some("First"));

        assert_eq!(store.list(&key, Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_sqlite_purge_expired() {
        let store = SqliteVersionStore::in_memory().unwrap();
        let now = Utc::now();
        let expired = version("p1", "old").with_expiry(now - chrono::Duration::hours(1));
        let kept = version("p1", "new").with_expiry(now + chrono::Duration::hours(1));
        let forever = version("p1", "pinned");
        for v in [&expired, &kept, &forever] {
            store.insert(v).unwrap();
        }

        assert_eq!(store.purge_expired(now).unwrap(), 1);
        assert!(store.find_by_id(expired.id).unwrap().is_none());
        assert!(store.find_by_id(kept.id).unwrap().is_some());
        assert!(store.find_by_id(forever.id).unwrap().is_some());
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versions.db");
        let v = version("p1", "durable");

        {
            let store = SqliteVersionStore::open(&path).unwrap();
            store.insert(&v).unwrap();
        }

        let store = SqliteVersionStore::open(&path).unwrap();
        let loaded = store.find_by_id(v.id).unwrap().unwrap();
        assert_eq!(loaded.content.text_content(), "durable");
        assert_eq!(loaded.actor_ids, v.actor_ids);
    }
}
