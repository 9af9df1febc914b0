//! SQLite backend with a connection-per-call pattern.
//!
//! Each call opens a fresh connection (WAL, busy timeout) on the blocking
//! pool. Write batches run in an `IMMEDIATE` transaction so concurrent
//! writers serialize on the database lock and each sees the other's commit
//! when it evaluates its preconditions.

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::{BackendError, ListRange, Node, NodeBackend, Precondition, WriteBatch};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    owner TEXT NOT NULL,
    path TEXT NOT NULL,
    content TEXT NOT NULL,
    version TEXT NOT NULL,
    list_key TEXT NOT NULL,
    PRIMARY KEY (owner, path)
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_nodes_listing ON nodes(owner, list_key);
"#;

/// Listing index keys carry a type prefix so other item kinds can share the index.
const LIST_KEY_PREFIX: &str = "PATH#";

fn list_key(path: &str) -> String {
    format!("{}{}", LIST_KEY_PREFIX, path)
}

impl From<rusqlite::Error> for BackendError {
    fn from(err: rusqlite::Error) -> Self {
        BackendError::Unavailable(format!("sqlite: {}", err))
    }
}

#[derive(Debug)]
struct Db {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Db {
    fn conn(&self) -> Result<Connection, BackendError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            BackendError::Unavailable(format!("failed to open {}: {}", self.path.display(), e))
        })?;

        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;

        Ok(conn)
    }

    fn initialize(&self) -> Result<(), BackendError> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn scan_paths(&self, owner: &str, range: &ListRange) -> Result<Vec<String>, BackendError> {
        let conn = self.conn()?;
        let strip = |key: String| key.strip_prefix(LIST_KEY_PREFIX).map(str::to_string);

        let keys: Vec<String> = match range {
            ListRange::All => {
                let mut stmt = conn.prepare(
                    "SELECT list_key FROM nodes WHERE owner = ?1 ORDER BY list_key",
                )?;
                let rows = stmt.query_map([owner], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<_, _>>()?
            }
            ListRange::Descendants(prefix) => {
                let (lo, hi) = ListRange::descendant_bounds(prefix);
                let mut stmt = conn.prepare(
                    "SELECT list_key FROM nodes
                     WHERE owner = ?1 AND list_key >= ?2 AND list_key < ?3
                     ORDER BY list_key",
                )?;
                let rows = stmt.query_map(params![owner, list_key(&lo), list_key(&hi)], |row| {
                    row.get::<_, String>(0)
                })?;
                rows.collect::<Result<_, _>>()?
            }
        };

        Ok(keys.into_iter().filter_map(strip).collect())
    }

    fn exists(&self, owner: &str, path: &str) -> Result<bool, BackendError> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT 1 FROM nodes WHERE owner = ?1 AND path = ?2",
            [owner, path],
            |_| Ok(()),
        );

        match result {
            Ok(()) => Ok(true),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn fetch(&self, owner: &str, path: &str) -> Result<Option<Node>, BackendError> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT content, version FROM nodes WHERE owner = ?1 AND path = ?2",
            [owner, path],
            |row| {
                Ok(Node {
                    path: path.to_string(),
                    content: row.get(0)?,
                    version: Some(row.get(1)?),
                })
            },
        );

        match result {
            Ok(node) => Ok(Some(node)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn apply(&self, owner: &str, batch: &WriteBatch) -> Result<(), BackendError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for item in &batch.items {
            let key = list_key(&item.path);
            let affected = match &item.precondition {
                Precondition::NotExists => tx.execute(
                    "INSERT INTO nodes (owner, path, content, version, list_key)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (owner, path) DO NOTHING",
                    params![owner, item.path, item.content, item.version, key],
                )?,
                Precondition::VersionEquals(expected) => tx.execute(
                    "UPDATE nodes SET content = ?3, version = ?4, list_key = ?5
                     WHERE owner = ?1 AND path = ?2 AND version = ?6",
                    params![owner, item.path, item.content, item.version, key, expected],
                )?,
                Precondition::None => tx.execute(
                    "INSERT INTO nodes (owner, path, content, version, list_key)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (owner, path) DO UPDATE SET
                         content = excluded.content,
                         version = excluded.version,
                         list_key = excluded.list_key",
                    params![owner, item.path, item.content, item.version, key],
                )?,
            };

            if affected == 0 {
                // dropping `tx` rolls back anything already applied
                return Err(BackendError::ConditionFailed);
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn remove(&self, owner: &str, path: &str) -> Result<(), BackendError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM nodes WHERE owner = ?1 AND path = ?2",
            [owner, path],
        )?;
        Ok(())
    }
}

/// SQLite-backed [`NodeBackend`].
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    db: Arc<Db>,
}

impl SqliteBackend {
    pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

    /// Open (creating if needed) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BackendError> {
        Self::open_with_timeout(path, Self::DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout<P: AsRef<Path>>(
        path: P,
        busy_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BackendError::Unavailable(format!(
                    "failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let db = Db { path, busy_timeout };
        db.initialize()?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn path(&self) -> &Path {
        &self.db.path
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, BackendError>
    where
        F: FnOnce(&Db) -> Result<T, BackendError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| BackendError::Unavailable(format!("storage task failed: {}", e)))?
    }
}

#[async_trait]
impl NodeBackend for SqliteBackend {
    async fn scan_paths(&self, owner: &str, range: ListRange) -> Result<Vec<String>, BackendError> {
        let owner = owner.to_string();
        self.blocking(move |db| db.scan_paths(&owner, &range)).await
    }

    async fn exists(&self, owner: &str, path: &str) -> Result<bool, BackendError> {
        let (owner, path) = (owner.to_string(), path.to_string());
        self.blocking(move |db| db.exists(&owner, &path)).await
    }

    async fn fetch(&self, owner: &str, path: &str) -> Result<Option<Node>, BackendError> {
        let (owner, path) = (owner.to_string(), path.to_string());
        self.blocking(move |db| db.fetch(&owner, &path)).await
    }

    async fn apply(&self, owner: &str, batch: WriteBatch) -> Result<(), BackendError> {
        let owner = owner.to_string();
        self.blocking(move |db| db.apply(&owner, &batch)).await
    }

    async fn remove(&self, owner: &str, path: &str) -> Result<(), BackendError> {
        let (owner, path) = (owner.to_string(), path.to_string());
        self.blocking(move |db| db.remove(&owner, &path)).await
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
