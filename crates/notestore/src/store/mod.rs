//! Node Store: owner-partitioned nodes with optimistic concurrency.
//!
//! [`NodeStore`] holds the write protocol (create-only vs versioned writes,
//! parent roll-ups, conflict classification). Persistence sits behind the
//! [`NodeBackend`] trait, which only has to scan a per-owner ordered index,
//! do point reads, and apply a [`WriteBatch`] atomically.

mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{ConflictKind, NoteError};
use crate::path;
use crate::version::VersionClock;

/// A stored node as seen by readers. `version` is `None` when nothing is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub path: String,
    pub content: String,
    pub version: Option<String>,
}

impl Node {
    /// Placeholder returned for paths with no node.
    pub fn empty(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: String::new(),
            version: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.version.is_some()
    }
}

/// Arguments to [`NodeStore::set_node`]. `path` must already be normalized.
#[derive(Debug, Clone, Default)]
pub struct SetRequest {
    pub path: String,
    pub content: String,
    /// Version from a prior read. Absent or blank means create-only.
    pub if_match_version: Option<String>,
    /// New content for the immediate parent; required iff `path` has one.
    pub parent_rollup: Option<String>,
}

impl SetRequest {
    pub fn create(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn if_match(mut self, version: impl Into<String>) -> Self {
        self.if_match_version = Some(version.into());
        self
    }

    pub fn with_rollup(mut self, rollup: impl Into<String>) -> Self {
        self.parent_rollup = Some(rollup.into());
        self
    }

    fn match_version(&self) -> Option<&str> {
        self.if_match_version
            .as_deref()
            .filter(|v| !v.trim().is_empty())
    }
}

/// Condition a single put must satisfy for its batch to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// No node may exist at the key.
    NotExists,
    /// The stored version must equal this token exactly.
    VersionEquals(String),
    /// Unconditional overwrite.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutItem {
    pub path: String,
    pub content: String,
    pub version: String,
    pub precondition: Precondition,
}

/// Puts applied as one all-or-nothing unit within a single owner's partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    pub items: Vec<PutItem>,
}

impl WriteBatch {
    pub fn put(mut self, item: PutItem) -> Self {
        self.items.push(item);
        self
    }
}

/// Which slice of an owner's listing index to scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRange {
    All,
    /// Paths strictly below `prefix`, i.e. starting with `prefix + "/"`.
    Descendants(String),
}

impl ListRange {
    /// Half-open `[start, end)` bounds over listing keys for descendant scans.
    ///
    /// `'0'` is the byte after `'/'`, so the range covers exactly the keys
    /// that start with `prefix/` and nothing like `prefix-x` or `prefixes`.
    pub fn descendant_bounds(prefix: &str) -> (String, String) {
        (format!("{}/", prefix), format!("{}0", prefix))
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("precondition failed")]
    ConditionFailed,

    #[error("{0}")]
    Unavailable(String),
}

impl From<BackendError> for NoteError {
    fn from(err: BackendError) -> Self {
        NoteError::StorageUnavailable(err.to_string())
    }
}

/// Persistence seam for the store.
///
/// Implementations must make [`NodeBackend::apply`] atomic: when any
/// precondition fails nothing in the batch becomes visible and
/// `BackendError::ConditionFailed` is returned.
#[async_trait]
pub trait NodeBackend: Send + Sync {
    /// Paths in ascending order.
    async fn scan_paths(&self, owner: &str, range: ListRange) -> Result<Vec<String>, BackendError>;

    /// Existence check that never reads content.
    async fn exists(&self, owner: &str, path: &str) -> Result<bool, BackendError>;

    /// Strongly consistent point read.
    async fn fetch(&self, owner: &str, path: &str) -> Result<Option<Node>, BackendError>;

    async fn apply(&self, owner: &str, batch: WriteBatch) -> Result<(), BackendError>;

    /// Idempotent delete.
    async fn remove(&self, owner: &str, path: &str) -> Result<(), BackendError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// The store. Cheap to clone; clones share the backend and clock.
#[derive(Clone)]
pub struct NodeStore {
    backend: Arc<dyn NodeBackend>,
    clock: Arc<VersionClock>,
}

impl NodeStore {
    pub fn new(backend: Arc<dyn NodeBackend>) -> Self {
        Self::with_clock(backend, VersionClock::shared())
    }

    pub fn with_clock(backend: Arc<dyn NodeBackend>, clock: Arc<VersionClock>) -> Self {
        Self { backend, clock }
    }

    /// Store backed by a fresh in-process map.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// All paths for `owner`, or the prefix node (if present) followed by its descendants.
    pub async fn list_paths(
        &self,
        owner: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<String>, NoteError> {
        let Some(prefix) = prefix.filter(|p| !p.is_empty()) else {
            return Ok(self.backend.scan_paths(owner, ListRange::All).await?);
        };

        let descendants = self
            .backend
            .scan_paths(owner, ListRange::Descendants(prefix.to_string()))
            .await?;

        if self.backend.exists(owner, prefix).await? {
            let mut paths = Vec::with_capacity(descendants.len() + 1);
            paths.push(prefix.to_string());
            paths.extend(descendants);
            Ok(paths)
        } else {
            Ok(descendants)
        }
    }

    /// Read a node; absent nodes come back as [`Node::empty`].
    pub async fn get_node(&self, owner: &str, path: &str) -> Result<Node, NoteError> {
        Ok(self
            .backend
            .fetch(owner, path)
            .await?
            .unwrap_or_else(|| Node::empty(path)))
    }

    /// Conditionally write a node (and its parent roll-up). Returns the new version.
    pub async fn set_node(&self, owner: &str, request: SetRequest) -> Result<String, NoteError> {
        let parent = path::parent(&request.path);
        match (parent, request.parent_rollup.is_some()) {
            (Some(parent), false) => {
                return Err(NoteError::ParentRequired {
                    parent: parent.to_string(),
                })
            }
            (None, true) => {
                return Err(NoteError::validation(
                    "parentRollup must not be set when path has no parent (root-level path).",
                ))
            }
            _ => {}
        }

        let (precondition, conflict) = match request.match_version() {
            Some(version) => (
                Precondition::VersionEquals(version.to_string()),
                ConflictKind::Update,
            ),
            None => (Precondition::NotExists, ConflictKind::Create),
        };

        let version = self.clock.next();
        let mut batch = WriteBatch::default().put(PutItem {
            path: request.path.clone(),
            content: request.content,
            version: version.clone(),
            precondition,
        });

        // Roll-up write is last-writer-wins.
        if let (Some(parent), Some(rollup)) = (parent, request.parent_rollup) {
            batch = batch.put(PutItem {
                path: parent.to_string(),
                content: rollup,
                version: version.clone(),
                precondition: Precondition::None,
            });
        }

        match self.backend.apply(owner, batch).await {
            Ok(()) => {
                debug!(owner, path = %request.path, %version, "node written");
                Ok(version)
            }
            Err(BackendError::ConditionFailed) => {
                warn!(owner, path = %request.path, ?conflict, "write precondition failed");
                Err(NoteError::Conflict { kind: conflict })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a node. Missing nodes are not an error.
    pub async fn delete_node(&self, owner: &str, path: &str) -> Result<(), NoteError> {
        self.backend.remove(owner, path).await?;
        debug!(owner, path, "node deleted");
        Ok(())
    }
}

impl std::fmt::Debug for NodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStore")
            .field("backend", &self.backend.name())
            .finish()
    }
}
