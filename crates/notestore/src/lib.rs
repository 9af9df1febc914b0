//! Per-user hierarchical note storage.
//!
//! Nodes are keyed by `(owner, path)` where `path` is a canonical
//! slash-separated key (see [`path::normalize`]). Writes are optimistic:
//! a create only succeeds if nothing is stored yet, an update only if the
//! caller presents the version it last read. Writing a child path also
//! rewrites its parent's roll-up in the same atomic batch.
//!
//! ```rust,no_run
//! use notestore::{NodeStore, SetRequest};
//!
//! # async fn demo() -> Result<(), notestore::NoteError> {
//! let store = NodeStore::in_memory();
//! store.set_node("u1", SetRequest::create("personal", "notes")).await?;
//! store
//!     .set_node(
//!         "u1",
//!         SetRequest::create("personal/preferences", "dark mode").with_rollup("notes"),
//!     )
//!     .await?;
//!
//! let node = store.get_node("u1", "personal/preferences").await?;
//! store
//!     .set_node(
//!         "u1",
//!         SetRequest::create("personal/preferences", "light mode")
//!             .if_match(node.version.unwrap_or_default())
//!             .with_rollup("notes (updated)"),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod path;
pub mod safety;
pub mod store;
pub mod version;

pub use error::{ConflictKind, NoteError};
pub use path::{normalize, PathError};
pub use safety::{contains_secret_like, validate_bounds, SafetyError};
pub use store::{
    BackendError, MemoryBackend, Node, NodeBackend, NodeStore, SetRequest, SqliteBackend,
};
pub use version::VersionClock;
