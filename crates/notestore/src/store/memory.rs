//! In-process backend. Same semantics as SQLite, nothing survives the process.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{BackendError, ListRange, Node, NodeBackend, Precondition, WriteBatch};

#[derive(Debug, Clone)]
struct Record {
    content: String,
    version: String,
}

type Key = (String, String);

#[derive(Debug, Default)]
pub struct MemoryBackend {
    nodes: RwLock<BTreeMap<Key, Record>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(owner: &str, path: &str) -> Key {
    (owner.to_string(), path.to_string())
}

#[async_trait]
impl NodeBackend for MemoryBackend {
    async fn scan_paths(&self, owner: &str, range: ListRange) -> Result<Vec<String>, BackendError> {
        let nodes = self.nodes.read().await;
        let paths = match range {
            ListRange::All => nodes
                .range(key(owner, "")..)
                .take_while(|((o, _), _)| o == owner)
                .map(|((_, p), _)| p.clone())
                .collect(),
            ListRange::Descendants(prefix) => {
                let (lo, hi) = ListRange::descendant_bounds(&prefix);
                nodes
                    .range(key(owner, &lo)..key(owner, &hi))
                    .map(|((_, p), _)| p.clone())
                    .collect()
            }
        };
        Ok(paths)
    }

    async fn exists(&self, owner: &str, path: &str) -> Result<bool, BackendError> {
        Ok(self.nodes.read().await.contains_key(&key(owner, path)))
    }

    async fn fetch(&self, owner: &str, path: &str) -> Result<Option<Node>, BackendError> {
        Ok(self
            .nodes
            .read()
            .await
            .get(&key(owner, path))
            .map(|record| Node {
                path: path.to_string(),
                content: record.content.clone(),
                version: Some(record.version.clone()),
            }))
    }

    async fn apply(&self, owner: &str, batch: WriteBatch) -> Result<(), BackendError> {
        let mut nodes = self.nodes.write().await;

        // Check everything before touching anything.
        for item in &batch.items {
            let current = nodes.get(&key(owner, &item.path));
            let ok = match &item.precondition {
                Precondition::NotExists => current.is_none(),
                Precondition::VersionEquals(expected) => {
                    current.is_some_and(|record| &record.version == expected)
                }
                Precondition::None => true,
            };
            if !ok {
                return Err(BackendError::ConditionFailed);
            }
        }

        for item in batch.items {
            nodes.insert(
                key(owner, &item.path),
                Record {
                    content: item.content,
                    version: item.version,
                },
            );
        }
        Ok(())
    }

    async fn remove(&self, owner: &str, path: &str) -> Result<(), BackendError> {
        self.nodes.write().await.remove(&key(owner, path));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
