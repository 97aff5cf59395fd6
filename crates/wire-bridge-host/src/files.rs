//! Host file storage: resolves numeric file ids to files and folders.
//!
//! `DirectoryStorage` serves one directory tree per host user and keeps ids
//! stable across runs through the `file_cache` table.

use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageNode {
    pub id: i64,
    pub name: String,
    /// Path relative to the user's root, `/`-separated.
    pub path: String,
    pub kind: NodeKind,
    pub size: u64,
}

impl StorageNode {
    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Resolve an id in the user's tree. Unknown or vanished ids yield `None`.
    async fn node_by_id(&self, user_id: &str, id: i64) -> Result<Option<StorageNode>>;

    async fn read_file(&self, user_id: &str, node: &StorageNode) -> Result<Vec<u8>>;

    /// Every node in the user's tree, sorted by path.
    async fn list(&self, user_id: &str) -> Result<Vec<StorageNode>>;
}

#[derive(Clone)]
pub struct DirectoryStorage {
    root: PathBuf,
    pool: SqlitePool,
}

struct ScannedEntry {
    path: String,
    kind: NodeKind,
    size: u64,
}

impl DirectoryStorage {
    pub fn new(root: &Path, pool: SqlitePool) -> Self {
        Self {
            root: root.to_path_buf(),
            pool,
        }
    }

    /// Root directory of a user's files.
    pub fn user_root(&self, user_id: &str) -> Result<PathBuf> {
        let mut components = Path::new(user_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(user_id)),
            _ => Err(anyhow!("invalid host user id: {:?}", user_id)),
        }
    }

    async fn scan(&self, user_id: &str) -> Result<Vec<ScannedEntry>> {
        let user_root = self.user_root(user_id)?;
        tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();
            if user_root.is_dir() {
                walk(&user_root, "", &mut entries)?;
            }
            Ok::<_, anyhow::Error>(entries)
        })
        .await?
    }

    async fn id_for_path(&self, user_id: &str, path: &str) -> Result<i64> {
        sqlx::query("INSERT OR IGNORE INTO file_cache (user_id, path) VALUES (?1, ?2)")
            .bind(user_id)
            .bind(path)
            .execute(&self.pool)
            .await?;
        let id: i64 =
            sqlx::query_scalar("SELECT id FROM file_cache WHERE user_id = ?1 AND path = ?2")
                .bind(user_id)
                .bind(path)
                .fetch_one(&self.pool)
                .await?;
        Ok(id)
    }
}

fn walk(dir: &Path, prefix: &str, out: &mut Vec<ScannedEntry>) -> Result<()> {
    let read = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    for entry in read {
        let entry = entry?;
        let meta = std::fs::symlink_metadata(entry.path())?;
        if meta.file_type().is_symlink() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let path = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        if meta.is_dir() {
            out.push(ScannedEntry {
                path: path.clone(),
                kind: NodeKind::Folder,
                size: 0,
            });
            walk(&entry.path(), &path, out)?;
        } else if meta.is_file() {
            out.push(ScannedEntry {
                path,
                kind: NodeKind::File,
                size: meta.len(),
            });
        }
    }
    Ok(())
}

fn node_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

#[async_trait]
impl FileStorage for DirectoryStorage {
    #[instrument(skip(self))]
    async fn node_by_id(&self, user_id: &str, id: i64) -> Result<Option<StorageNode>> {
        let path: Option<String> =
            sqlx::query_scalar("SELECT path FROM file_cache WHERE id = ?1 AND user_id = ?2")
                .bind(id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(path) = path else {
            return Ok(None);
        };

        let full = self.user_root(user_id)?.join(&path);
        let meta = match tokio::fs::symlink_metadata(&full).await {
            Ok(meta) => meta,
            Err(_) => {
                debug!("File id {} points to a vanished path", id);
                return Ok(None);
            }
        };
        let kind = if meta.is_dir() {
            NodeKind::Folder
        } else if meta.is_file() {
            NodeKind::File
        } else {
            return Ok(None);
        };

        Ok(Some(StorageNode {
            id,
            name: node_name(&path),
            path,
            kind,
            size: if kind == NodeKind::File { meta.len() } else { 0 },
        }))
    }

    async fn read_file(&self, user_id: &str, node: &StorageNode) -> Result<Vec<u8>> {
        if !node.is_file() {
            return Err(anyhow!("{} is not a file", node.path));
        }
        let full = self.user_root(user_id)?.join(&node.path);
        tokio::fs::read(&full)
            .await
            .with_context(|| format!("Failed to read file: {}", full.display()))
    }

    #[instrument(skip(self))]
    async fn list(&self, user_id: &str) -> Result<Vec<StorageNode>> {
        let mut nodes = Vec::new();
        for entry in self.scan(user_id).await? {
            let id = self.id_for_path(user_id, &entry.path).await?;
            nodes.push(StorageNode {
                id,
                name: node_name(&entry.path),
                path: entry.path,
                kind: entry.kind,
                size: entry.size,
            });
        }
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostDatabase;

    async fn storage_with_tree() -> (tempfile::TempDir, DirectoryStorage) {
        let dir = tempfile::tempdir().unwrap();
        let user_root = dir.path().join("alice");
        std::fs::create_dir_all(user_root.join("docs")).unwrap();
        std::fs::write(user_root.join("notes.txt"), b"hello").unwrap();
        std::fs::write(user_root.join("docs").join("plan.md"), b"# plan").unwrap();

        let db = HostDatabase::in_memory().await.unwrap();
        let storage = db.file_storage(dir.path());
        (dir, storage)
    }

    #[tokio::test]
    async fn test_list_assigns_stable_ids() {
        let (_dir, storage) = storage_with_tree().await;

        let first = storage.list("alice").await.unwrap();
        let paths: Vec<_> = first.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["docs", "docs/plan.md", "notes.txt"]);

        let second = storage.list("alice").await.unwrap();
        let ids_first: Vec<_> = first.iter().map(|n| n.id).collect();
        let ids_second: Vec<_> = second.iter().map(|n| n.id).collect();
        assert_eq!(ids_first, ids_second);
    }

    #[tokio::test]
    async fn test_node_by_id_and_read() {
        let (_dir, storage) = storage_with_tree().await;
        let nodes = storage.list("alice").await.unwrap();
        let plan = nodes.iter().find(|n| n.name == "plan.md").unwrap();

        let node = storage.node_by_id("alice", plan.id).await.unwrap().unwrap();
        assert_eq!(node.kind, NodeKind::File);
        assert_eq!(node.size, 6);
        assert_eq!(storage.read_file("alice", &node).await.unwrap(), b"# plan");

        let folder = nodes.iter().find(|n| n.name == "docs").unwrap();
        let folder = storage.node_by_id("alice", folder.id).await.unwrap().unwrap();
        assert_eq!(folder.kind, NodeKind::Folder);
        assert!(storage.read_file("alice", &folder).await.is_err());
    }

    #[tokio::test]
    async fn test_ids_are_scoped_per_user() {
        let (dir, storage) = storage_with_tree().await;
        std::fs::create_dir_all(dir.path().join("bob")).unwrap();
        let nodes = storage.list("alice").await.unwrap();

        assert!(storage.node_by_id("bob", nodes[0].id).await.unwrap().is_none());
        assert!(storage.node_by_id("alice", 9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_vanished_file_resolves_to_none() {
        let (dir, storage) = storage_with_tree().await;
        let nodes = storage.list("alice").await.unwrap();
        let notes = nodes.iter().find(|n| n.name == "notes.txt").unwrap();

        std::fs::remove_file(dir.path().join("alice").join("notes.txt")).unwrap();
        assert!(storage.node_by_id("alice", notes.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_root_rejects_traversal() {
        let (dir, storage) = storage_with_tree().await;
        assert_eq!(
            storage.user_root("alice").unwrap(),
            dir.path().join("alice")
        );
        assert!(storage.user_root("../etc").is_err());
        assert!(storage.user_root("a/b").is_err());
        assert!(storage.user_root("").is_err());
        assert!(storage.list("..").await.is_err());
    }
}
