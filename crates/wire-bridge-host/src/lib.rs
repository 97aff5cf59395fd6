//! Host environment collaborators for wire-bridge.
//!
//! The bridge core never owns persistence. It talks to three host services:
//! - `CredentialStore`: per-user and per-installation key/value settings
//! - `FileStorage`: resolves host file ids to files and folders
//! - `ShareManager`: creates public link-shares on those nodes
//!
//! `HostDatabase` opens the SQLite file backing the default implementations.

pub mod credentials;
pub mod files;
pub mod shares;

use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::instrument;

pub use credentials::{
    keys, CredentialStore, MemoryCredentialStore, SessionTokens, SqliteCredentialStore,
    UserCredential,
};
pub use files::{DirectoryStorage, FileStorage, NodeKind, StorageNode};
pub use shares::{NewShare, Share, SharePermission, ShareManager, SqliteShareManager};

/// SQLite database shared by the host stores.
#[derive(Clone)]
pub struct HostDatabase {
    pool: SqlitePool,
}

impl HostDatabase {
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::from_str("sqlite:")?
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.init_schema(true).await?;
        Ok(db)
    }

    /// Private in-memory database. A single connection keeps the data alive.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.init_schema(false).await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn credentials(&self) -> SqliteCredentialStore {
        SqliteCredentialStore::new(self.pool.clone())
    }

    pub fn file_storage(&self, root: &Path) -> DirectoryStorage {
        DirectoryStorage::new(root, self.pool.clone())
    }

    pub fn shares(
        &self,
        public_base_url: &str,
        default_expire_days: Option<u32>,
    ) -> SqliteShareManager {
        SqliteShareManager::new(self.pool.clone(), public_base_url, default_expire_days)
    }

    #[instrument(skip_all)]
    async fn init_schema(&self, wal: bool) -> Result<()> {
        if wal {
            sqlx::query("PRAGMA journal_mode=WAL;")
                .execute(&self.pool)
                .await?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS user_values (\
                user_id TEXT NOT NULL,\
                key TEXT NOT NULL,\
                value TEXT NOT NULL,\
                PRIMARY KEY (user_id, key)\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS app_values (\
                key TEXT PRIMARY KEY,\
                value TEXT NOT NULL\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS file_cache (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                user_id TEXT NOT NULL,\
                path TEXT NOT NULL,\
                UNIQUE(user_id, path)\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS shares (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                token TEXT NOT NULL UNIQUE,\
                node_id INTEGER NOT NULL,\
                node_name TEXT NOT NULL,\
                permissions INTEGER NOT NULL,\
                shared_by TEXT NOT NULL,\
                label TEXT NOT NULL,\
                expiration TEXT,\
                password_hash TEXT,\
                created_at TEXT NOT NULL\
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
