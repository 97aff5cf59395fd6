//! Wire bridge core: session lifecycle, authenticated request client and the
//! chat operations built on top of them.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use directories::ProjectDirs;
use tracing::info;

pub mod account;
pub mod client;
pub mod config;
pub mod conversations;
pub mod error;
pub mod gateway;
pub mod models;
pub mod session;

pub use account::{AccountService, ConfigOutcome, ConnectionStatus, IdentitySummary, SettingsSummary};
pub use client::{RemoteClient, RemoteRequest, RemoteResponse};
pub use config::BridgeConfig;
pub use conversations::{
    ConversationService, FileSendOutcome, LinksSent, SendFilesRequest, SendLinksRequest,
    SharedLink,
};
pub use error::{ApiError, ApiResult};
pub use gateway::{ApiGateway, ApiRequest, Payload, RawPayload};
pub use models::{Avatar, Conversation, EnrichedPost, Post, RemoteUser, SessionBootstrap, Team};
pub use session::{SessionCookie, SessionManager};

pub use wire_bridge_host::{
    DirectoryStorage, FileStorage, HostDatabase, NodeKind, SharePermission, SqliteShareManager,
    StorageNode, UserCredential,
};

#[derive(Debug, Clone)]
pub struct BridgePaths {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    /// Root of the host file tree, one directory per host user.
    pub files_dir: PathBuf,
}

impl BridgePaths {
    pub fn from_env() -> Self {
        if let Some(dir) = std::env::var_os("WIRE_BRIDGE_DATA_DIR") {
            return Self::from_base(PathBuf::from(dir));
        }
        if let Some(dirs) = ProjectDirs::from("com", "wire-bridge", "wire-bridge") {
            return Self::from_base(dirs.data_dir().to_path_buf());
        }
        Self::from_base(PathBuf::from(".wire-bridge"))
    }

    pub fn from_base(base_dir: PathBuf) -> Self {
        let config_path = base_dir.join("bridge.toml");
        let db_path = base_dir.join("bridge.db");
        let files_dir = base_dir.join("files");
        Self {
            base_dir,
            config_path,
            db_path,
            files_dir,
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(&self.files_dir)?;
        Ok(())
    }
}

/// Everything a front end needs, wired over one host database.
pub struct Bridge {
    pub paths: BridgePaths,
    pub config: BridgeConfig,
    pub db: HostDatabase,
    pub files: Arc<DirectoryStorage>,
    pub shares: Arc<SqliteShareManager>,
    pub gateway: Arc<ApiGateway>,
    pub conversations: Arc<ConversationService>,
    pub account: AccountService,
}

impl Bridge {
    pub async fn open(paths: BridgePaths) -> Result<Self> {
        paths.ensure_dirs()?;
        let config = BridgeConfig::load(&paths.config_path)?;
        let db = HostDatabase::open(&paths.db_path).await?;
        info!("Bridge data directory: {}", paths.base_dir.display());
        Self::assemble(paths, config, db)
    }

    pub fn assemble(paths: BridgePaths, config: BridgeConfig, db: HostDatabase) -> Result<Self> {
        let store = Arc::new(db.credentials());
        let files = Arc::new(db.file_storage(&paths.files_dir));
        let shares = Arc::new(db.shares(
            &config.shares.public_base_url,
            config.shares.default_expire_days,
        ));
        let gateway = Arc::new(ApiGateway::new(&config, store)?);
        let conversations = Arc::new(ConversationService::new(
            gateway.clone(),
            files.clone(),
            shares.clone(),
            config.search.clone(),
        ));
        let account = AccountService::new(conversations.clone());

        Ok(Self {
            paths,
            config,
            db,
            files,
            shares,
            gateway,
            conversations,
            account,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_paths_layout() {
        let paths = BridgePaths::from_base(PathBuf::from("/data/bridge"));
        assert_eq!(paths.config_path, PathBuf::from("/data/bridge/bridge.toml"));
        assert_eq!(paths.db_path, PathBuf::from("/data/bridge/bridge.db"));
        assert_eq!(paths.files_dir, PathBuf::from("/data/bridge/files"));
    }

    #[tokio::test]
    async fn test_open_reads_config_and_persists_settings() {
        let dir = tempfile::tempdir().unwrap();
        let paths = BridgePaths::from_base(dir.path().join("state"));
        std::fs::create_dir_all(&paths.base_dir).unwrap();
        std::fs::write(
            &paths.config_path,
            "[remote]\ndefault_url = \"https://chat.example\"\n",
        )
        .unwrap();

        let bridge = Bridge::open(paths.clone()).await.unwrap();
        assert!(paths.files_dir.is_dir());
        assert_eq!(
            bridge.account.remote_url("alice").await.unwrap(),
            "https://chat.example"
        );

        let mut values = BTreeMap::new();
        values.insert("url".to_string(), "https://mine.example".to_string());
        bridge.account.set_config("alice", &values).await.unwrap();
        drop(bridge);

        let reopened = Bridge::open(paths).await.unwrap();
        assert_eq!(
            reopened.account.remote_url("alice").await.unwrap(),
            "https://mine.example"
        );
    }
}
