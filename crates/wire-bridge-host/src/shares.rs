//! Public link-shares on host files and folders.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::files::StorageNode;

const PERMISSION_READ: i64 = 1;
const PERMISSION_UPDATE: i64 = 2;
const TOKEN_LEN: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharePermission {
    Read,
    Edit,
}

impl SharePermission {
    /// Only the literal "edit" grants write access.
    pub fn from_request(value: &str) -> Self {
        if value == "edit" {
            SharePermission::Edit
        } else {
            SharePermission::Read
        }
    }

    pub fn bits(self) -> i64 {
        match self {
            SharePermission::Read => PERMISSION_READ,
            SharePermission::Edit => PERMISSION_READ | PERMISSION_UPDATE,
        }
    }

    fn from_bits(bits: i64) -> Self {
        if bits & PERMISSION_UPDATE != 0 {
            SharePermission::Edit
        } else {
            SharePermission::Read
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewShare {
    pub node: StorageNode,
    pub permission: SharePermission,
    pub shared_by: String,
    pub label: String,
    pub expiration: Option<NaiveDate>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Share {
    pub id: i64,
    pub token: String,
    pub node_id: i64,
    pub node_name: String,
    pub permission: SharePermission,
    pub shared_by: String,
    pub label: String,
    pub expiration: Option<NaiveDate>,
    pub password_protected: bool,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ShareManager: Send + Sync {
    /// Create a link-share. The host may apply its own default expiration.
    async fn create_share(&self, share: NewShare) -> Result<Share>;

    /// Persist permission, label and expiration changes.
    async fn update_share(&self, share: &Share) -> Result<Share>;

    /// Absolute public URL for a share token.
    fn share_url(&self, token: &str) -> String;
}

#[derive(Clone)]
pub struct SqliteShareManager {
    pool: SqlitePool,
    public_base_url: String,
    default_expire_days: Option<u32>,
}

type ShareRow = (
    i64,
    String,
    i64,
    String,
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
);

impl SqliteShareManager {
    pub fn new(pool: SqlitePool, public_base_url: &str, default_expire_days: Option<u32>) -> Self {
        Self {
            pool,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            default_expire_days,
        }
    }

    pub async fn share_by_token(&self, token: &str) -> Result<Option<Share>> {
        let row = sqlx::query_as::<_, ShareRow>(
            "SELECT id, token, node_id, node_name, permissions, shared_by, label, \
            expiration, password_hash, created_at FROM shares WHERE token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(share_from_row))
    }

    async fn share_by_id(&self, id: i64) -> Result<Share> {
        let row = sqlx::query_as::<_, ShareRow>(
            "SELECT id, token, node_id, node_name, permissions, shared_by, label, \
            expiration, password_hash, created_at FROM shares WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(share_from_row)
            .ok_or_else(|| anyhow!("share {} does not exist", id))
    }
}

fn share_from_row(row: ShareRow) -> Share {
    let (id, token, node_id, node_name, permissions, shared_by, label, expiration, password_hash, created_at) =
        row;
    Share {
        id,
        token,
        node_id,
        node_name,
        permission: SharePermission::from_bits(permissions),
        shared_by,
        label,
        expiration: expiration.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        password_protected: password_hash.is_some(),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    }
}

fn generate_token() -> String {
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes());
    encoded[..TOKEN_LEN].to_string()
}

fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let digest = base64::engine::general_purpose::STANDARD.encode(hasher.finalize());
    format!("sha256${}${}", salt, digest)
}

#[async_trait]
impl ShareManager for SqliteShareManager {
    #[instrument(skip(self, share), fields(node = share.node.id))]
    async fn create_share(&self, share: NewShare) -> Result<Share> {
        let expiration = share.expiration.or_else(|| {
            self.default_expire_days
                .map(|days| Utc::now().date_naive() + Duration::days(i64::from(days)))
        });
        let password_hash = share.password.as_deref().map(hash_password);
        let token = generate_token();

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO shares (token, node_id, node_name, permissions, shared_by, label, \
            expiration, password_hash, created_at) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) RETURNING id",
        )
        .bind(&token)
        .bind(share.node.id)
        .bind(&share.node.name)
        .bind(share.permission.bits())
        .bind(&share.shared_by)
        .bind(&share.label)
        .bind(expiration.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(password_hash)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        info!("Created link share {} on node {}", id, share.node.id);
        self.share_by_id(id).await
    }

    #[instrument(skip(self, share), fields(share = share.id))]
    async fn update_share(&self, share: &Share) -> Result<Share> {
        let updated = sqlx::query(
            "UPDATE shares SET permissions = ?1, label = ?2, expiration = ?3 WHERE id = ?4",
        )
        .bind(share.permission.bits())
        .bind(&share.label)
        .bind(share.expiration.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(share.id)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(anyhow!("share {} does not exist", share.id));
        }
        self.share_by_id(share.id).await
    }

    fn share_url(&self, token: &str) -> String {
        format!("{}/s/{}", self.public_base_url, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::NodeKind;
    use crate::HostDatabase;

    fn node() -> StorageNode {
        StorageNode {
            id: 7,
            name: "report.pdf".to_string(),
            path: "report.pdf".to_string(),
            kind: NodeKind::File,
            size: 10,
        }
    }

    fn new_share(expiration: Option<NaiveDate>) -> NewShare {
        NewShare {
            node: node(),
            permission: SharePermission::Read,
            shared_by: "alice".to_string(),
            label: "Wire (General)".to_string(),
            expiration,
            password: None,
        }
    }

    #[test]
    fn test_permission_bits() {
        assert_eq!(SharePermission::from_request("edit").bits(), 3);
        assert_eq!(SharePermission::from_request("view").bits(), 1);
        assert_eq!(SharePermission::from_request("EDIT"), SharePermission::Read);
    }

    #[tokio::test]
    async fn test_default_expiration_applied_and_cleared() {
        let db = HostDatabase::in_memory().await.unwrap();
        let shares = db.shares("https://cloud.example.com/", Some(7));

        let created = shares.create_share(new_share(None)).await.unwrap();
        assert!(created.expiration.is_some());

        let mut cleared = created.clone();
        cleared.expiration = None;
        let stored = shares.update_share(&cleared).await.unwrap();
        assert_eq!(stored.expiration, None);
        assert_eq!(
            shares.share_by_token(&created.token).await.unwrap().unwrap().expiration,
            None
        );
    }

    #[tokio::test]
    async fn test_explicit_expiration_and_password() {
        let db = HostDatabase::in_memory().await.unwrap();
        let shares = db.shares("https://cloud.example.com", Some(7));
        let date = NaiveDate::from_ymd_opt(2030, 1, 31).unwrap();

        let mut request = new_share(Some(date));
        request.password = Some("hunter2".to_string());
        request.permission = SharePermission::Edit;
        let created = shares.create_share(request).await.unwrap();

        assert_eq!(created.expiration, Some(date));
        assert!(created.password_protected);
        assert_eq!(created.permission, SharePermission::Edit);
        assert_eq!(created.token.len(), TOKEN_LEN);
        assert_eq!(
            shares.share_url(&created.token),
            format!("https://cloud.example.com/s/{}", created.token)
        );
    }

    #[test]
    fn test_tokens_are_url_safe() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LEN);
        assert_ne!(a, b);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_password_hash_is_salted() {
        let a = hash_password("secret");
        let b = hash_password("secret");
        assert_ne!(a, b);
        assert!(a.starts_with("sha256$"));
        assert!(!a.contains("secret"));
    }
}
