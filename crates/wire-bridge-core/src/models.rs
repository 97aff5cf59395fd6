//! Remote API payloads.
//!
//! Only the fields the bridge reads are typed; everything else is kept in
//! `extra` so listings can be handed back to callers unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::session::SessionCookie;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedId {
    pub id: String,
    pub domain: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Asset {
    #[serde(default)]
    pub key: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub size: String,
}

/// A remote user, as returned by `/self` and `/users/{domain}/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: String,
    #[serde(default)]
    pub qualified_id: Option<QualifiedId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RemoteUser {
    /// Full-size profile picture, if the user has one.
    pub fn complete_image(&self) -> Option<&Asset> {
        self.assets
            .iter()
            .find(|a| a.kind == "image" && a.size == "complete" && !a.key.is_empty())
    }

    /// Name to draw on a placeholder avatar.
    pub fn placeholder_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.handle.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "??".to_string())
    }

    pub fn domain(&self) -> Option<&str> {
        self.qualified_id.as_ref().map(|q| q.domain.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub qualified_id: Option<QualifiedId>,
    #[serde(default)]
    pub conversation_role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Member {
    pub fn remote_id(&self) -> Option<&str> {
        self.qualified_id
            .as_ref()
            .map(|q| q.id.as_str())
            .or(self.id.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Members {
    #[serde(rename = "self", default)]
    pub self_member: Option<Value>,
    #[serde(default)]
    pub others: Vec<Member>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub qualified_id: Option<QualifiedId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<i64>,
    #[serde(default)]
    pub members: Members,
    /// Filled in by the listing join, never sent by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Conversation {
    pub fn domain(&self) -> Option<&str> {
        self.qualified_id.as_ref().map(|q| q.domain.as_str())
    }

    /// Domain of `remote_user_id` within this conversation, falling back to
    /// the conversation's own domain.
    pub fn member_domain(&self, remote_user_id: &str) -> Option<&str> {
        self.members
            .others
            .iter()
            .find(|m| m.remote_id() == Some(remote_user_id))
            .and_then(|m| m.qualified_id.as_ref())
            .map(|q| q.domain.as_str())
            .or_else(|| self.domain())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationList {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub icon_key: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Team {
    /// Asset key of the team icon, unless the team still uses the stock one.
    pub fn icon_asset(&self) -> Option<&str> {
        self.icon
            .as_deref()
            .filter(|icon| !icon.is_empty() && *icon != "default")
    }

    pub fn placeholder_name(&self) -> String {
        self.name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "??".to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamList {
    #[serde(default)]
    pub teams: Vec<Team>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub channel_id: String,
    pub user_id: String,
    pub create_at: i64,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A mention search hit joined with conversation, team and author details.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedPost {
    #[serde(flatten)]
    pub post: Post,
    pub channel_name: String,
    pub channel_display_name: String,
    pub team_id: String,
    pub team_name: String,
    pub team_display_name: String,
    pub user_name: String,
    pub user_display_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResults {
    #[serde(default, deserialize_with = "posts_list")]
    pub posts: Vec<Post>,
}

/// Search hits arrive either as a list or keyed by post id.
fn posts_list<'de, D>(deserializer: D) -> Result<Vec<Post>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Posts {
        List(Vec<Post>),
        ById(Map<String, Value>),
        Missing(Option<()>),
    }

    match Posts::deserialize(deserializer)? {
        Posts::List(posts) => Ok(posts),
        Posts::ById(map) => map
            .into_values()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .map_err(serde::de::Error::custom),
        Posts::Missing(_) => Ok(Vec::new()),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub file_infos: Vec<FileInfo>,
}

/// Result of a successful password login. Nothing is persisted yet.
#[derive(Debug, Clone)]
pub struct SessionBootstrap {
    pub access_token: String,
    pub expires_in: i64,
    pub remote_user_id: Option<String>,
    pub cookie: SessionCookie,
}

/// Avatar lookup result: image bytes, or what a placeholder needs.
#[derive(Debug, Clone)]
pub enum Avatar<T> {
    Image(Vec<u8>),
    Fallback(T),
}

impl<T> Avatar<T> {
    pub fn is_image(&self) -> bool {
        matches!(self, Avatar::Image(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversation_listing_shape() {
        let list: ConversationList = serde_json::from_value(json!({
            "conversations": [{
                "id": "c1",
                "qualified_id": {"id": "c1", "domain": "wire.example"},
                "name": null,
                "team": "t1",
                "type": 2,
                "access": ["invite"],
                "members": {
                    "self": {"id": "me"},
                    "others": [{
                        "id": "u2",
                        "qualified_id": {"id": "u2", "domain": "other.example"},
                        "conversation_role": "wire_member"
                    }]
                }
            }],
            "has_more": false
        }))
        .unwrap();

        let conv = &list.conversations[0];
        assert_eq!(conv.name, None);
        assert_eq!(conv.kind, Some(2));
        assert_eq!(conv.member_domain("u2"), Some("other.example"));
        assert_eq!(conv.member_domain("stranger"), Some("wire.example"));
        assert!(conv.extra.contains_key("access"));

        let out = serde_json::to_value(conv).unwrap();
        assert!(out.get("team_name").is_none());
        assert_eq!(out["access"], json!(["invite"]));
    }

    #[test]
    fn test_complete_image_asset() {
        let user: RemoteUser = serde_json::from_value(json!({
            "id": "u1",
            "name": "Alice",
            "handle": "alice",
            "assets": [
                {"key": "3-1-preview", "type": "image", "size": "preview"},
                {"key": "3-1-complete", "type": "image", "size": "complete"}
            ]
        }))
        .unwrap();
        assert_eq!(user.complete_image().unwrap().key, "3-1-complete");
        assert_eq!(user.placeholder_name(), "Alice");

        let bare: RemoteUser = serde_json::from_value(json!({"id": "u2", "handle": "bob"})).unwrap();
        assert!(bare.complete_image().is_none());
        assert_eq!(bare.placeholder_name(), "bob");
    }

    #[test]
    fn test_team_icon_asset() {
        let stock: Team = serde_json::from_value(json!({"id": "t1", "icon": "default"})).unwrap();
        assert_eq!(stock.icon_asset(), None);

        let custom: Team =
            serde_json::from_value(json!({"id": "t1", "name": "Ops", "icon": "3-1-abc"})).unwrap();
        assert_eq!(custom.icon_asset(), Some("3-1-abc"));
        assert_eq!(custom.placeholder_name(), "Ops");
    }

    #[test]
    fn test_search_results_accept_list_or_map() {
        let listed: SearchResults = serde_json::from_value(json!({
            "posts": [{"id": "p1", "channel_id": "c1", "user_id": "u1", "create_at": 5}]
        }))
        .unwrap();
        assert_eq!(listed.posts.len(), 1);

        let keyed: SearchResults = serde_json::from_value(json!({
            "order": ["p1"],
            "posts": {"p1": {"id": "p1", "channel_id": "c1", "user_id": "u1", "create_at": 5}}
        }))
        .unwrap();
        assert_eq!(keyed.posts[0].id, "p1");

        let empty: SearchResults = serde_json::from_value(json!({"posts": null})).unwrap();
        assert!(empty.posts.is_empty());
    }
}
