//! Chat operations on top of the gateway.
//!
//! Listing calls reshape the remote payloads (team names, 1:1 conversation
//! names, mention enrichment); write calls send messages, uploaded files and
//! link-shares of host files into a conversation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use wire_bridge_host::{
    FileStorage, NewShare, Share, ShareManager, SharePermission, UserCredential,
};

use crate::client::RemoteRequest;
use crate::config::SearchConfig;
use crate::error::{ApiError, ApiResult};
use crate::gateway::{urlencode, ApiGateway, ApiRequest};
use crate::models::{
    Avatar, Conversation, ConversationList, EnrichedPost, RemoteUser, SearchResults,
    SessionBootstrap, Team, TeamList, UploadResponse,
};
use crate::session::{AccessResponse, SessionCookie};

/// Share host files or folders into a conversation as public links.
#[derive(Debug, Clone)]
pub struct SendLinksRequest {
    pub file_ids: Vec<i64>,
    pub conversation_id: String,
    pub conversation_name: String,
    pub comment: String,
    pub permission: SharePermission,
    pub expiration: Option<NaiveDate>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SharedLink {
    pub name: String,
    pub url: String,
    pub share: Share,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinksSent {
    pub post: Value,
    pub links: Vec<SharedLink>,
}

/// Upload host files into a conversation, after an optional comment.
#[derive(Debug, Clone)]
pub struct SendFilesRequest {
    pub file_ids: Vec<i64>,
    pub conversation_id: String,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileSendOutcome {
    Sent { file_id: i64, post: Value },
    Skipped { file_id: i64, reason: String },
    Failed { file_id: i64, error: String },
}

pub struct ConversationService {
    gateway: Arc<ApiGateway>,
    files: Arc<dyn FileStorage>,
    shares: Arc<dyn ShareManager>,
    search: SearchConfig,
}

impl ConversationService {
    pub fn new(
        gateway: Arc<ApiGateway>,
        files: Arc<dyn FileStorage>,
        shares: Arc<dyn ShareManager>,
        search: SearchConfig,
    ) -> Self {
        Self {
            gateway,
            files,
            shares,
            search,
        }
    }

    pub fn gateway(&self) -> &Arc<ApiGateway> {
        &self.gateway
    }

    /// Password login against the user's resolved server.
    pub async fn login(
        &self,
        user_id: &str,
        login: &str,
        password: &str,
    ) -> ApiResult<SessionBootstrap> {
        let server_url = self.gateway.resolve_base_url(user_id).await?;
        self.login_at(&server_url, login, password).await
    }

    /// Password login against an explicit server. Stores nothing.
    pub async fn login_at(
        &self,
        server_url: &str,
        login: &str,
        password: &str,
    ) -> ApiResult<SessionBootstrap> {
        let url = format!("{}/login?persist=true", server_url.trim_end_matches('/'));
        let request = RemoteRequest::new(Method::POST, url).json(json!({
            "email": login,
            "password": password,
            "persist": true,
        }));

        let response = self.gateway.client().send(request).await.map_err(|err| {
            warn!("Remote login error: {}", err);
            err
        })?;
        if response.is_error() {
            info!("Remote login refused (HTTP {})", response.status);
            return Err(ApiError::BadCredentials);
        }

        let header = response
            .set_cookie()
            .ok_or_else(|| ApiError::InvalidResponse("login response has no session cookie".into()))?;
        let cookie = SessionCookie::from_set_cookie(header);

        let access: AccessResponse = serde_json::from_value(response.json()?)
            .map_err(|e| ApiError::InvalidResponse(format!("unexpected login payload: {}", e)))?;
        let (Some(access_token), Some(expires_in)) = (access.access_token, access.expires_in) else {
            return Err(ApiError::InvalidResponse(
                "login response has no access token".into(),
            ));
        };

        Ok(SessionBootstrap {
            access_token,
            expires_in,
            remote_user_id: access.user,
            cookie,
        })
    }

    /// Revoke the remote session and forget it locally.
    ///
    /// Local credentials are cleared whatever the remote answers. Returns
    /// whether the remote revoke went through.
    pub async fn logout(&self, user_id: &str) -> ApiResult<bool> {
        let credential = UserCredential::load(self.gateway.store().as_ref(), user_id).await?;
        let revoked = if credential.session_cookie.is_some() {
            match self
                .gateway
                .call(user_id, ApiRequest::post("access/logout").with_cookie())
                .await
            {
                Ok(_) => true,
                Err(err) => {
                    warn!("Remote session revoke failed for {}: {}", user_id, err);
                    false
                }
            }
        } else {
            false
        };

        let store = self.gateway.store().as_ref();
        UserCredential::clear_session(store, user_id).await?;
        UserCredential::clear_identity(store, user_id).await?;
        Ok(revoked)
    }

    pub async fn fetch_self(&self, user_id: &str) -> ApiResult<RemoteUser> {
        self.gateway.get_json(user_id, "self").await
    }

    pub async fn fetch_user(
        &self,
        user_id: &str,
        domain: &str,
        remote_user_id: &str,
    ) -> ApiResult<RemoteUser> {
        self.gateway
            .get_json(user_id, &format!("users/{}/{}", domain, remote_user_id))
            .await
    }

    pub async fn list_teams(&self, user_id: &str) -> ApiResult<Vec<Team>> {
        let list: TeamList = self.gateway.get_json(user_id, "teams").await?;
        Ok(list.teams)
    }

    /// Team id to team name. A failing `/teams` call degrades to no names.
    async fn team_names(&self, user_id: &str) -> HashMap<String, Option<String>> {
        match self.list_teams(user_id).await {
            Ok(teams) => teams.into_iter().map(|t| (t.id, t.name)).collect(),
            Err(err) => {
                warn!("Could not list teams for {}: {}", user_id, err);
                HashMap::new()
            }
        }
    }

    /// Team conversations joined with their team name.
    ///
    /// Conversations outside any team are left out. Unnamed ones with exactly
    /// one other member take that member's display name.
    pub async fn list_conversations(&self, user_id: &str) -> ApiResult<Vec<Conversation>> {
        let list: ConversationList = self.gateway.get_json(user_id, "conversations").await?;
        let team_names = self.team_names(user_id).await;

        let mut conversations = Vec::with_capacity(list.conversations.len());
        for mut conversation in list.conversations {
            if conversation.team.is_none() {
                continue;
            }
            label_team(&mut conversation, &team_names);

            if conversation.name.is_none() && conversation.members.others.len() == 1 {
                if let Some(qid) = conversation.members.others[0].qualified_id.clone() {
                    match self.fetch_user(user_id, &qid.domain, &qid.id).await {
                        Ok(user) => conversation.name = user.name,
                        Err(err) => debug!("No name for 1:1 counterpart {}: {}", qid.id, err),
                    }
                }
            }

            conversations.push(conversation);
        }
        Ok(conversations)
    }

    /// Posts mentioning `@handle`, newest first.
    ///
    /// With `since`, only posts created strictly after it are kept.
    pub async fn search_mentions(
        &self,
        user_id: &str,
        handle: &str,
        since: Option<i64>,
    ) -> ApiResult<Vec<EnrichedPost>> {
        let request = ApiRequest::post("posts/search")
            .param("include_deleted_channels", true)
            .param("is_or_search", true)
            .param("page", 0)
            .param("per_page", self.search.per_page)
            .param("terms", format!("@{} ", handle))
            .param("time_zone_offset", self.search.time_zone_offset);
        let results: SearchResults = self.gateway.call_json(user_id, request).await?;

        let posts: Vec<_> = results
            .posts
            .into_iter()
            .filter(|post| since.map_or(true, |since| post.create_at > since))
            .collect();
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        // Raw listing: no 1:1 name lookups here, authors are fetched below.
        let mut conversations = match self
            .gateway
            .get_json::<ConversationList>(user_id, "conversations")
            .await
        {
            Ok(list) => list.conversations,
            Err(err) => {
                warn!("Could not list conversations for {}: {}", user_id, err);
                Vec::new()
            }
        };
        if conversations.iter().any(|c| c.team.is_some()) {
            let team_names = self.team_names(user_id).await;
            for conversation in &mut conversations {
                label_team(conversation, &team_names);
            }
        }
        let by_id: HashMap<&str, &Conversation> =
            conversations.iter().map(|c| (c.id.as_str(), c)).collect();

        // One lookup per distinct author.
        let mut authors: HashMap<String, Option<RemoteUser>> = HashMap::new();
        for post in &posts {
            if authors.contains_key(&post.user_id) {
                continue;
            }
            let domain = by_id
                .get(post.channel_id.as_str())
                .and_then(|c| c.member_domain(&post.user_id));
            let author = match domain {
                Some(domain) => self.fetch_user(user_id, domain, &post.user_id).await.ok(),
                None => None,
            };
            authors.insert(post.user_id.clone(), author);
        }

        let mut enriched: Vec<EnrichedPost> = posts
            .into_iter()
            .map(|post| {
                let conversation = by_id.get(post.channel_id.as_str());
                let channel_name = conversation
                    .and_then(|c| c.name.clone())
                    .unwrap_or_default();
                let team_id = conversation.and_then(|c| c.team.clone()).unwrap_or_default();
                let team_name = conversation
                    .and_then(|c| c.team_name.clone())
                    .unwrap_or_default();
                let author = authors.get(&post.user_id).and_then(|a| a.as_ref());
                EnrichedPost {
                    channel_display_name: channel_name.clone(),
                    channel_name,
                    team_id,
                    team_display_name: team_name.clone(),
                    team_name,
                    user_name: author.and_then(|a| a.handle.clone()).unwrap_or_default(),
                    user_display_name: author.and_then(|a| a.name.clone()).unwrap_or_default(),
                    post,
                }
            })
            .collect();

        enriched.sort_by(|a, b| b.post.create_at.cmp(&a.post.create_at));
        Ok(enriched)
    }

    pub async fn send_message(
        &self,
        user_id: &str,
        message: &str,
        conversation_id: &str,
    ) -> ApiResult<Value> {
        let request = ApiRequest::post("posts")
            .param("channel_id", conversation_id)
            .param("message", message);
        self.gateway.call(user_id, request).await?.into_json()
    }

    /// Upload one host file and post it into the conversation.
    pub async fn send_file(
        &self,
        user_id: &str,
        file_id: i64,
        conversation_id: &str,
    ) -> ApiResult<Value> {
        let node = self
            .files
            .node_by_id(user_id, file_id)
            .await?
            .filter(|node| node.is_file())
            .ok_or(ApiError::FileNotFound(file_id))?;
        let contents = self.files.read_file(user_id, &node).await?;

        let endpoint = format!(
            "files?channel_id={}&filename={}",
            urlencode(conversation_id),
            urlencode(&node.name)
        );
        let uploaded = self.gateway.upload(user_id, &endpoint, contents).await?;
        let uploaded: UploadResponse = serde_json::from_value(uploaded).unwrap_or_default();
        let remote_file_id = uploaded
            .file_infos
            .first()
            .and_then(|info| info.id.clone())
            .ok_or(ApiError::FileUploadError)?;

        let request = ApiRequest::post("posts")
            .param("channel_id", conversation_id)
            .param("message", "")
            .param("file_ids", json!([remote_file_id]));
        self.gateway.call(user_id, request).await?.into_json()
    }

    /// Comment first, then each file in order. Folders are skipped.
    pub async fn send_files(
        &self,
        user_id: &str,
        request: &SendFilesRequest,
    ) -> ApiResult<Vec<FileSendOutcome>> {
        if !request.comment.trim().is_empty() {
            self.send_message(user_id, &request.comment, &request.conversation_id)
                .await?;
        }

        let mut outcomes = Vec::with_capacity(request.file_ids.len());
        for &file_id in &request.file_ids {
            let node = self.files.node_by_id(user_id, file_id).await?;
            if let Some(folder) = node.filter(|n| !n.is_file()) {
                outcomes.push(FileSendOutcome::Skipped {
                    file_id,
                    reason: format!("{} is a folder", folder.name),
                });
                continue;
            }

            let outcome = match self
                .send_file(user_id, file_id, &request.conversation_id)
                .await
            {
                Ok(post) => FileSendOutcome::Sent { file_id, post },
                Err(err) => {
                    warn!("Sending file {} failed: {}", file_id, err);
                    FileSendOutcome::Failed {
                        file_id,
                        error: err.user_message(),
                    }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Create a link-share per resolvable id and post them as one message.
    pub async fn send_links(&self, user_id: &str, request: &SendLinksRequest) -> ApiResult<LinksSent> {
        let mut links = Vec::new();
        for &file_id in &request.file_ids {
            let Some(node) = self.files.node_by_id(user_id, file_id).await? else {
                debug!("File {} not found for {}", file_id, user_id);
                continue;
            };

            let name = node.name.clone();
            let mut share = self
                .shares
                .create_share(NewShare {
                    node,
                    permission: request.permission,
                    shared_by: user_id.to_string(),
                    label: format!("Wire ({})", request.conversation_name),
                    expiration: request.expiration,
                    password: request.password.clone(),
                })
                .await?;
            if request.expiration.is_none() {
                share.expiration = None;
                share = self.shares.update_share(&share).await?;
            }

            links.push(SharedLink {
                name,
                url: self.shares.share_url(&share.token),
                share,
            });
        }

        if links.is_empty() {
            return Err(ApiError::FilesNotFound);
        }

        let post = self
            .send_message(
                user_id,
                &links_message(&request.comment, &links),
                &request.conversation_id,
            )
            .await?;
        Ok(LinksSent { post, links })
    }

    pub async fn fetch_user_avatar(
        &self,
        user_id: &str,
        domain: &str,
        remote_user_id: &str,
    ) -> ApiResult<Avatar<RemoteUser>> {
        let user = self.fetch_user(user_id, domain, remote_user_id).await?;
        let Some(asset) = user.complete_image() else {
            return Ok(Avatar::Fallback(user));
        };

        match self
            .gateway
            .fetch_raw(user_id, &format!("assets/{}/{}", domain, asset.key))
            .await
        {
            Ok(raw) => Ok(Avatar::Image(raw.body)),
            Err(err) => {
                debug!("Avatar asset for {} unavailable: {}", remote_user_id, err);
                Ok(Avatar::Fallback(user))
            }
        }
    }

    pub async fn fetch_team_avatar(
        &self,
        user_id: &str,
        domain: &str,
        team_id: &str,
    ) -> ApiResult<Avatar<Team>> {
        let team: Team = self
            .gateway
            .get_json(user_id, &format!("teams/{}", team_id))
            .await?;
        let Some(icon) = team.icon_asset() else {
            return Ok(Avatar::Fallback(team));
        };

        match self
            .gateway
            .fetch_raw(user_id, &format!("assets/{}/{}", domain, icon))
            .await
        {
            Ok(raw) => Ok(Avatar::Image(raw.body)),
            Err(err) => {
                debug!("Team icon for {} unavailable: {}", team_id, err);
                Ok(Avatar::Fallback(team))
            }
        }
    }
}

fn label_team(conversation: &mut Conversation, team_names: &HashMap<String, Option<String>>) {
    if let Some(team_id) = &conversation.team {
        conversation.team_name = Some(
            team_names
                .get(team_id)
                .cloned()
                .flatten()
                .unwrap_or_else(|| "??".to_string()),
        );
    }
}

fn links_message(comment: &str, links: &[SharedLink]) -> String {
    let mut message = format!("{}\n", comment);
    for link in links {
        message.push_str(&format!("```{}```: {}\n", link.name, link.url));
    }
    message
}
