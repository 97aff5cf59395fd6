use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use console::style;
use wire_bridge_core::{Bridge, UserCredential};

use super::conversation_label;
use crate::ui;

pub async fn list(bridge: &Bridge, user: &str, json: bool) -> Result<()> {
    let conversations = bridge.conversations.list_conversations(user).await?;
    if json {
        return ui::print_json(&conversations);
    }

    ui::header(&format!("{} conversations", conversations.len()));
    for conversation in &conversations {
        println!(
            "  {}  {}",
            style(&conversation.id).dim(),
            conversation_label(conversation)
        );
    }
    println!();
    Ok(())
}

pub async fn teams(bridge: &Bridge, user: &str, json: bool) -> Result<()> {
    let teams = bridge.conversations.list_teams(user).await?;
    if json {
        return ui::print_json(&teams);
    }

    for team in &teams {
        println!(
            "  {}  {}",
            style(&team.id).dim(),
            team.name.as_deref().unwrap_or("??")
        );
    }
    Ok(())
}

pub async fn mentions(
    bridge: &Bridge,
    user: &str,
    since: Option<i64>,
    handle: Option<String>,
    json: bool,
) -> Result<()> {
    let handle = match handle {
        Some(handle) => handle,
        None => UserCredential::load(bridge.gateway.store().as_ref(), user)
            .await?
            .remote_user_handle
            .ok_or_else(|| anyhow!("No Wire handle known. Log in first or pass --handle."))?,
    };

    let spinner = ui::spinner(&format!("Searching mentions of @{}...", handle));
    let posts = bridge
        .conversations
        .search_mentions(user, &handle, since)
        .await;
    spinner.finish_and_clear();
    let posts = posts?;

    if json {
        return ui::print_json(&posts);
    }
    if posts.is_empty() {
        ui::info("No mentions.");
        return Ok(());
    }

    for post in &posts {
        let when = Utc
            .timestamp_millis_opt(post.post.create_at)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let author = if post.user_display_name.is_empty() {
            post.post.user_id.clone()
        } else {
            post.user_display_name.clone()
        };
        println!(
            "{} {} in {}",
            style(when).dim(),
            style(author).bold(),
            if post.channel_name.is_empty() { "?" } else { &post.channel_name }
        );
        ui::info(&post.post.message);
    }
    Ok(())
}
