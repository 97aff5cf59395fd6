pub mod avatar;
pub mod config;
pub mod conversations;
pub mod files;
pub mod login;
pub mod send;
pub mod status;

use anyhow::{bail, Result};
use wire_bridge_core::{Bridge, Conversation};

use crate::ui;

/// Display label for a conversation in listings and pickers.
pub fn conversation_label(conversation: &Conversation) -> String {
    let name = conversation.name.as_deref().unwrap_or("(unnamed)");
    match &conversation.team_name {
        Some(team) => format!("{} · {}", name, team),
        None => name.to_string(),
    }
}

/// Resolve `--to`, or let the user pick. Returns `(id, name)`.
pub async fn pick_conversation(
    bridge: &Bridge,
    user: &str,
    to: Option<String>,
) -> Result<(String, String)> {
    let spinner = ui::spinner("Loading conversations...");
    let listed = bridge.conversations.list_conversations(user).await;
    spinner.finish_and_clear();

    if let Some(id) = to {
        // The name only labels shares; an unknown id is still sent as given.
        let name = listed
            .ok()
            .and_then(|all| all.into_iter().find(|c| c.id == id))
            .and_then(|c| c.name)
            .unwrap_or_else(|| id.clone());
        return Ok((id, name));
    }

    let conversations = listed?;
    if conversations.is_empty() {
        bail!("No conversations found. Pass one with --to.");
    }
    let labels: Vec<String> = conversations.iter().map(conversation_label).collect();
    let index = ui::prompt_select("Send to", &labels)?;
    let chosen = &conversations[index];
    Ok((
        chosen.id.clone(),
        chosen.name.clone().unwrap_or_else(|| chosen.id.clone()),
    ))
}
