use anyhow::{bail, Result};
use chrono::NaiveDate;
use console::style;
use wire_bridge_core::{Bridge, FileSendOutcome, SendFilesRequest, SendLinksRequest, SharePermission};

use super::pick_conversation;
use crate::ui;

pub struct ShareOptions {
    pub comment: String,
    pub edit: bool,
    pub expires: Option<NaiveDate>,
    pub password: bool,
}

pub async fn message(bridge: &Bridge, user: &str, message: &str, to: Option<String>) -> Result<()> {
    if message.trim().is_empty() {
        bail!("Refusing to send an empty message.");
    }
    let (id, name) = pick_conversation(bridge, user, to).await?;

    let spinner = ui::spinner(&format!("Sending to {}...", name));
    let sent = bridge.conversations.send_message(user, message, &id).await;
    spinner.finish_and_clear();
    sent?;

    ui::success(&format!("Message sent to {}", name));
    Ok(())
}

pub async fn files(
    bridge: &Bridge,
    user: &str,
    file_ids: Vec<i64>,
    to: Option<String>,
    comment: String,
) -> Result<()> {
    let (id, name) = pick_conversation(bridge, user, to).await?;
    let request = SendFilesRequest {
        file_ids,
        conversation_id: id,
        comment,
    };

    let spinner = ui::spinner(&format!("Uploading {} file(s) to {}...", request.file_ids.len(), name));
    let outcomes = bridge.conversations.send_files(user, &request).await;
    spinner.finish_and_clear();
    let outcomes = outcomes?;

    let mut failed = 0;
    for outcome in &outcomes {
        match outcome {
            FileSendOutcome::Sent { file_id, .. } => ui::success(&format!("File {} sent", file_id)),
            FileSendOutcome::Skipped { file_id, reason } => {
                ui::warn(&format!("File {} skipped: {}", file_id, reason))
            }
            FileSendOutcome::Failed { file_id, error } => {
                failed += 1;
                ui::error(&format!("File {} failed: {}", file_id, error));
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} file(s) could not be sent", failed, outcomes.len());
    }
    Ok(())
}

pub async fn links(
    bridge: &Bridge,
    user: &str,
    file_ids: Vec<i64>,
    to: Option<String>,
    options: ShareOptions,
) -> Result<()> {
    let password = if options.password {
        Some(ui::prompt_password("Link password")?).filter(|p| !p.is_empty())
    } else {
        None
    };
    let (id, name) = pick_conversation(bridge, user, to).await?;

    let request = SendLinksRequest {
        file_ids,
        conversation_id: id,
        conversation_name: name.clone(),
        comment: options.comment,
        permission: if options.edit {
            SharePermission::Edit
        } else {
            SharePermission::Read
        },
        expiration: options.expires,
        password,
    };

    let spinner = ui::spinner("Creating share links...");
    let sent = bridge.conversations.send_links(user, &request).await;
    spinner.finish_and_clear();
    let sent = sent?;

    ui::success(&format!("{} link(s) posted to {}", sent.links.len(), name));
    for link in &sent.links {
        let expires = link
            .share
            .expiration
            .map(|d| format!(" (expires {})", d))
            .unwrap_or_default();
        println!("    {}  {}{}", link.name, style(&link.url).cyan(), style(expires).dim());
    }
    Ok(())
}
