use std::path::Path;

use anyhow::{Context, Result};
use wire_bridge_core::{Avatar, Bridge};

use crate::ui;

fn write_image(output: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(output, bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    ui::success(&format!("Saved {} bytes to {}", bytes.len(), output.display()));
    Ok(())
}

pub async fn user(bridge: &Bridge, user: &str, domain: &str, id: &str, output: &Path) -> Result<()> {
    match bridge.conversations.fetch_user_avatar(user, domain, id).await? {
        Avatar::Image(bytes) => write_image(output, &bytes),
        Avatar::Fallback(remote) => {
            ui::info(&format!(
                "No picture set. Placeholder: {}",
                remote.placeholder_name()
            ));
            Ok(())
        }
    }
}

pub async fn team(bridge: &Bridge, user: &str, domain: &str, id: &str, output: &Path) -> Result<()> {
    match bridge.conversations.fetch_team_avatar(user, domain, id).await? {
        Avatar::Image(bytes) => write_image(output, &bytes),
        Avatar::Fallback(team) => {
            ui::info(&format!("No team icon. Placeholder: {}", team.placeholder_name()));
            Ok(())
        }
    }
}
