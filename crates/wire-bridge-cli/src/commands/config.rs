use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use wire_bridge_core::{Bridge, ConfigOutcome};

use crate::ui;

fn parse_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .ok_or_else(|| anyhow!("Expected KEY=VALUE, got '{}'", pair))
        })
        .collect()
}

pub async fn set(bridge: &Bridge, user: &str, pairs: &[String], admin: bool) -> Result<()> {
    let values = parse_pairs(pairs)?;

    if admin {
        bridge.account.set_admin_config(&values).await?;
        ui::success("Installation settings saved.");
        return Ok(());
    }

    match bridge.account.set_config(user, &values).await? {
        ConfigOutcome::LoggedIn(identity) => {
            ui::success(&format!("Connected as @{}", identity.user_name));
        }
        ConfigOutcome::Updated {
            cleared_identity: true,
        } => ui::success("Token cleared. You are now disconnected."),
        ConfigOutcome::Updated { .. } => ui::success("Settings saved."),
    }
    Ok(())
}
