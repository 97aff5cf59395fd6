use anyhow::Result;
use console::style;
use serde::Serialize;
use wire_bridge_core::{Bridge, ConnectionStatus, SettingsSummary};

use crate::ui;

#[derive(Serialize)]
struct Status {
    connection: ConnectionStatus,
    settings: SettingsSummary,
    data_dir: String,
}

pub async fn run(bridge: &Bridge, user: &str, json: bool) -> Result<()> {
    let connection = bridge.account.connection_status(user).await?;
    let settings = bridge.account.settings_summary(user).await?;

    if json {
        return ui::print_json(&Status {
            connection,
            settings,
            data_dir: bridge.paths.base_dir.display().to_string(),
        });
    }

    ui::header(&format!("wirebridge · {}", user));
    let state = if connection.connected {
        style("connected").green().to_string()
    } else {
        style("not connected").red().to_string()
    };
    ui::field("Status", &state);
    ui::field("Server", &connection.url);
    if !settings.user_name.is_empty() {
        ui::field(
            "Wire user",
            &format!("{} (@{})", settings.user_displayname, settings.user_name),
        );
    }
    ui::field(
        "Token",
        if settings.token.is_empty() { "none" } else { "stored" },
    );
    ui::field(
        "Navigation",
        if settings.navigation_enabled { "enabled" } else { "disabled" },
    );
    ui::field("Data", &bridge.paths.base_dir.display().to_string());
    println!();

    if !connection.connected {
        ui::info("Connect with:");
        println!("    wirebridge login");
        println!();
    }
    Ok(())
}

pub async fn whoami(bridge: &Bridge, user: &str, json: bool) -> Result<()> {
    let me = bridge.conversations.fetch_self(user).await?;
    if json {
        return ui::print_json(&me);
    }

    ui::field("Name", me.name.as_deref().unwrap_or(""));
    ui::field("Handle", &format!("@{}", me.handle.as_deref().unwrap_or("")));
    ui::field("Id", &me.id);
    if let Some(domain) = me.domain() {
        ui::field("Domain", domain);
    }
    Ok(())
}
