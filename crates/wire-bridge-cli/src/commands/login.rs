use anyhow::Result;
use console::style;
use wire_bridge_core::Bridge;

use crate::ui;

pub async fn login(
    bridge: &Bridge,
    user: &str,
    url: Option<String>,
    email: Option<String>,
) -> Result<()> {
    let url = match url {
        Some(url) => url,
        None => {
            let current = bridge.account.remote_url(user).await?;
            ui::prompt_input_default("Wire API URL", &current)?
        }
    };
    let email = match email {
        Some(email) => email,
        None => ui::prompt_input("Email")?,
    };
    let password = ui::prompt_password("Password")?;

    let spinner = ui::spinner("Logging in...");
    let result = bridge
        .account
        .login_with_credentials(user, url.trim_end_matches('/'), &email, &password)
        .await;
    spinner.finish_and_clear();

    match result {
        Ok(identity) if !identity.user_name.is_empty() => {
            ui::success(&format!(
                "Connected as {} {}",
                identity.user_displayname,
                style(format!("@{}", identity.user_name)).dim()
            ));
        }
        Ok(identity) => {
            ui::success(&format!("Connected ({})", identity.user_id));
            ui::warn("Could not load your profile. Try `wirebridge whoami`.");
        }
        Err(err) => {
            ui::error(&format!("Login failed: {}", err.user_message()));
            return Err(err.into());
        }
    }
    Ok(())
}

pub async fn logout(bridge: &Bridge, user: &str, yes: bool) -> Result<()> {
    let status = bridge.account.connection_status(user).await?;
    if !status.connected {
        ui::info("Not connected.");
        return Ok(());
    }
    if !yes && !ui::prompt_confirm(&format!("Disconnect from {}?", status.url))? {
        ui::info("Cancelled.");
        return Ok(());
    }

    let spinner = ui::spinner("Revoking session...");
    let revoked = bridge.conversations.logout(user).await?;
    spinner.finish_and_clear();

    ui::success("Disconnected.");
    if !revoked {
        ui::info("The server did not confirm the revoke; local credentials were removed anyway.");
    }
    Ok(())
}
