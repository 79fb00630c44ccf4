use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{anyhow, bail};
use clap::Subcommand;
use wheelhouse_api::{AppleNativeRequest, Provider, UserProfile};
use wheelhouse_client::{Phase, SessionError, SessionManager};
use wheelhouse_core::ClientConfig;

use crate::commands::session_manager;
use crate::pout;

#[derive(Debug, Subcommand)]
pub enum AuthCommands {
    /// Sign in through the browser
    Login {
        /// google or apple
        #[arg(long, default_value = "google", value_parser = parse_provider)]
        provider: Provider,
        /// The URL the server redirected to; prompted for when omitted
        #[arg(long)]
        redirect: Option<String>,
    },
    /// Native Sign in with Apple using a credential from the device
    Apple {
        #[arg(long)]
        identity_token: String,
        #[arg(long)]
        raw_nonce: String,
        #[arg(long)]
        given_name: Option<String>,
        #[arg(long)]
        family_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Continue as a local guest (no server session)
    Guest,
    /// Show the restored session
    Status,
    /// Force a token refresh
    Refresh,
    /// Sign out and clear stored credentials
    Logout,
}

fn parse_provider(value: &str) -> Result<Provider, String> {
    match value {
        "google" => Ok(Provider::Google),
        "apple" => Ok(Provider::Apple),
        other => Err(format!("unknown provider {other}, expected google or apple")),
    }
}

pub async fn run(
    json: bool,
    config: &ClientConfig,
    cfg_dir: &Path,
    command: AuthCommands,
) -> anyhow::Result<()> {
    let manager = session_manager(config, cfg_dir)?;

    match command {
        AuthCommands::Login { provider, redirect } => {
            let pending = manager.begin_login(provider)?;
            let redirect = match redirect {
                Some(redirect) => redirect,
                None => prompt_redirect(pending.authorize_url.as_str())?,
            };
            match manager.complete_login(&pending, &redirect).await {
                Ok(user) => signed_in(json, &manager, &user),
                Err(SessionError::Cancelled) => {
                    pout(json, serde_json::json!({"cancelled": true}), "Sign-in cancelled")
                }
                Err(err) => Err(err.into()),
            }
        }
        AuthCommands::Apple {
            identity_token,
            raw_nonce,
            given_name,
            family_name,
            email,
        } => {
            let credential = AppleNativeRequest {
                identity_token,
                raw_nonce,
                given_name,
                family_name,
                email,
            };
            let user = manager.sign_in_with_apple(&credential).await?;
            signed_in(json, &manager, &user)
        }
        AuthCommands::Guest => {
            let user = manager.sign_in_as_guest().await?;
            signed_in(json, &manager, &user)
        }
        AuthCommands::Status => {
            let phase = manager.restore().await?;
            status(json, &manager, phase)
        }
        AuthCommands::Refresh => {
            match manager.restore().await? {
                Phase::Authenticated => {}
                Phase::Guest => bail!("guest sessions have nothing to refresh"),
                _ => bail!("not signed in"),
            }
            manager.refresh().await?;
            status(json, &manager, manager.phase())
        }
        AuthCommands::Logout => {
            manager.restore().await?;
            manager.sign_out().await;
            pout(json, serde_json::json!({"success": true}), "Signed out")
        }
    }
}

fn prompt_redirect(authorize_url: &str) -> anyhow::Result<String> {
    eprintln!("Open this URL to sign in:\n\n  {authorize_url}\n");
    eprint!("Paste the URL you were redirected to: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let line = line.trim();
    if line.is_empty() {
        return Err(anyhow!("no redirect URL given"));
    }
    Ok(line.to_string())
}

fn signed_in(json: bool, manager: &SessionManager, user: &UserProfile) -> anyhow::Result<()> {
    pout(
        json,
        serde_json::json!({"phase": manager.phase(), "user": user}),
        &format!("Signed in as {} ({})", user.name, user.provider),
    )
}

fn status(json: bool, manager: &SessionManager, phase: Phase) -> anyhow::Result<()> {
    let user = manager.user();
    let text = match (&phase, &user) {
        (Phase::Authenticated | Phase::Guest, Some(user)) => {
            format!("{phase:?}: {} ({}, {})", user.name, user.provider, user.id)
        }
        _ => format!("{phase:?}"),
    };
    pout(
        json,
        serde_json::json!({
            "phase": phase,
            "platform": manager.platform(),
            "user": user,
        }),
        &text,
    )
}
