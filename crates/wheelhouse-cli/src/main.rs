mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wheelhouse_core::{default_config_dir, load_config, write_default_config_file};

use crate::commands::{auth, fetch, serve};

#[derive(Debug, Parser)]
#[command(name = "wheelhouse", about = "Google and Apple sign-in server and session client")]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    /// Path to a wheelhouse.toml (defaults to <config-dir>/wheelhouse.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a starter wheelhouse.toml into the config dir
    Init,
    /// Run the authorization server
    Serve {
        /// Override `server.bind_addr`
        #[arg(long)]
        bind: Option<String>,
    },
    /// Client session: sign in, inspect, refresh, sign out
    Auth {
        #[command(subcommand)]
        command: auth::AuthCommands,
    },
    /// GET a protected endpoint with the current session
    Fetch {
        /// Path on the server, e.g. /api/protected/data
        #[arg(default_value = "/api/protected/data")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wheelhouse=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg_dir = cli.config_dir.clone().unwrap_or_else(default_config_dir);

    if let Commands::Init = cli.command {
        let path = write_default_config_file(&cfg_dir)?;
        return pout(
            cli.json,
            serde_json::json!({"message": "init complete", "config": path}),
            &format!("Wrote {}", path.display()),
        );
    }

    let config = load_config(cli.config.as_deref(), &cfg_dir, |key| std::env::var(key).ok())?;

    match cli.command {
        Commands::Init => Ok(()),
        Commands::Serve { bind } => serve::run(config.server, bind).await,
        Commands::Auth { command } => auth::run(cli.json, &config.client, &cfg_dir, command).await,
        Commands::Fetch { path } => fetch::run(cli.json, &config.client, &cfg_dir, &path).await,
    }
}

pub fn pout(json_mode: bool, value: serde_json::Value, text: &str) -> anyhow::Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}
