use anyhow::Context;
use wheelhouse_core::{ServerConfig, validate_server_config};

pub async fn run(mut config: ServerConfig, bind: Option<String>) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }
    validate_server_config(&config).context("invalid server configuration")?;
    if config.google.client_id.is_none() {
        tracing::warn!("google.client_id not set, Google sign-in will answer 500");
    }
    if config.apple.client_id.is_none() {
        tracing::warn!("apple.client_id not set, Apple sign-in will answer 500");
    }
    wheelhouse_server::serve(config).await?;
    Ok(())
}
