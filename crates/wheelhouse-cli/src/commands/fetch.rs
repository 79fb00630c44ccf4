use std::path::Path;

use anyhow::bail;
use wheelhouse_client::Phase;
use wheelhouse_core::ClientConfig;

use crate::commands::session_manager;
use crate::pout;

pub async fn run(json: bool, config: &ClientConfig, cfg_dir: &Path, path: &str) -> anyhow::Result<()> {
    let manager = session_manager(config, cfg_dir)?;
    match manager.restore().await? {
        Phase::Authenticated => {}
        Phase::Guest => bail!("guest sessions cannot call protected endpoints"),
        _ => bail!("not signed in, run `wheelhouse auth login` first"),
    }

    let url = manager.endpoint(path)?;
    let request = manager.http_client().get(url.clone()).build()?;
    let response = manager.fetch_with_auth(request).await?;
    let status = response.status();
    let text = response.text().await?;
    let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text.clone()));

    pout(
        json,
        serde_json::json!({"url": url.as_str(), "status": status.as_u16(), "body": body}),
        &format!("{status} {url}\n{text}"),
    )
}
