pub mod auth;
pub mod fetch;
pub mod serve;

use std::path::Path;
use std::sync::Arc;

use wheelhouse_client::{FileStore, SessionManager};
use wheelhouse_core::{ClientConfig, validate_client_config};

/// Local, non-secret client state (the guest marker) lives next to the config.
pub const LOCAL_STATE_FILE: &str = "local.json";

pub fn session_manager(config: &ClientConfig, cfg_dir: &Path) -> anyhow::Result<SessionManager> {
    validate_client_config(config)?;
    let local = Arc::new(FileStore::new(cfg_dir.join(LOCAL_STATE_FILE)));
    Ok(SessionManager::from_config(config, local)?)
}
