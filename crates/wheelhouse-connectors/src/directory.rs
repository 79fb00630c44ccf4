use std::sync::Arc;

use async_trait::async_trait;
use wheelhouse_api::{DirectoryEntry, DirectoryUser, UserDirectory, WheelhouseError};
use wheelhouse_core::ServerConfig;

/// Uses the provider subject as the application user id.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDirectory;

#[async_trait]
impl UserDirectory for PassthroughDirectory {
    async fn resolve(&self, entry: &DirectoryEntry) -> Result<DirectoryUser, WheelhouseError> {
        Ok(DirectoryUser {
            id: entry.provider_id.clone(),
            is_new_user: false,
        })
    }
}

/// Finds or creates the user in the application backend (`POST /v1/auth/oauth`).
#[derive(Debug, Clone)]
pub struct HttpUserDirectory {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpUserDirectory {
    pub fn new(backend_url: &str) -> Self {
        Self {
            endpoint: format!("{}/v1/auth/oauth", backend_url.trim_end_matches('/')),
            http: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn resolve(&self, entry: &DirectoryEntry) -> Result<DirectoryUser, WheelhouseError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(entry)
            .send()
            .await
            .map_err(|e| WheelhouseError::Connection(format!("user sync failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WheelhouseError::Connection(format!(
                "user sync returned {status}: {body}"
            )));
        }

        let user: DirectoryUser = response
            .json()
            .await
            .map_err(|e| WheelhouseError::Validation(format!("unexpected user sync body: {e}")))?;
        if user.id.is_empty() {
            return Err(WheelhouseError::Validation(
                "user sync returned an empty id".to_string(),
            ));
        }
        tracing::debug!(
            provider = %entry.provider,
            user_id = %user.id,
            new_user = user.is_new_user,
            "resolved user"
        );
        Ok(user)
    }
}

pub fn directory_from_config(cfg: &ServerConfig) -> Arc<dyn UserDirectory> {
    match cfg.backend_url.as_deref() {
        Some(url) => Arc::new(HttpUserDirectory::new(url)),
        None => Arc::new(PassthroughDirectory),
    }
}
