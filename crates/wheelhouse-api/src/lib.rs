use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod claims;
mod wire;

pub use claims::{
    APPLE_PLACEHOLDER_EMAIL, APPLE_PLACEHOLDER_NAME, AppleClaims, DEFAULT_AVATAR_URL, GUEST_NAME,
    GoogleClaims, GuestClaims, IdentityClaims, SessionClaims, UserProfile,
};
pub use wire::{AppleNativeRequest, ErrorBody, NativeTokens, RefreshRequest, SessionInfo, WebReceipt};

pub type UserId = String;

/// Client surface a session is delivered to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    #[default]
    #[serde(alias = "mobile")]
    Native,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Web => "web",
            Platform::Native => "native",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = WheelhouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Platform::Web),
            "native" | "mobile" => Ok(Platform::Native),
            other => Err(WheelhouseError::Validation(format!(
                "unknown platform {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Apple,
    Guest,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Apple => "apple",
            Provider::Guest => "guest",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, thiserror::Error)]
pub enum WheelhouseError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("authentication error: {0}")]
    Auth(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Tokens returned by an identity provider's token endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderTokens {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("provider is not configured: {0}")]
    NotConfigured(String),
    #[error("provider rejected the code exchange with status {status}")]
    Rejected {
        status: u16,
        code: Option<String>,
        body: Value,
    },
    #[error("provider request failed: {0}")]
    Transport(String),
}

/// Authorization-code grant against one identity provider.
#[async_trait]
pub trait CodeExchange: Send + Sync {
    fn provider(&self) -> Provider;

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<ProviderTokens, ExchangeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub provider_id: String,
    pub provider: Provider,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub id: UserId,
    #[serde(default)]
    pub is_new_user: bool,
}

/// Maps a provider identity onto the application's own user id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn resolve(&self, entry: &DirectoryEntry) -> Result<DirectoryUser, WheelhouseError>;
}
