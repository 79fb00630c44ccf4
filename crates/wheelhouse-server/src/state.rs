use std::sync::Arc;

use wheelhouse_api::{CodeExchange, UserDirectory, WheelhouseError};
use wheelhouse_auth::{AppleIdentityVerifier, JwksSource, TokenCodec, TokenTtl};
use wheelhouse_connectors::{HttpCodeExchange, directory_from_config};
use wheelhouse_core::{ServerConfig, validate_server_config};

use crate::rotation::RefreshLedger;

/// Shared handler state. Cloning is cheap; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub codec: Arc<TokenCodec>,
    pub google: Arc<dyn CodeExchange>,
    pub apple: Arc<dyn CodeExchange>,
    /// `None` when neither an Apple bundle id nor a services id is configured.
    pub apple_identity: Option<Arc<AppleIdentityVerifier>>,
    pub directory: Arc<dyn UserDirectory>,
    pub ledger: RefreshLedger,
}

impl AppState {
    /// State wired to the real providers described by `config`.
    pub fn from_config(config: ServerConfig) -> Result<Self, WheelhouseError> {
        let google = Arc::new(HttpCodeExchange::google(&config));
        let apple = Arc::new(HttpCodeExchange::apple(&config)?);
        let directory = directory_from_config(&config);
        Ok(Self::new(config, google, apple)?.with_directory(directory))
    }

    /// State with explicit code-exchange collaborators.
    pub fn new(
        config: ServerConfig,
        google: Arc<dyn CodeExchange>,
        apple: Arc<dyn CodeExchange>,
    ) -> Result<Self, WheelhouseError> {
        validate_server_config(&config)?;
        let codec = TokenCodec::new(
            config.tokens.secret.as_bytes(),
            TokenTtl {
                access_seconds: config.tokens.access_ttl_seconds,
                refresh_seconds: config.tokens.refresh_ttl_seconds,
            },
        );
        let apple_identity = config
            .apple
            .bundle_id
            .clone()
            .or_else(|| config.apple.client_id.clone())
            .map(|audience| {
                Arc::new(
                    AppleIdentityVerifier::new(audience)
                        .with_source(JwksSource::Url(config.apple.jwks_url.clone()))
                        .with_max_jwks_age(config.apple.jwks_max_age_seconds),
                )
            });
        Ok(Self {
            config: Arc::new(config),
            codec: Arc::new(codec),
            google,
            apple,
            apple_identity,
            directory: Arc::new(wheelhouse_connectors::PassthroughDirectory),
            ledger: RefreshLedger::default(),
        })
    }

    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = directory;
        self
    }

    #[must_use]
    pub fn with_apple_verifier(mut self, verifier: AppleIdentityVerifier) -> Self {
        self.apple_identity = Some(Arc::new(verifier));
        self
    }
}
