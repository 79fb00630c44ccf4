use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::Value;
use wheelhouse_api::{CodeExchange, ExchangeError, Provider, ProviderTokens, WheelhouseError};
use wheelhouse_core::ServerConfig;

use crate::apple_secret::{AppleSecretSigner, ClientSecret};

/// Authorization-code exchange against a provider token endpoint over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpCodeExchange {
    provider: Provider,
    client_id: Option<String>,
    secret: Option<ClientSecret>,
    redirect_uri: String,
    token_url: String,
    http: reqwest::Client,
}

impl HttpCodeExchange {
    pub fn new(
        provider: Provider,
        token_url: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            client_id: None,
            secret: None,
            redirect_uri: redirect_uri.into(),
            token_url: token_url.into(),
            http: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, client_id: Option<String>, secret: Option<ClientSecret>) -> Self {
        self.client_id = client_id;
        self.secret = secret;
        self
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn google(cfg: &ServerConfig) -> Self {
        Self::new(
            Provider::Google,
            cfg.google.token_url.clone(),
            cfg.google_redirect_uri(),
        )
        .with_credentials(
            cfg.google.client_id.clone(),
            cfg.google.client_secret.clone().map(ClientSecret::Static),
        )
    }

    /// Apple exchange. A static `client_secret` wins; otherwise one is signed from the
    /// team key when `team_id`, `key_id` and `private_key_path` are all set.
    pub fn apple(cfg: &ServerConfig) -> Result<Self, WheelhouseError> {
        let apple = &cfg.apple;
        let secret = match (&apple.client_secret, &apple.team_id, &apple.key_id, &apple.private_key_path) {
            (Some(secret), _, _, _) => Some(ClientSecret::Static(secret.clone())),
            (None, Some(team_id), Some(key_id), Some(path)) => {
                let pem = fs::read(path).map_err(|e| {
                    WheelhouseError::Configuration(format!(
                        "failed to read Apple private key {}: {e}",
                        path.display()
                    ))
                })?;
                let client_id = apple.client_id.clone().unwrap_or_default();
                Some(ClientSecret::AppleSigned(AppleSecretSigner::from_pem(
                    team_id.clone(),
                    key_id.clone(),
                    client_id,
                    &pem,
                )?))
            }
            _ => None,
        };
        Ok(Self::new(
            Provider::Apple,
            apple.token_url.clone(),
            cfg.apple_redirect_uri(),
        )
        .with_credentials(apple.client_id.clone(), secret))
    }

    pub fn is_configured(&self) -> bool {
        self.client_id.is_some() && self.secret.is_some()
    }
}

#[async_trait]
impl CodeExchange for HttpCodeExchange {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<ProviderTokens, ExchangeError> {
        let client_id = self.client_id.as_deref().ok_or_else(|| {
            ExchangeError::NotConfigured(format!("{} client id", self.provider))
        })?;
        let secret = self
            .secret
            .as_ref()
            .ok_or_else(|| ExchangeError::NotConfigured(format!("{} client secret", self.provider)))?
            .resolve(now_unix())
            .map_err(|e| ExchangeError::NotConfigured(e.to_string()))?;

        let mut params: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client_id),
            ("client_secret", secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }

        let response = self
            .http
            .post(&self.token_url)
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));
        let error_code = body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string);

        if !status.is_success() || error_code.is_some() {
            tracing::warn!(
                provider = %self.provider,
                status = status.as_u16(),
                error = ?error_code,
                "provider rejected code exchange"
            );
            // A 200 carrying an `error` field is still a rejection.
            let status = if status.is_success() { 400 } else { status.as_u16() };
            return Err(ExchangeError::Rejected {
                status,
                code: error_code,
                body,
            });
        }

        tracing::debug!(provider = %self.provider, "code exchange succeeded");
        serde_json::from_value(body)
            .map_err(|e| ExchangeError::Transport(format!("unexpected token response: {e}")))
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    async fn fake_token_endpoint() -> String {
        let app = Router::new().route(
            "/token",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                if form.get("grant_type").map(String::as_str) != Some("authorization_code") {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"error": "unsupported_grant_type"})),
                    );
                }
                match form.get("code").map(String::as_str) {
                    Some("good") => (
                        StatusCode::OK,
                        Json(json!({
                            "access_token": "provider-access",
                            "id_token": "a.b.c",
                            "expires_in": 3600,
                            "verifier": form.get("code_verifier"),
                        })),
                    ),
                    Some("teapot") => (StatusCode::IM_A_TEAPOT, Json(json!({"oops": true}))),
                    Some("soft-fail") => (StatusCode::OK, Json(json!({"error": "invalid_scope"}))),
                    _ => (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"error": "invalid_grant", "error_description": "bad code"})),
                    ),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/token")
    }

    fn exchange(url: String) -> HttpCodeExchange {
        HttpCodeExchange::new(Provider::Google, url, "https://auth.example.com/auth/callback")
            .with_credentials(
                Some("client".to_string()),
                Some(ClientSecret::Static("secret".to_string())),
            )
    }

    #[tokio::test]
    async fn successful_exchange_returns_tokens() {
        let url = fake_token_endpoint().await;
        let tokens = exchange(url).exchange_code("good", Some("verifier")).await.unwrap();
        assert_eq!(tokens.id_token.as_deref(), Some("a.b.c"));
        assert_eq!(tokens.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn provider_error_code_is_surfaced() {
        let url = fake_token_endpoint().await;
        let err = exchange(url).exchange_code("stale", None).await.unwrap_err();
        match err {
            ExchangeError::Rejected { status, code, body } => {
                assert_eq!(status, 400);
                assert_eq!(code.as_deref(), Some("invalid_grant"));
                assert_eq!(body["error_description"], "bad code");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unmapped_status_passes_through() {
        let url = fake_token_endpoint().await;
        let err = exchange(url).exchange_code("teapot", None).await.unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Rejected { status: 418, code: None, .. }
        ));
    }

    #[tokio::test]
    async fn error_in_success_body_is_rejection() {
        let url = fake_token_endpoint().await;
        let err = exchange(url).exchange_code("soft-fail", None).await.unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Rejected { status: 400, code: Some(ref c), .. } if c == "invalid_scope"
        ));
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_request() {
        let unconfigured = HttpCodeExchange::new(Provider::Apple, "http://127.0.0.1:9/token", "x");
        assert!(!unconfigured.is_configured());
        let err = unconfigured.exchange_code("good", None).await.unwrap_err();
        assert!(matches!(err, ExchangeError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn unreachable_provider_is_transport_error() {
        let err = exchange("http://127.0.0.1:9/token".to_string())
            .exchange_code("good", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Transport(_)));
    }

    #[test]
    fn apple_prefers_static_secret() {
        let mut cfg = ServerConfig::default();
        cfg.apple.client_id = Some("com.example.web".to_string());
        cfg.apple.client_secret = Some("static".to_string());
        let exchange = HttpCodeExchange::apple(&cfg).unwrap();
        assert!(exchange.is_configured());
        assert_eq!(exchange.redirect_uri, "http://localhost:8081/auth/apple/callback");
    }

    #[test]
    fn apple_with_missing_key_file_is_configuration_error() {
        let mut cfg = ServerConfig::default();
        cfg.apple.client_id = Some("com.example.web".to_string());
        cfg.apple.team_id = Some("TEAM".to_string());
        cfg.apple.key_id = Some("KEY".to_string());
        cfg.apple.private_key_path = Some("/nonexistent/AuthKey.p8".into());
        let err = HttpCodeExchange::apple(&cfg).unwrap_err();
        assert!(matches!(err, WheelhouseError::Configuration(_)));
    }
}
