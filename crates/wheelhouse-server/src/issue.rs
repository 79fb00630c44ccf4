//! Minting session tokens and handing them to the caller per platform.

use axum::Json;
use axum::http::HeaderName;
use axum::http::header::SET_COOKIE;
use axum::response::{AppendHeaders, IntoResponse, Response};
use wheelhouse_api::{DirectoryEntry, IdentityClaims, NativeTokens, Platform, WebReceipt};
use wheelhouse_auth::{CookieOptions, build_clear_cookie, build_set_cookie, new_token_id, now_unix};

use crate::error::ApiError;
use crate::state::AppState;

/// A freshly minted token pair. `refresh_token` is absent on the access-token fallback.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub issued_at: i64,
    pub expires_at: i64,
    pub warning: Option<String>,
}

impl AppState {
    pub fn access_cookie(&self) -> CookieOptions {
        let cookies = &self.config.cookies;
        CookieOptions::new(cookies.access_name.clone(), "/")
            .with_max_age(self.config.tokens.access_ttl_seconds)
            .with_domain(cookies.domain.clone())
            .with_secure(cookies.secure)
    }

    pub fn refresh_cookie(&self) -> CookieOptions {
        let cookies = &self.config.cookies;
        CookieOptions::new(cookies.refresh_name.clone(), cookies.refresh_path.clone())
            .with_max_age(self.config.tokens.refresh_ttl_seconds)
            .with_domain(cookies.domain.clone())
            .with_secure(cookies.secure)
    }

    /// Application user id for a provider identity. Falls back to the provider subject
    /// when the directory is unreachable.
    pub async fn resolve_subject(&self, identity: &IdentityClaims, provider_id: &str) -> String {
        let entry = DirectoryEntry {
            provider_id: provider_id.to_string(),
            provider: identity.provider(),
            email: identity.email().map(str::to_string),
            name: identity.name().map(str::to_string),
        };
        match self.directory.resolve(&entry).await {
            Ok(user) => user.id,
            Err(err) => {
                tracing::warn!(
                    provider = %entry.provider,
                    error = %err,
                    "user directory unavailable, using provider subject"
                );
                provider_id.to_string()
            }
        }
    }

    /// Sign a new access and refresh token for `subject`.
    pub fn mint(&self, identity: &IdentityClaims, subject: &str) -> Result<IssuedSession, ApiError> {
        let now = now_unix();
        let access_token = self
            .codec
            .sign_access_token(identity, subject, now)
            .map_err(|e| ApiError::Internal(format!("failed to sign access token: {e}")))?;
        let refresh_token = self
            .codec
            .sign_refresh_token(identity, subject, &new_token_id(), now)
            .map_err(|e| ApiError::Internal(format!("failed to sign refresh token: {e}")))?;
        tracing::info!(provider = %identity.provider(), subject, "issued session");
        Ok(IssuedSession {
            access_token,
            refresh_token: Some(refresh_token),
            issued_at: now,
            expires_at: self.access_expiry(now),
            warning: None,
        })
    }

    /// Sign only an access token, used when the caller has no refresh token.
    pub fn mint_access_only(
        &self,
        identity: &IdentityClaims,
        subject: &str,
        warning: &str,
    ) -> Result<IssuedSession, ApiError> {
        let now = now_unix();
        let access_token = self
            .codec
            .sign_access_token(identity, subject, now)
            .map_err(|e| ApiError::Internal(format!("failed to sign access token: {e}")))?;
        Ok(IssuedSession {
            access_token,
            refresh_token: None,
            issued_at: now,
            expires_at: self.access_expiry(now),
            warning: Some(warning.to_string()),
        })
    }

    /// Web gets `Set-Cookie` headers and a receipt; native gets the tokens in the body.
    pub fn deliver(&self, platform: Platform, session: IssuedSession) -> Result<Response, ApiError> {
        match platform {
            Platform::Native => Ok(Json(NativeTokens {
                access_token: session.access_token,
                refresh_token: session.refresh_token,
                warning: session.warning,
            })
            .into_response()),
            Platform::Web => {
                let mut cookies = vec![(
                    SET_COOKIE,
                    build_set_cookie(&session.access_token, &self.access_cookie())
                        .map_err(|e| ApiError::Internal(e.to_string()))?,
                )];
                if let Some(refresh) = &session.refresh_token {
                    cookies.push((
                        SET_COOKIE,
                        build_set_cookie(refresh, &self.refresh_cookie())
                            .map_err(|e| ApiError::Internal(e.to_string()))?,
                    ));
                }
                let receipt = WebReceipt {
                    success: true,
                    issued_at: session.issued_at,
                    expires_at: session.expires_at,
                    warning: session.warning,
                };
                Ok((AppendHeaders(cookies), Json(receipt)).into_response())
            }
        }
    }

    /// `Set-Cookie` headers that remove both session cookies.
    pub fn clear_cookies(&self) -> Result<AppendHeaders<Vec<(HeaderName, String)>>, ApiError> {
        let clear = |opts: &CookieOptions| {
            build_clear_cookie(opts).map_err(|e| ApiError::Internal(e.to_string()))
        };
        Ok(AppendHeaders(vec![
            (SET_COOKIE, clear(&self.access_cookie())?),
            (SET_COOKIE, clear(&self.refresh_cookie())?),
        ]))
    }

    fn access_expiry(&self, issued_at: i64) -> i64 {
        issued_at.saturating_add(i64::try_from(self.config.tokens.access_ttl_seconds).unwrap_or(i64::MAX))
    }
}
