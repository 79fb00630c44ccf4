use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use wheelhouse_api::{Platform, RefreshRequest, SessionInfo, TokenKind};
use wheelhouse_auth::{Error as AuthError, expect_kind, now_unix};

use crate::error::ApiError;
use crate::extract::{bearer_token, request_cookie};
use crate::state::AppState;

pub const FALLBACK_WARNING: &str = "Using access token fallback - refresh token missing";

#[derive(Debug, Default, Deserialize)]
pub struct PlatformQuery {
    pub platform: Option<Platform>,
}

/// Body of a refresh request, as JSON or as a form. Anything unreadable counts as empty.
fn read_refresh_body(headers: &HeaderMap, body: &[u8]) -> RefreshRequest {
    if body.is_empty() {
        return RefreshRequest::default();
    }
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let parsed = if content_type.starts_with("application/x-www-form-urlencoded") {
        serde_urlencoded::from_bytes::<RefreshRequest>(body).map_err(|e| e.to_string())
    } else {
        serde_json::from_slice::<RefreshRequest>(body).map_err(|e| e.to_string())
    };
    parsed.unwrap_or_else(|err| {
        tracing::debug!(error = %err, "ignoring unreadable refresh body");
        RefreshRequest::default()
    })
}

/// `POST /auth/refresh`: rotate a refresh token into a new pair.
pub async fn refresh(
    State(state): State<AppState>,
    Query(query): Query<PlatformQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = read_refresh_body(&headers, &body);
    let platform = request.platform.or(query.platform).unwrap_or_default();

    let refresh_token = request
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| match platform {
            Platform::Web => request_cookie(&headers, &state.config.cookies.refresh_name)
                .map(|cookie| cookie.value),
            Platform::Native => None,
        });

    match refresh_token {
        Some(token) => rotate(&state, platform, &token).await,
        None => access_token_fallback(&state, platform, &headers),
    }
}

async fn rotate(state: &AppState, platform: Platform, token: &str) -> Result<Response, ApiError> {
    let now = now_unix();
    let claims = state.codec.verify_at(token, now).map_err(|err| match err {
        AuthError::Expired => ApiError::unauthorized("Refresh token expired, please sign in again"),
        other => {
            tracing::debug!(error = %other, "rejected refresh token");
            ApiError::unauthorized("Invalid refresh token, please sign in again")
        }
    })?;
    expect_kind(&claims, TokenKind::Refresh)
        .map_err(|_| ApiError::unauthorized("Invalid token type, please sign in again"))?;

    let token_id = claims
        .jti
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token, please sign in again"))?;
    if !state.ledger.consume(token_id, claims.exp, now) {
        tracing::warn!(subject = %claims.sub, "refresh token replayed");
        return Err(ApiError::unauthorized(
            "Invalid refresh token, please sign in again",
        ));
    }

    let mut identity = claims.identity;
    identity.backfill();
    let session = state.mint(&identity, &claims.sub)?;
    tracing::debug!(subject = %claims.sub, %platform, "rotated refresh token");
    state.deliver(platform, session)
}

fn access_token_fallback(
    state: &AppState,
    platform: Platform,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    if !state.config.tokens.allow_access_token_fallback {
        return Err(ApiError::unauthorized("Authentication required - no refresh token"));
    }
    let bearer = bearer_token(headers)
        .ok_or_else(|| ApiError::unauthorized("Authentication required - no refresh token"))?;
    let claims = state
        .codec
        .verify(&bearer)
        .ok()
        .filter(|c| c.token_kind() == TokenKind::Access)
        .ok_or_else(|| ApiError::unauthorized("Authentication required - no valid refresh token"))?;

    tracing::warn!(subject = %claims.sub, "refresh without refresh token, using access token fallback");
    let mut identity = claims.identity;
    identity.backfill();
    let session = state.mint_access_only(&identity, &claims.sub, FALLBACK_WARNING)?;
    state.deliver(platform, session)
}

/// `GET /auth/session`: claims of the web session cookie.
pub async fn session(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<SessionInfo>, ApiError> {
    let cookie = request_cookie(&headers, &state.config.cookies.access_name)
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;
    let claims = state.codec.verify(&cookie.value).map_err(|err| {
        if err.is_expired() {
            ApiError::unauthorized("Token expired")
        } else {
            ApiError::unauthorized("Invalid session")
        }
    })?;
    expect_kind(&claims, TokenKind::Access).map_err(|_| ApiError::unauthorized("Invalid session"))?;

    let lifetime = cookie
        .max_age
        .unwrap_or(state.config.tokens.access_ttl_seconds);
    let cookie_expiration = claims
        .iat
        .checked_add(i64::try_from(lifetime).unwrap_or(i64::MAX));
    Ok(Json(SessionInfo {
        claims,
        cookie_expiration,
    }))
}

/// `POST /auth/logout`: expire both session cookies.
pub async fn logout(State(state): State<AppState>) -> Result<Response, ApiError> {
    let cleared = state.clear_cookies()?;
    Ok((cleared, Json(json!({ "success": true }))).into_response())
}
