use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use wheelhouse_api::{SessionClaims, TokenKind};
use wheelhouse_auth::{ParsedCookie, expect_kind, find_cookie};

use crate::error::ApiError;
use crate::state::AppState;

/// Verified access-token claims of the caller, from `Authorization: Bearer` or the
/// access cookie.
#[derive(Debug, Clone)]
pub struct AuthUser(pub SessionClaims);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let bearer = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string());
        let token = bearer
            .or_else(|| {
                request_cookie(&parts.headers, &state.config.cookies.access_name)
                    .map(|cookie| cookie.value)
            })
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

        let claims = state.codec.verify(&token).map_err(|err| {
            if err.is_expired() {
                ApiError::unauthorized("Token expired")
            } else {
                tracing::debug!(error = %err, "rejected access token");
                ApiError::unauthorized("Invalid token")
            }
        })?;
        expect_kind(&claims, TokenKind::Access).map_err(|_| ApiError::unauthorized("Invalid token"))?;
        Ok(AuthUser(claims))
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
        .filter(|token| !token.is_empty())
}

/// First cookie called `name` across every `Cookie` header of the request.
pub fn request_cookie(headers: &HeaderMap, name: &str) -> Option<ParsedCookie> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|header| find_cookie(header, name))
        .filter(|cookie| !cookie.value.is_empty())
}
