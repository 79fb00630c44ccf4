use axum::Form;
use axum::extract::rejection::FormRejection;
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use wheelhouse_api::{GoogleClaims, IdentityClaims, Provider};
use wheelhouse_auth::decode_unverified;

use super::{AuthorizeQuery, CallbackParams, TokenForm, authorize_redirect, return_to_client};
use crate::error::ApiError;
use crate::state::AppState;

/// Claims we read from Google's `id_token`.
#[derive(Debug, Deserialize)]
struct GoogleIdToken {
    sub: String,
    name: Option<String>,
    email: Option<String>,
    picture: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    email_verified: Option<bool>,
}

pub async fn authorize(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Response, ApiError> {
    authorize_redirect(&state, Provider::Google, query)
}

pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    return_to_client(&state, &params)
}

pub async fn token(
    State(state): State<AppState>,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Result<Response, ApiError> {
    let Form(form) = form.map_err(ApiError::from_form_rejection)?;
    let code = form.code()?;
    let platform = form.platform()?;

    let tokens = state
        .google
        .exchange_code(code, form.code_verifier.as_deref())
        .await
        .map_err(|err| ApiError::from_exchange(Provider::Google, err))?;
    let id_token = tokens
        .id_token
        .ok_or_else(|| ApiError::bad_request("Missing required parameters"))?;

    // Received straight from Google's token endpoint over TLS.
    let claims: GoogleIdToken = decode_unverified(&id_token)
        .map_err(|e| ApiError::Internal(format!("unreadable Google id_token: {e}")))?;
    let mut identity = IdentityClaims::Google(GoogleClaims {
        name: claims.name,
        email: claims.email,
        picture: claims.picture,
        given_name: claims.given_name,
        family_name: claims.family_name,
        email_verified: claims.email_verified,
    });
    identity.backfill();

    let subject = state.resolve_subject(&identity, &claims.sub).await;
    let session = state.mint(&identity, &subject)?;
    state.deliver(platform, session)
}
