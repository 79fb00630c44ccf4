use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::{Form, Json};
use serde_json::Value;
use wheelhouse_api::{
    APPLE_PLACEHOLDER_EMAIL, APPLE_PLACEHOLDER_NAME, AppleClaims, AppleNativeRequest,
    IdentityClaims, Platform, Provider,
};
use wheelhouse_auth::{apple_flag, decode_unverified};

use super::{AuthorizeQuery, CallbackParams, TokenForm, authorize_redirect, return_to_client};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn authorize(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Response, ApiError> {
    authorize_redirect(&state, Provider::Apple, query)
}

/// Apple posts the result (`response_mode=form_post`).
pub async fn callback(
    State(state): State<AppState>,
    Form(params): Form<CallbackParams>,
) -> Result<Response, ApiError> {
    if params.user.is_some() {
        tracing::debug!("apple callback carried first-authorization user details");
    }
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
        .apple
        .exchange_code(code, form.code_verifier.as_deref())
        .await
        .map_err(|err| ApiError::from_exchange(Provider::Apple, err))?;
    let id_token = tokens
        .id_token
        .ok_or_else(|| ApiError::bad_request("Missing required parameters"))?;

    // Received straight from Apple's token endpoint over TLS.
    let claims: Value = decode_unverified(&id_token)
        .map_err(|e| ApiError::Internal(format!("unreadable Apple id_token: {e}")))?;
    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::Internal("Apple id_token has no subject".to_string()))?
        .to_string();

    let mut identity = IdentityClaims::Apple(AppleClaims {
        name: None,
        email: claims.get("email").and_then(Value::as_str).map(str::to_string),
        picture: None,
        email_verified: apple_flag(claims.get("email_verified")),
        is_private_email: apple_flag(claims.get("is_private_email")),
        real_user_status: claims.get("real_user_status").and_then(Value::as_i64),
    });
    identity.backfill();

    let subject = state.resolve_subject(&identity, &subject).await;
    let session = state.mint(&identity, &subject)?;
    state.deliver(platform, session)
}

/// Native Sign in with Apple: the app already holds an identity token and the raw
/// nonce it generated.
pub async fn native(
    State(state): State<AppState>,
    request: Result<Json<AppleNativeRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = request.map_err(|rejection| {
        tracing::warn!(error = %rejection, "unreadable apple native sign-in body");
        ApiError::unauthorized("Invalid token")
    })?;
    let verifier = state.apple_identity.as_ref().ok_or_else(|| {
        ApiError::Configuration("Apple sign-in is not configured: missing bundle id".to_string())
    })?;
    let verified = verifier
        .verify(&request.identity_token, &request.raw_nonce)
        .await
        .map_err(|err| {
            tracing::warn!(error = %err, "apple identity token rejected");
            ApiError::unauthorized("Invalid token")
        })?;

    // Apple only sends the name and email on the very first authorization.
    let (name, email) = match (request.given_name.as_deref(), request.email.clone()) {
        (Some(given), Some(email)) if !given.is_empty() => {
            let family = request.family_name.as_deref().unwrap_or_default();
            (format!("{given} {family}").trim().to_string(), email)
        }
        _ => (
            APPLE_PLACEHOLDER_NAME.to_string(),
            verified
                .email
                .clone()
                .unwrap_or_else(|| APPLE_PLACEHOLDER_EMAIL.to_string()),
        ),
    };

    let mut identity = IdentityClaims::Apple(AppleClaims {
        name: Some(name),
        email: Some(email),
        picture: None,
        email_verified: verified.email_verified,
        is_private_email: verified.is_private_email,
        real_user_status: verified.real_user_status,
    });
    identity.backfill();

    let subject = state.resolve_subject(&identity, &verified.subject).await;
    let session = state.mint(&identity, &subject)?;
    state.deliver(Platform::Native, session)
}
