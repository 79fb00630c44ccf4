pub mod apple;
pub mod google;
pub mod protected;
pub mod session;

use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use url::Url;
use url::form_urlencoded;
use wheelhouse_api::{Platform, Provider};
use wheelhouse_auth::{compose_state, parse_state};

use crate::error::ApiError;
use crate::state::AppState;

/// Query of `GET /auth/authorize` and `GET /auth/apple/authorize`.
#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeQuery {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
    pub scope: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// What a provider sends back to the callback, as query or form.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub id_token: Option<String>,
    pub user: Option<String>,
}

/// Form of the token endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct TokenForm {
    pub code: Option<String>,
    pub platform: Option<String>,
    pub code_verifier: Option<String>,
}

impl TokenForm {
    pub fn platform(&self) -> Result<Platform, ApiError> {
        match self.platform.as_deref().filter(|p| !p.is_empty()) {
            None => Ok(Platform::default()),
            Some(raw) => raw.parse().map_err(|_| ApiError::bad_request("Invalid platform")),
        }
    }

    pub fn code(&self) -> Result<&str, ApiError> {
        self.code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ApiError::bad_request("Missing authorization code"))
    }
}

/// Plain `302 Found` to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// Validate the client's authorize request and send the browser to the provider with
/// the platform folded into `state`.
pub fn authorize_redirect(
    state: &AppState,
    provider: Provider,
    query: AuthorizeQuery,
) -> Result<Response, ApiError> {
    let config = &state.config;
    let (client_id, scope, auth_url, redirect_uri) = match provider {
        Provider::Google => (
            config.google.client_id.as_deref(),
            config.google.scope.as_str(),
            config.google.auth_url.as_str(),
            config.google_redirect_uri(),
        ),
        Provider::Apple => (
            config.apple.client_id.as_deref(),
            config.apple.scope.as_str(),
            config.apple.auth_url.as_str(),
            config.apple_redirect_uri(),
        ),
        Provider::Guest => return Err(ApiError::bad_request("Invalid client")),
    };
    let client_id = client_id.ok_or_else(|| {
        ApiError::Configuration(format!("{provider} sign-in is not configured: missing client id"))
    })?;

    if let Some(requested) = query.client_id.as_deref() {
        if requested != provider.as_str() {
            return Err(ApiError::bad_request("Invalid client"));
        }
    }
    let client_redirect = query
        .redirect_uri
        .as_deref()
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing redirect_uri"))?;
    let platform = config
        .redirect_platform(client_redirect)
        .ok_or_else(|| ApiError::bad_request("Invalid redirect_uri"))?;
    let client_state = query
        .state
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing state"))?;

    let mut url = Url::parse(auth_url)
        .map_err(|e| ApiError::Configuration(format!("invalid {provider} auth url: {e}")))?;
    {
        let mut params = url.query_pairs_mut();
        params
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", query.scope.as_deref().unwrap_or(scope))
            .append_pair("state", &compose_state(platform, client_state));
        match provider {
            Provider::Google => {
                params.append_pair("prompt", "select_account");
                if let Some(challenge) = query.code_challenge.as_deref() {
                    params.append_pair("code_challenge", challenge).append_pair(
                        "code_challenge_method",
                        query.code_challenge_method.as_deref().unwrap_or("S256"),
                    );
                }
            }
            Provider::Apple => {
                params.append_pair("response_mode", "form_post");
            }
            Provider::Guest => {}
        }
    }
    tracing::debug!(%provider, %platform, "redirecting to provider");
    Ok(found(url.as_str()))
}

/// Send the provider's answer back to the client surface encoded in `state`, with
/// the client's own state restored.
pub fn return_to_client(state: &AppState, params: &CallbackParams) -> Result<Response, ApiError> {
    let raw_state = params
        .state
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing state"))?;
    let decoded = parse_state(raw_state).map_err(|err| {
        tracing::warn!(error = %err, "callback with malformed state");
        ApiError::bad_request("Invalid state")
    })?;

    let mut query = form_urlencoded::Serializer::new(String::new());
    match (params.code.as_deref(), params.error.as_deref()) {
        (_, Some(error)) => {
            query.append_pair("error", error);
        }
        (Some(code), None) if !code.is_empty() => {
            query.append_pair("code", code);
        }
        _ => return Err(ApiError::bad_request("Missing authorization code")),
    }
    query.append_pair("state", &decoded.client_state);

    let base = state.config.client_redirect_base(decoded.platform);
    let separator = if base.contains('?') { '&' } else { '?' };
    Ok(found(&format!("{base}{separator}{}", query.finish())))
}
