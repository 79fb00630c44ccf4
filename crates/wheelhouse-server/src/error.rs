use axum::Json;
use axum::extract::rejection::FormRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use thiserror::Error;
use wheelhouse_api::{ErrorBody, ExchangeError, Provider, WheelhouseError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Configuration(String),

    #[error("{error}")]
    Provider {
        status: StatusCode,
        error: String,
        details: Option<Value>,
    },

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Configuration(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Provider { status, .. } => *status,
        }
    }

    pub fn unauthorized(message: &str) -> Self {
        ApiError::Unauthorized(message.to_string())
    }

    pub fn bad_request(message: &str) -> Self {
        ApiError::BadRequest(message.to_string())
    }

    /// A token request whose body is not a readable form.
    pub fn from_form_rejection(rejection: FormRejection) -> Self {
        tracing::debug!(error = %rejection, "unreadable token request body");
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }

    /// Translate a failed code exchange into what the client sees.
    pub fn from_exchange(provider: Provider, err: ExchangeError) -> Self {
        match err {
            ExchangeError::NotConfigured(what) => {
                ApiError::Configuration(format!("{provider} sign-in is not configured: missing {what}"))
            }
            ExchangeError::Rejected { status, code, body } => {
                if let Some(message) = code.as_deref().and_then(describe_oauth_error) {
                    let details = body
                        .get("error_description")
                        .cloned()
                        .or_else(|| Some(Value::String(code.unwrap_or_default())));
                    return ApiError::Provider {
                        status: StatusCode::BAD_REQUEST,
                        error: message.to_string(),
                        details,
                    };
                }
                ApiError::Provider {
                    status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                    error: "Failed to fetch token".to_string(),
                    details: Some(body),
                }
            }
            ExchangeError::Transport(reason) => ApiError::Provider {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                error: "Failed to fetch token".to_string(),
                details: Some(Value::String(reason)),
            },
        }
    }
}

/// Human-readable text for the standard OAuth token-endpoint error codes.
pub fn describe_oauth_error(code: &str) -> Option<&'static str> {
    Some(match code {
        "invalid_request" => "The request is missing parameters or contains unsupported parameters",
        "invalid_client" => "Client authentication failed - invalid client ID, secret or redirect URI",
        "invalid_grant" => "Invalid or expired authorization code",
        "unauthorized_client" => "Client not authorized to use this authorization grant type",
        "unsupported_grant_type" => "This grant type is not supported",
        "invalid_scope" => "The requested scope is invalid",
        _ => return None,
    })
}

impl From<WheelhouseError> for ApiError {
    fn from(err: WheelhouseError) -> Self {
        match err {
            WheelhouseError::Validation(msg) => ApiError::BadRequest(msg),
            WheelhouseError::Auth(msg) => ApiError::Unauthorized(msg),
            WheelhouseError::Configuration(msg) => ApiError::Configuration(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        }
        let body = match self {
            ApiError::Provider { error, details, .. } => ErrorBody { error, details },
            ApiError::BadRequest(error)
            | ApiError::Unauthorized(error)
            | ApiError::Configuration(error)
            | ApiError::Internal(error) => ErrorBody {
                error,
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_oauth_codes_map_to_400_with_message() {
        let err = ApiError::from_exchange(
            Provider::Apple,
            ExchangeError::Rejected {
                status: 400,
                code: Some("invalid_grant".to_string()),
                body: json!({"error": "invalid_grant"}),
            },
        );
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Invalid or expired authorization code");
    }

    #[test]
    fn unknown_rejection_keeps_provider_status() {
        let err = ApiError::from_exchange(
            Provider::Google,
            ExchangeError::Rejected {
                status: 403,
                code: Some("access_denied".to_string()),
                body: json!({"error": "access_denied"}),
            },
        );
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "Failed to fetch token");
    }

    #[test]
    fn transport_failure_is_500() {
        let err = ApiError::from_exchange(
            Provider::Google,
            ExchangeError::Transport("connection refused".to_string()),
        );
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn every_documented_code_has_text() {
        for code in [
            "invalid_request",
            "invalid_client",
            "invalid_grant",
            "unauthorized_client",
            "unsupported_grant_type",
            "invalid_scope",
        ] {
            assert!(describe_oauth_error(code).is_some(), "{code}");
        }
        assert!(describe_oauth_error("server_error").is_none());
    }
}
