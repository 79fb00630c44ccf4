//! Error types.

use thiserror::Error;
use wheelhouse_api::TokenKind;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Token signature verified but its `exp` has passed. Recoverable through a refresh.
    #[error("token expired")]
    Expired,

    /// Token is malformed, has a bad signature, or cannot be decoded. Not recoverable.
    #[error("invalid token: {0}")]
    Invalid(String),

    /// A token of the wrong kind was presented (for example an access token to refresh).
    #[error("expected a {expected:?} token, got {found:?}")]
    WrongTokenKind {
        /// Kind the caller required.
        expected: TokenKind,
        /// Kind carried by the token.
        found: TokenKind,
    },

    /// Issuer, audience or another required claim did not validate.
    #[error("invalid claims: {0}")]
    InvalidClaims(String),

    /// The identity token's nonce does not match the login attempt.
    #[error("nonce mismatch")]
    NonceMismatch,

    /// Algorithm is not in the allow-list.
    #[error("unsupported JWT algorithm: {0:?}")]
    UnsupportedAlg(jsonwebtoken::Algorithm),

    /// Unable to fetch, parse, or use a JWKS.
    #[error("JWKS error: {0}")]
    Jwks(String),

    /// The JWKS does not contain a usable key for the token.
    #[error("no suitable key found in JWKS")]
    NoMatchingKey,

    /// The OAuth `state` parameter is missing or not of the form `platform|state`.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Cookie name or value contains characters that cannot be sent in a header.
    #[error("invalid cookie: {0}")]
    InvalidCookie(String),

    /// An error occurred while performing HTTP requests.
    #[cfg(feature = "fetch-reqwest")]
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Signing failed.
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl Error {
    /// True for [`Error::Expired`].
    pub fn is_expired(&self) -> bool {
        matches!(self, Error::Expired)
    }
}
