use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not signed in")]
    Unauthenticated,

    #[error("guest sessions have no credentials for authenticated requests")]
    GuestSession,

    #[error("sign-in was cancelled")]
    Cancelled,

    #[error("identity provider reported an error: {0}")]
    Provider(String),

    #[error("returned state does not match the pending sign-in")]
    StateMismatch,

    #[error("server responded {status}: {message}")]
    Server { status: u16, message: String },

    #[error("session store error: {0}")]
    Store(String),

    #[error("{0}")]
    Invalid(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
