//! wheelhouse-client
//!
//! Session manager for applications talking to a wheelhouse server.
//!
//! [`SessionManager`] restores a session on startup, drives Google and Apple sign-in,
//! refreshes silently when a request comes back `401`, and offers a local guest mode.
//! Native clients keep tokens in the OS keychain; web clients leave them in the
//! cookie jar where the server put them.
//!
//! ```no_run
//! use std::sync::Arc;
//! use wheelhouse_client::{FileStore, Phase, SessionManager};
//! use wheelhouse_core::ClientConfig;
//!
//! # async fn demo() -> wheelhouse_client::Result<()> {
//! let config = ClientConfig::default();
//! let local = Arc::new(FileStore::new("/tmp/wheelhouse/local.json"));
//! let manager = SessionManager::from_config(&config, local)?;
//!
//! if manager.restore().await? == Phase::Authenticated {
//!     let url = manager.endpoint("api/protected/data")?;
//!     let request = manager.http_client().get(url).build()?;
//!     let response = manager.fetch_with_auth(request).await?;
//!     println!("{}", response.status());
//! }
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

mod error;
mod manager;
mod store;

pub use error::{Result, SessionError};
pub use manager::{Phase, PendingLogin, RedirectOutcome, SessionManager, parse_redirect};
pub use store::{
    ACCESS_TOKEN_KEY, CookieJarStore, FileStore, GUEST_USER_KEY, KeyringStore, MemoryStore,
    REFRESH_TOKEN_KEY, SessionStore,
};
pub use wheelhouse_auth::generate_nonce;
