//! Outbound HTTP collaborators: identity-provider token endpoints and the user backend.

mod apple_secret;
mod directory;
mod exchange;

pub use apple_secret::{
    APPLE_SECRET_AUDIENCE, AppleSecretSigner, ClientSecret, MAX_SECRET_LIFETIME_SECONDS,
};
pub use directory::{HttpUserDirectory, PassthroughDirectory, directory_from_config};
pub use exchange::HttpCodeExchange;
