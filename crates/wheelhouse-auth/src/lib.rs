//! wheelhouse-auth
//!
//! Token and identity primitives shared by the wheelhouse server and client.
//!
//! - **Session tokens**: HS256 access/refresh tokens via [`TokenCodec`], with expired and
//!   invalid tokens reported as distinct errors
//! - **Identity tokens**: JWKS-backed verification ([`JwtVerifier`]) and the Sign in with
//!   Apple checks on top of it ([`AppleIdentityVerifier`]), including the nonce
//! - **Transport**: session cookies, the `platform|state` OAuth state, PKCE and nonces
//!
//! ## Quick start
//! ```no_run
//! use wheelhouse_api::{GoogleClaims, IdentityClaims};
//! use wheelhouse_auth::{TokenCodec, TokenTtl, new_token_id, now_unix};
//!
//! # fn demo() -> Result<(), wheelhouse_auth::Error> {
//! let codec = TokenCodec::new(b"process-wide secret", TokenTtl::default());
//! let identity = IdentityClaims::Google(GoogleClaims::default());
//! let now = now_unix();
//!
//! let access = codec.sign_access_token(&identity, "user-1", now)?;
//! let refresh = codec.sign_refresh_token(&identity, "user-1", &new_token_id(), now)?;
//!
//! assert_eq!(codec.verify(&access)?.sub, "user-1");
//! assert!(codec.verify_refresh(&refresh).is_ok());
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

mod apple;
mod codec;
mod cookie;
mod error;
mod jwt;
mod pkce;
mod state;

pub use apple::{
    APPLE_ISSUER, APPLE_JWKS_URL, AppleIdentity, AppleIdentityVerifier, apple_flag, check_nonce,
};
pub use codec::{TokenCodec, TokenTtl, decode_unverified, expect_kind, new_token_id, now_unix};
pub use cookie::{
    CookieOptions, ParsedCookie, SameSite, build_clear_cookie, build_set_cookie, find_cookie,
    parse_cookie_header,
};
pub use error::{Error, Result};
pub use jwt::{Jwk, JwksSet, JwksSource, JwtVerifier, VerifiedJwt, VerifyOptions};
pub use pkce::{
    generate_code_challenge, generate_code_verifier, generate_nonce, generate_state, hash_nonce,
};
pub use state::{AuthorizationState, compose_state, parse_state};
