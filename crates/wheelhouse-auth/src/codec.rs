//! Signing and verification of application session tokens.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use wheelhouse_api::{IdentityClaims, SessionClaims, TokenKind};

use crate::{Error, Result};

/// Lifetimes for the two token kinds, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTtl {
    /// Access token lifetime.
    pub access_seconds: u64,
    /// Refresh token lifetime.
    pub refresh_seconds: u64,
}

impl Default for TokenTtl {
    fn default() -> Self {
        Self {
            access_seconds: 15 * 60,
            refresh_seconds: 30 * 24 * 60 * 60,
        }
    }
}

/// HS256 codec for access and refresh tokens.
///
/// The secret is fixed at construction. Clone the codec (or share it behind an `Arc`)
/// rather than rebuilding it per request.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: TokenTtl,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec from the shared signing secret.
    pub fn new(secret: &[u8], ttl: TokenTtl) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Configured lifetimes.
    pub fn ttl(&self) -> TokenTtl {
        self.ttl
    }

    /// Sign a short-lived access token. Access tokens carry no `type` marker.
    pub fn sign_access_token(
        &self,
        identity: &IdentityClaims,
        subject: &str,
        issued_at: i64,
    ) -> Result<String> {
        let claims = SessionClaims {
            sub: subject.to_string(),
            iat: issued_at,
            exp: issued_at.saturating_add(seconds(self.ttl.access_seconds)),
            jti: None,
            kind: None,
            identity: identity.clone(),
        };
        self.sign(&claims)
    }

    /// Sign a long-lived refresh token carrying `type = refresh` and `token_id` as `jti`.
    pub fn sign_refresh_token(
        &self,
        identity: &IdentityClaims,
        subject: &str,
        token_id: &str,
        issued_at: i64,
    ) -> Result<String> {
        let claims = SessionClaims {
            sub: subject.to_string(),
            iat: issued_at,
            exp: issued_at.saturating_add(seconds(self.ttl.refresh_seconds)),
            jti: Some(token_id.to_string()),
            kind: Some(TokenKind::Refresh),
            identity: identity.clone(),
        };
        self.sign(&claims)
    }

    /// Sign an arbitrary claim set as-is.
    pub fn sign(&self, claims: &SessionClaims) -> Result<String> {
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.encoding,
        )?)
    }

    /// Verify signature and expiry against the current time.
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        self.verify_at(token, now_unix())
    }

    /// Verify signature and expiry against `now`.
    ///
    /// The signature is checked first, so a forged token is always [`Error::Invalid`]
    /// even when its `exp` is in the past.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => Error::Invalid("signature mismatch".to_string()),
                _ => Error::Invalid(e.to_string()),
            })?;

        if data.claims.exp <= now {
            return Err(Error::Expired);
        }
        Ok(data.claims)
    }

    /// Verify a token that must be a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<SessionClaims> {
        self.verify_refresh_at(token, now_unix())
    }

    /// [`TokenCodec::verify_refresh`] against `now`.
    pub fn verify_refresh_at(&self, token: &str, now: i64) -> Result<SessionClaims> {
        let claims = self.verify_at(token, now)?;
        expect_kind(&claims, TokenKind::Refresh)?;
        Ok(claims)
    }
}

/// Fail unless `claims` is of the `expected` kind.
pub fn expect_kind(claims: &SessionClaims, expected: TokenKind) -> Result<()> {
    let found = claims.token_kind();
    if found == expected {
        Ok(())
    } else {
        Err(Error::WrongTokenKind { expected, found })
    }
}

/// Read a JWT payload without checking anything.
///
/// Only for tokens whose origin is already trusted (freshly minted, or received
/// directly from a provider over TLS). Never an authorization check.
pub fn decode_unverified<T: DeserializeOwned>(token: &str) -> Result<T> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(Error::Invalid("expected three segments".to_string())),
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::Invalid(format!("payload is not base64url: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Invalid(format!("payload is not JSON: {e}")))
}

/// Fresh unique refresh-token id.
pub fn new_token_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Seconds since the Unix epoch.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

fn seconds(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wheelhouse_api::{AppleClaims, GoogleClaims};

    const SECRET: &[u8] = b"a-test-secret-that-is-long-enough-for-hs256";

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET, TokenTtl::default())
    }

    fn google() -> IdentityClaims {
        IdentityClaims::Google(GoogleClaims {
            name: Some("Ada Lovelace".to_string()),
            email: Some("ada@example.com".to_string()),
            picture: Some("https://example.com/ada.png".to_string()),
            given_name: Some("Ada".to_string()),
            family_name: Some("Lovelace".to_string()),
            email_verified: Some(true),
        })
    }

    #[test]
    fn access_token_round_trip() {
        let codec = codec();
        let now = now_unix();
        let token = codec.sign_access_token(&google(), "user-42", now).unwrap();

        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.sub, "user-42");
        assert_eq!(claims.identity, google());
        assert_eq!(claims.iat, now);
        assert_eq!(claims.exp, now + 900);
        assert_eq!(claims.token_kind(), TokenKind::Access);
        assert!(claims.jti.is_none());
    }

    #[test]
    fn refresh_token_carries_kind_and_id() {
        let codec = codec();
        let identity = IdentityClaims::Apple(AppleClaims {
            email: Some("x@privaterelay.appleid.com".to_string()),
            is_private_email: Some(true),
            real_user_status: Some(2),
            ..AppleClaims::default()
        });
        let token = codec
            .sign_refresh_token(&identity, "user-7", "jti-1", now_unix())
            .unwrap();

        let claims = codec.verify_refresh(&token).unwrap();
        assert_eq!(claims.jti.as_deref(), Some("jti-1"));
        assert_eq!(claims.token_kind(), TokenKind::Refresh);
        assert_eq!(claims.identity, identity);
    }

    #[test]
    fn expired_token_is_expired_not_invalid() {
        let codec = codec();
        let now = now_unix();
        // Issued long enough ago that exp == now - 1.
        let token = codec
            .sign_access_token(&google(), "user", now - 901)
            .unwrap();
        let err = codec.verify_at(&token, now).unwrap_err();
        assert!(matches!(err, Error::Expired), "got {err:?}");
    }

    #[test]
    fn exp_equal_to_now_is_expired() {
        let codec = codec();
        let token = codec.sign_access_token(&google(), "user", 1_000).unwrap();
        assert!(codec.verify_at(&token, 1_899).is_ok());
        assert!(codec.verify_at(&token, 1_900).unwrap_err().is_expired());
    }

    #[test]
    fn wrong_secret_is_invalid_not_expired() {
        let other = TokenCodec::new(b"some-other-secret", TokenTtl::default());
        let now = now_unix();

        let fresh = other.sign_access_token(&google(), "user", now).unwrap();
        let stale = other
            .sign_access_token(&google(), "user", now - 10_000)
            .unwrap();

        for token in [fresh, stale] {
            let err = codec().verify(&token).unwrap_err();
            assert!(matches!(err, Error::Invalid(_)), "got {err:?}");
        }
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(matches!(
            codec().verify("not.a.jwt").unwrap_err(),
            Error::Invalid(_)
        ));
        assert!(matches!(codec().verify("").unwrap_err(), Error::Invalid(_)));
    }

    #[test]
    fn access_token_rejected_where_refresh_expected() {
        let codec = codec();
        let token = codec.sign_access_token(&google(), "user", now_unix()).unwrap();
        let err = codec.verify_refresh(&token).unwrap_err();
        assert!(matches!(
            err,
            Error::WrongTokenKind {
                expected: TokenKind::Refresh,
                found: TokenKind::Access
            }
        ));
    }

    #[test]
    fn decode_unverified_reads_payload() {
        let token = codec().sign_access_token(&google(), "user-1", 5).unwrap();
        let claims: SessionClaims = decode_unverified(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.iat, 5);

        let loose: serde_json::Value = decode_unverified(&token).unwrap();
        assert_eq!(loose["provider"], "google");
    }

    #[test]
    fn decode_unverified_rejects_wrong_shape() {
        assert!(decode_unverified::<serde_json::Value>("abc").is_err());
        assert!(decode_unverified::<serde_json::Value>("a.b.c.d").is_err());
        assert!(decode_unverified::<serde_json::Value>("a.!!!.c").is_err());
    }

    #[test]
    fn token_ids_are_unique() {
        assert_ne!(new_token_id(), new_token_id());
    }
}
