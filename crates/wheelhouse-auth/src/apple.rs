//! Sign in with Apple identity-token verification.

use serde_json::{Map, Value};

use crate::jwt::{JwksSource, JwtVerifier, VerifyOptions};
use crate::pkce::hash_nonce;
use crate::{Error, Result};

/// Issuer Apple puts in every identity token.
pub const APPLE_ISSUER: &str = "https://appleid.apple.com";

/// Apple's published signing keys.
pub const APPLE_JWKS_URL: &str = "https://appleid.apple.com/auth/keys";

/// Claims of a verified Apple identity token, with `exp` removed.
#[derive(Debug, Clone)]
pub struct AppleIdentity {
    /// Apple's stable user identifier.
    pub subject: String,
    /// Email, present on first authorization (and for most later ones).
    pub email: Option<String>,
    /// Whether Apple has verified the email.
    pub email_verified: Option<bool>,
    /// Whether the email is a private relay address.
    pub is_private_email: Option<bool>,
    /// Apple's real-user indicator (0 unsupported, 1 unknown, 2 likely real).
    pub real_user_status: Option<i64>,
    /// Whether the platform supports passing the raw nonce through.
    pub nonce_supported: bool,
    /// Every remaining claim, for callers that need more.
    pub claims: Map<String, Value>,
}

/// Verifies identity tokens issued by Apple for one audience.
#[derive(Debug, Clone)]
pub struct AppleIdentityVerifier {
    verifier: JwtVerifier,
    source: JwksSource,
    opts: VerifyOptions,
}

impl AppleIdentityVerifier {
    /// Verifier for tokens whose `aud` is `audience` (the app's bundle or services id).
    pub fn new(audience: impl Into<String>) -> Self {
        Self {
            verifier: JwtVerifier::default(),
            source: JwksSource::Url(APPLE_JWKS_URL.to_string()),
            opts: VerifyOptions {
                issuer: Some(APPLE_ISSUER.to_string()),
                audience: Some(audience.into()),
                require_kid: true,
                ..VerifyOptions::default()
            },
        }
    }

    /// Replace the key source (a fixed set in tests, a mirror in locked-down deployments).
    #[must_use]
    pub fn with_source(mut self, source: JwksSource) -> Self {
        self.source = source;
        self
    }

    /// Share a verifier (and its key cache) with other components.
    #[must_use]
    pub fn with_verifier(mut self, verifier: JwtVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    /// Cap on how long Apple's key set is reused.
    #[must_use]
    pub fn with_max_jwks_age(mut self, seconds: u64) -> Self {
        self.opts.max_jwks_age_seconds = seconds;
        self
    }

    /// Expected audience.
    pub fn audience(&self) -> Option<&str> {
        self.opts.audience.as_deref()
    }

    /// Verify signature, issuer, audience, expiry and nonce.
    ///
    /// Errors are [`Error::Expired`], [`Error::InvalidClaims`], [`Error::NonceMismatch`],
    /// or a signature / key-set failure.
    pub async fn verify(&self, identity_token: &str, raw_nonce: &str) -> Result<AppleIdentity> {
        let verified = self
            .verifier
            .verify_with_source(identity_token, &self.source, &self.opts)
            .await?;

        let Value::Object(mut claims) = verified.claims else {
            return Err(Error::InvalidClaims("claims are not an object".to_string()));
        };

        check_nonce(&claims, raw_nonce)?;

        let subject = claims
            .get("sub")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidClaims("missing sub".to_string()))?
            .to_string();

        claims.remove("exp");

        Ok(AppleIdentity {
            subject,
            email: claims
                .get("email")
                .and_then(Value::as_str)
                .map(str::to_string),
            email_verified: apple_flag(claims.get("email_verified")),
            is_private_email: apple_flag(claims.get("is_private_email")),
            real_user_status: claims.get("real_user_status").and_then(Value::as_i64),
            nonce_supported: apple_flag(claims.get("nonce_supported")).unwrap_or(false),
            claims,
        })
    }
}

/// Check the token's `nonce` against the raw nonce the client generated.
///
/// When Apple reports `nonce_supported`, the claim is the raw value. Otherwise it is
/// the base64url SHA-256 of it.
pub fn check_nonce(claims: &Map<String, Value>, raw_nonce: &str) -> Result<()> {
    let Some(nonce) = claims.get("nonce").and_then(Value::as_str) else {
        return Err(Error::NonceMismatch);
    };
    let nonce_supported = apple_flag(claims.get("nonce_supported")).unwrap_or(false);
    let expected = if nonce_supported {
        raw_nonce.to_string()
    } else {
        hash_nonce(raw_nonce)
    };
    if raw_nonce.is_empty() || nonce != expected {
        return Err(Error::NonceMismatch);
    }
    Ok(())
}

/// Reads an Apple boolean claim, which arrives either as a JSON boolean or as a
/// `"true"`/`"false"` string.
pub fn apple_flag(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::now_unix;
    use crate::jwt::tests::{sign_es256, test_jwks};
    use serde_json::json;

    const AUDIENCE: &str = "com.example.wheelhouse";
    const RAW_NONCE: &str = "2d9f4c1e-raw-nonce";

    fn verifier() -> AppleIdentityVerifier {
        AppleIdentityVerifier::new(AUDIENCE).with_source(JwksSource::Set(test_jwks()))
    }

    fn token(nonce: &str, nonce_supported: Value) -> String {
        sign_es256(&json!({
            "iss": APPLE_ISSUER,
            "aud": AUDIENCE,
            "sub": "001234.abcdef",
            "exp": now_unix() + 600,
            "iat": now_unix(),
            "email": "hidden@privaterelay.appleid.com",
            "email_verified": "true",
            "is_private_email": "true",
            "real_user_status": 2,
            "nonce": nonce,
            "nonce_supported": nonce_supported,
        }))
    }

    #[tokio::test]
    async fn hashed_nonce_verifies_without_native_support() {
        let identity = verifier()
            .verify(&token(&hash_nonce(RAW_NONCE), json!(false)), RAW_NONCE)
            .await
            .unwrap();
        assert_eq!(identity.subject, "001234.abcdef");
        assert_eq!(identity.is_private_email, Some(true));
        assert_eq!(identity.email_verified, Some(true));
        assert_eq!(identity.real_user_status, Some(2));
        assert!(!identity.claims.contains_key("exp"));
        assert!(identity.claims.contains_key("iat"));
    }

    #[tokio::test]
    async fn raw_nonce_verifies_only_with_native_support() {
        let ok = verifier()
            .verify(&token(RAW_NONCE, json!(true)), RAW_NONCE)
            .await
            .unwrap();
        assert!(ok.nonce_supported);

        let err = verifier()
            .verify(&token(RAW_NONCE, json!(false)), RAW_NONCE)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NonceMismatch));
    }

    #[tokio::test]
    async fn hashed_nonce_fails_when_native_support_is_claimed() {
        let err = verifier()
            .verify(&token(&hash_nonce(RAW_NONCE), json!("true")), RAW_NONCE)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NonceMismatch));
    }

    #[tokio::test]
    async fn other_nonce_fails() {
        let err = verifier()
            .verify(&token(&hash_nonce("different"), json!(false)), RAW_NONCE)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NonceMismatch));
    }

    #[tokio::test]
    async fn wrong_issuer_is_invalid_claims() {
        let token = sign_es256(&json!({
            "iss": "https://accounts.google.com",
            "aud": AUDIENCE,
            "sub": "001234.abcdef",
            "exp": now_unix() + 600,
            "nonce": hash_nonce(RAW_NONCE),
        }));
        let err = verifier().verify(&token, RAW_NONCE).await.unwrap_err();
        assert!(matches!(err, Error::InvalidClaims(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn expired_token_is_expired() {
        let token = sign_es256(&json!({
            "iss": APPLE_ISSUER,
            "aud": AUDIENCE,
            "sub": "001234.abcdef",
            "exp": now_unix() - 10,
            "nonce": hash_nonce(RAW_NONCE),
        }));
        let err = verifier().verify(&token, RAW_NONCE).await.unwrap_err();
        assert!(err.is_expired(), "got {err:?}");
    }

    #[test]
    fn missing_nonce_claim_is_mismatch() {
        let claims = Map::new();
        assert!(matches!(
            check_nonce(&claims, RAW_NONCE),
            Err(Error::NonceMismatch)
        ));
    }

    #[test]
    fn apple_flag_accepts_bools_and_strings() {
        assert_eq!(apple_flag(Some(&json!(true))), Some(true));
        assert_eq!(apple_flag(Some(&json!("false"))), Some(false));
        assert_eq!(apple_flag(Some(&json!("TRUE"))), None);
        assert_eq!(apple_flag(Some(&json!(1))), None);
        assert_eq!(apple_flag(None), None);
    }
}
