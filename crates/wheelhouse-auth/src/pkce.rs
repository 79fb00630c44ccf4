//! PKCE, OAuth state and nonce generation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

fn random_url_safe<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Random PKCE code verifier: 64 URL-safe characters (RFC 7636 allows 43-128).
#[must_use]
pub fn generate_code_verifier() -> String {
    random_url_safe::<48>()
}

/// S256 code challenge: `BASE64URL(SHA256(verifier))`.
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Random opaque client state, 22 URL-safe characters.
#[must_use]
pub fn generate_state() -> String {
    random_url_safe::<16>()
}

/// Raw nonce for a native Apple sign-in attempt.
#[must_use]
pub fn generate_nonce() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Form of the nonce Apple embeds when it cannot pass the raw value through.
#[must_use]
pub fn hash_nonce(raw_nonce: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(raw_nonce.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_verifier_is_url_safe_and_sized() {
        let verifier = generate_code_verifier();
        assert_eq!(verifier.len(), 64);
        assert!(
            verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(verifier, generate_code_verifier());
    }

    #[test]
    fn code_challenge_matches_rfc_7636_vector() {
        // Appendix B of RFC 7636.
        let challenge = generate_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn state_length() {
        assert_eq!(generate_state().len(), 22);
        assert_ne!(generate_state(), generate_state());
    }

    #[test]
    fn nonce_hash_is_unpadded_sha256() {
        let hashed = hash_nonce("abc");
        // SHA-256("abc") base64url without padding.
        assert_eq!(hashed, "ungWv48Bz-pBQUDeXa4iI7ADYaOWF3qctBD_YfIAFa0");
        assert!(!hashed.ends_with('='));
        assert_eq!(hash_nonce("abc"), hash_nonce("abc"));
        assert_ne!(generate_nonce(), generate_nonce());
    }
}
