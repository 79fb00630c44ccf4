//! The `platform|state` composite threaded through the OAuth redirect.

use wheelhouse_api::Platform;

use crate::{Error, Result};

/// Decoded OAuth `state` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationState {
    /// Client surface the callback must return to.
    pub platform: Platform,
    /// The client's own opaque state, returned untouched.
    pub client_state: String,
}

impl AuthorizationState {
    /// Wire form, `platform|client_state`.
    pub fn compose(&self) -> String {
        compose_state(self.platform, &self.client_state)
    }
}

/// Build the provider-side `state` value.
pub fn compose_state(platform: Platform, client_state: &str) -> String {
    format!("{}|{client_state}", platform.as_str())
}

/// Split `raw` on the first `|`.
///
/// A missing separator, an unknown platform or an empty client state are all errors.
pub fn parse_state(raw: &str) -> Result<AuthorizationState> {
    let (platform, client_state) = raw
        .split_once('|')
        .ok_or_else(|| Error::InvalidState("expected platform|state".to_string()))?;
    let platform = platform
        .parse::<Platform>()
        .map_err(|_| Error::InvalidState(format!("unknown platform {platform:?}")))?;
    if client_state.is_empty() {
        return Err(Error::InvalidState("empty client state".to_string()));
    }
    Ok(AuthorizationState {
        platform,
        client_state: client_state.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_web_state() {
        let state = parse_state("web|abc123").unwrap();
        assert_eq!(state.platform, Platform::Web);
        assert_eq!(state.client_state, "abc123");
    }

    #[test]
    fn splits_on_first_separator_only() {
        let state = parse_state("native|a|b|c").unwrap();
        assert_eq!(state.platform, Platform::Native);
        assert_eq!(state.client_state, "a|b|c");
    }

    #[test]
    fn compose_round_trips() {
        let state = AuthorizationState {
            platform: Platform::Native,
            client_state: "xyz".to_string(),
        };
        assert_eq!(state.compose(), "native|xyz");
        assert_eq!(parse_state(&state.compose()).unwrap(), state);
    }

    #[test]
    fn rejects_malformed_state() {
        for raw in ["", "abc123", "desktop|abc", "web|", "|abc"] {
            assert!(
                matches!(parse_state(raw), Err(Error::InvalidState(_))),
                "{raw:?} should be rejected"
            );
        }
    }
}
