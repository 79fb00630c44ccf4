use serde::{Deserialize, Serialize};

use crate::{Provider, TokenKind};

pub const DEFAULT_AVATAR_URL: &str = "https://ui-avatars.com/api/?name=User&background=random";
pub const APPLE_PLACEHOLDER_NAME: &str = "apple-user";
pub const APPLE_PLACEHOLDER_EMAIL: &str = "example@icloud.com";
pub const GUEST_NAME: &str = "Guest";

/// Provider-specific identity carried inside a session token.
///
/// Serialized flat with a `provider` discriminator, so a Google token reads
/// `{"provider":"google","name":...,"email":...}` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum IdentityClaims {
    Google(GoogleClaims),
    Apple(AppleClaims),
    Guest(GuestClaims),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppleClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_private_email: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_user_status: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Canonical user shape consumed by everything outside the token layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub provider: Provider,
    pub name: String,
    pub email: Option<String>,
    pub picture: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email_verified: bool,
}

impl IdentityClaims {
    pub fn provider(&self) -> Provider {
        match self {
            IdentityClaims::Google(_) => Provider::Google,
            IdentityClaims::Apple(_) => Provider::Apple,
            IdentityClaims::Guest(_) => Provider::Guest,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            IdentityClaims::Google(g) => g.email.as_deref(),
            IdentityClaims::Apple(a) => a.email.as_deref(),
            IdentityClaims::Guest(_) => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            IdentityClaims::Google(g) => g.name.as_deref(),
            IdentityClaims::Apple(a) => a.name.as_deref(),
            IdentityClaims::Guest(g) => g.name.as_deref(),
        }
    }

    /// Fill claims that older tokens may lack with provider-appropriate defaults.
    pub fn backfill(&mut self) {
        match self {
            IdentityClaims::Google(g) => {
                if g.name.is_none() {
                    g.name = g
                        .email
                        .as_deref()
                        .and_then(|e| e.split('@').next())
                        .filter(|local| !local.is_empty())
                        .map(str::to_string);
                }
                g.picture
                    .get_or_insert_with(|| DEFAULT_AVATAR_URL.to_string());
            }
            IdentityClaims::Apple(a) => {
                a.name
                    .get_or_insert_with(|| APPLE_PLACEHOLDER_NAME.to_string());
                a.email
                    .get_or_insert_with(|| APPLE_PLACEHOLDER_NAME.to_string());
                a.picture
                    .get_or_insert_with(|| DEFAULT_AVATAR_URL.to_string());
            }
            IdentityClaims::Guest(g) => {
                g.name.get_or_insert_with(|| GUEST_NAME.to_string());
            }
        }
    }

    pub fn profile(&self, subject: &str) -> UserProfile {
        match self {
            IdentityClaims::Google(g) => UserProfile {
                id: subject.to_string(),
                provider: Provider::Google,
                name: g
                    .name
                    .clone()
                    .or_else(|| g.email.clone())
                    .unwrap_or_else(|| subject.to_string()),
                email: g.email.clone(),
                picture: g.picture.clone(),
                given_name: g.given_name.clone(),
                family_name: g.family_name.clone(),
                email_verified: g.email_verified.unwrap_or(false),
            },
            IdentityClaims::Apple(a) => UserProfile {
                id: subject.to_string(),
                provider: Provider::Apple,
                name: a
                    .name
                    .clone()
                    .unwrap_or_else(|| APPLE_PLACEHOLDER_NAME.to_string()),
                email: a.email.clone(),
                picture: a.picture.clone(),
                given_name: None,
                family_name: None,
                email_verified: a.email_verified.unwrap_or(false),
            },
            IdentityClaims::Guest(g) => UserProfile {
                id: subject.to_string(),
                provider: Provider::Guest,
                name: g.name.clone().unwrap_or_else(|| GUEST_NAME.to_string()),
                email: None,
                picture: None,
                given_name: None,
                family_name: None,
                email_verified: false,
            },
        }
    }
}

/// Claim set of an application session token (access or refresh).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TokenKind>,
    #[serde(flatten)]
    pub identity: IdentityClaims,
}

impl SessionClaims {
    pub fn token_kind(&self) -> TokenKind {
        self.kind.unwrap_or(TokenKind::Access)
    }

    pub fn profile(&self) -> UserProfile {
        self.identity.profile(&self.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn claims_flatten_with_provider_tag() {
        let claims = SessionClaims {
            sub: "user-1".to_string(),
            iat: 10,
            exp: 20,
            jti: None,
            kind: None,
            identity: IdentityClaims::Google(GoogleClaims {
                name: Some("Ada".to_string()),
                email: Some("ada@example.com".to_string()),
                ..GoogleClaims::default()
            }),
        };
        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(
            value,
            json!({
                "sub": "user-1",
                "iat": 10,
                "exp": 20,
                "provider": "google",
                "name": "Ada",
                "email": "ada@example.com"
            })
        );
        let back: SessionClaims = serde_json::from_value(value).unwrap();
        assert_eq!(back, claims);
    }

    #[test]
    fn refresh_marker_is_named_type() {
        let value = json!({
            "sub": "u",
            "iat": 1,
            "exp": 2,
            "jti": "abc",
            "type": "refresh",
            "provider": "apple",
            "is_private_email": true,
            "real_user_status": 2
        });
        let claims: SessionClaims = serde_json::from_value(value).unwrap();
        assert_eq!(claims.token_kind(), TokenKind::Refresh);
        let IdentityClaims::Apple(apple) = &claims.identity else {
            panic!("expected apple identity");
        };
        assert_eq!(apple.is_private_email, Some(true));
        assert_eq!(apple.real_user_status, Some(2));
    }

    #[test]
    fn apple_backfill_uses_placeholders() {
        let mut identity = IdentityClaims::Apple(AppleClaims::default());
        identity.backfill();
        let profile = identity.profile("sub-1");
        assert_eq!(profile.name, APPLE_PLACEHOLDER_NAME);
        assert_eq!(profile.email.as_deref(), Some(APPLE_PLACEHOLDER_NAME));
        assert_eq!(profile.picture.as_deref(), Some(DEFAULT_AVATAR_URL));
    }

    #[test]
    fn google_backfill_derives_name_from_email() {
        let mut identity = IdentityClaims::Google(GoogleClaims {
            email: Some("grace@example.com".to_string()),
            ..GoogleClaims::default()
        });
        identity.backfill();
        assert_eq!(identity.name(), Some("grace"));
        assert_eq!(identity.profile("s").picture.as_deref(), Some(DEFAULT_AVATAR_URL));
    }

    #[test]
    fn guest_profile_has_no_email() {
        let identity = IdentityClaims::Guest(GuestClaims::default());
        let profile = identity.profile("guest-1");
        assert_eq!(profile.provider, Provider::Guest);
        assert_eq!(profile.name, GUEST_NAME);
        assert!(profile.email.is_none());
    }
}
