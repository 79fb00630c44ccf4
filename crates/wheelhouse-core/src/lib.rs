use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;
use wheelhouse_api::{Platform, WheelhouseError};

pub const CONFIG_FILE_NAME: &str = "wheelhouse.toml";

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const APPLE_AUTH_URL: &str = "https://appleid.apple.com/auth/authorize";
pub const APPLE_TOKEN_URL: &str = "https://appleid.apple.com/auth/token";
pub const APPLE_KEYS_URL: &str = "https://appleid.apple.com/auth/keys";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPolicy {
    pub secret: String,
    pub access_ttl_seconds: u64,
    pub refresh_ttl_seconds: u64,
    /// Mint a new access token from a still-valid bearer when no refresh token is sent.
    pub allow_access_token_fallback: bool,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            secret: String::new(),
            access_ttl_seconds: 15 * 60,
            refresh_ttl_seconds: 30 * 24 * 60 * 60,
            allow_access_token_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookiePolicy {
    pub access_name: String,
    pub refresh_name: String,
    pub refresh_path: String,
    pub domain: Option<String>,
    pub secure: bool,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            access_name: "access_token".to_string(),
            refresh_name: "refresh_token".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            domain: None,
            secure: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: String,
    pub auth_url: String,
    pub token_url: String,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            scope: "openid profile email".to_string(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppleSettings {
    /// Services id used by the web redirect flow.
    pub client_id: Option<String>,
    /// Pre-minted client secret. When absent, one is signed from the team key.
    pub client_secret: Option<String>,
    pub team_id: Option<String>,
    pub key_id: Option<String>,
    pub private_key_path: Option<PathBuf>,
    pub redirect_uri: Option<String>,
    /// Bundle id: the audience of identity tokens from native sign-in.
    pub bundle_id: Option<String>,
    pub scope: String,
    pub auth_url: String,
    pub token_url: String,
    pub jwks_url: String,
    pub jwks_max_age_seconds: u64,
}

impl Default for AppleSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            team_id: None,
            key_id: None,
            private_key_path: None,
            redirect_uri: None,
            bundle_id: None,
            scope: "name email".to_string(),
            auth_url: APPLE_AUTH_URL.to_string(),
            token_url: APPLE_TOKEN_URL.to_string(),
            jwks_url: APPLE_KEYS_URL.to_string(),
            jwks_max_age_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Public URL of this server; provider redirect URIs hang off it.
    pub public_url: String,
    /// The web client's origin, one of the two accepted `redirect_uri` values.
    pub web_origin: String,
    /// The native app's custom scheme (for example `wheelhouse://`), the other one.
    pub app_scheme: String,
    /// Application backend for user sync. Provider subjects are used as ids when absent.
    pub backend_url: Option<String>,
    pub tokens: TokenPolicy,
    pub cookies: CookiePolicy,
    pub google: GoogleSettings,
    pub apple: AppleSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8081".to_string(),
            public_url: "http://localhost:8081".to_string(),
            web_origin: "http://localhost:8081".to_string(),
            app_scheme: "wheelhouse://".to_string(),
            backend_url: None,
            tokens: TokenPolicy::default(),
            cookies: CookiePolicy::default(),
            google: GoogleSettings::default(),
            apple: AppleSettings::default(),
        }
    }
}

impl ServerConfig {
    pub fn google_redirect_uri(&self) -> String {
        self.google
            .redirect_uri
            .clone()
            .unwrap_or_else(|| format!("{}/auth/callback", trim_slash(&self.public_url)))
    }

    pub fn apple_redirect_uri(&self) -> String {
        self.apple
            .redirect_uri
            .clone()
            .unwrap_or_else(|| format!("{}/auth/apple/callback", trim_slash(&self.public_url)))
    }

    /// Which client surface `redirect_uri` belongs to; `None` for anything else.
    pub fn redirect_platform(&self, redirect_uri: &str) -> Option<Platform> {
        let candidate = trim_slash(redirect_uri);
        if candidate.is_empty() {
            return None;
        }
        if candidate == trim_slash(&self.web_origin) {
            Some(Platform::Web)
        } else if candidate == trim_slash(&self.app_scheme) {
            Some(Platform::Native)
        } else {
            None
        }
    }

    /// Where the callback hands control back to, per platform.
    pub fn client_redirect_base(&self, platform: Platform) -> &str {
        match platform {
            Platform::Web => &self.web_origin,
            Platform::Native => &self.app_scheme,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the wheelhouse server.
    pub server_url: String,
    pub platform: Platform,
    /// `redirect_uri` the client registers with `/auth/authorize`.
    pub redirect_uri: String,
    /// Keyring service holding native tokens.
    pub keyring_service: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8081".to_string(),
            platform: Platform::Native,
            redirect_uri: "wheelhouse://".to_string(),
            keyring_service: "wheelhouse".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WheelhouseConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

pub fn validate_server_config(cfg: &ServerConfig) -> Result<(), WheelhouseError> {
    if cfg.tokens.secret.trim().is_empty() {
        return Err(WheelhouseError::Configuration(
            "token signing secret is not set (JWT_SECRET)".to_string(),
        ));
    }
    if cfg.tokens.access_ttl_seconds == 0 || cfg.tokens.refresh_ttl_seconds == 0 {
        return Err(WheelhouseError::Validation(
            "token lifetimes must be positive".to_string(),
        ));
    }
    if cfg.tokens.refresh_ttl_seconds <= cfg.tokens.access_ttl_seconds {
        return Err(WheelhouseError::Validation(
            "refresh tokens must outlive access tokens".to_string(),
        ));
    }
    for (field, value) in [("public_url", &cfg.public_url), ("web_origin", &cfg.web_origin)] {
        let parsed = Url::parse(value)
            .map_err(|e| WheelhouseError::Validation(format!("{field} {value:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(WheelhouseError::Validation(format!(
                "{field} must be http(s), got {value}"
            )));
        }
    }
    if !cfg.app_scheme.contains(':') || cfg.app_scheme.starts_with("http") {
        return Err(WheelhouseError::Validation(format!(
            "app_scheme must be a custom scheme such as wheelhouse://, got {:?}",
            cfg.app_scheme
        )));
    }
    if trim_slash(&cfg.web_origin) == trim_slash(&cfg.app_scheme) {
        return Err(WheelhouseError::Validation(
            "web_origin and app_scheme must differ".to_string(),
        ));
    }
    if !cfg.cookies.refresh_path.starts_with('/') {
        return Err(WheelhouseError::Validation(
            "cookies.refresh_path must be absolute".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_client_config(cfg: &ClientConfig) -> Result<(), WheelhouseError> {
    Url::parse(&cfg.server_url).map_err(|e| {
        WheelhouseError::Validation(format!("server_url {:?}: {e}", cfg.server_url))
    })?;
    if cfg.redirect_uri.trim().is_empty() {
        return Err(WheelhouseError::Validation(
            "client redirect_uri is empty".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    server: RawServer,
    #[serde(default)]
    client: RawClient,
}

#[derive(Debug, Default, Deserialize)]
struct RawServer {
    bind_addr: Option<String>,
    public_url: Option<String>,
    web_origin: Option<String>,
    app_scheme: Option<String>,
    backend_url: Option<String>,
    #[serde(default)]
    tokens: RawTokens,
    #[serde(default)]
    cookies: RawCookies,
    #[serde(default)]
    google: RawGoogle,
    #[serde(default)]
    apple: RawApple,
}

#[derive(Debug, Default, Deserialize)]
struct RawTokens {
    secret: Option<String>,
    access_ttl_seconds: Option<u64>,
    refresh_ttl_seconds: Option<u64>,
    allow_access_token_fallback: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCookies {
    access_name: Option<String>,
    refresh_name: Option<String>,
    refresh_path: Option<String>,
    domain: Option<String>,
    secure: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGoogle {
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
    scope: Option<String>,
    auth_url: Option<String>,
    token_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawApple {
    client_id: Option<String>,
    client_secret: Option<String>,
    team_id: Option<String>,
    key_id: Option<String>,
    private_key_path: Option<PathBuf>,
    redirect_uri: Option<String>,
    bundle_id: Option<String>,
    scope: Option<String>,
    auth_url: Option<String>,
    token_url: Option<String>,
    jwks_url: Option<String>,
    jwks_max_age_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawClient {
    server_url: Option<String>,
    platform: Option<Platform>,
    redirect_uri: Option<String>,
    keyring_service: Option<String>,
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn set_opt<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

impl RawConfig {
    fn apply(self, cfg: &mut WheelhouseConfig) {
        let RawConfig { server, client } = self;
        let s = &mut cfg.server;
        set(&mut s.bind_addr, server.bind_addr);
        set(&mut s.public_url, server.public_url);
        set(&mut s.web_origin, server.web_origin);
        set(&mut s.app_scheme, server.app_scheme);
        set_opt(&mut s.backend_url, server.backend_url);

        set(&mut s.tokens.secret, server.tokens.secret);
        set(&mut s.tokens.access_ttl_seconds, server.tokens.access_ttl_seconds);
        set(&mut s.tokens.refresh_ttl_seconds, server.tokens.refresh_ttl_seconds);
        set(
            &mut s.tokens.allow_access_token_fallback,
            server.tokens.allow_access_token_fallback,
        );

        set(&mut s.cookies.access_name, server.cookies.access_name);
        set(&mut s.cookies.refresh_name, server.cookies.refresh_name);
        set(&mut s.cookies.refresh_path, server.cookies.refresh_path);
        set_opt(&mut s.cookies.domain, server.cookies.domain);
        set(&mut s.cookies.secure, server.cookies.secure);

        set_opt(&mut s.google.client_id, server.google.client_id);
        set_opt(&mut s.google.client_secret, server.google.client_secret);
        set_opt(&mut s.google.redirect_uri, server.google.redirect_uri);
        set(&mut s.google.scope, server.google.scope);
        set(&mut s.google.auth_url, server.google.auth_url);
        set(&mut s.google.token_url, server.google.token_url);

        set_opt(&mut s.apple.client_id, server.apple.client_id);
        set_opt(&mut s.apple.client_secret, server.apple.client_secret);
        set_opt(&mut s.apple.team_id, server.apple.team_id);
        set_opt(&mut s.apple.key_id, server.apple.key_id);
        set_opt(&mut s.apple.private_key_path, server.apple.private_key_path);
        set_opt(&mut s.apple.redirect_uri, server.apple.redirect_uri);
        set_opt(&mut s.apple.bundle_id, server.apple.bundle_id);
        set(&mut s.apple.scope, server.apple.scope);
        set(&mut s.apple.auth_url, server.apple.auth_url);
        set(&mut s.apple.token_url, server.apple.token_url);
        set(&mut s.apple.jwks_url, server.apple.jwks_url);
        set(&mut s.apple.jwks_max_age_seconds, server.apple.jwks_max_age_seconds);

        let c = &mut cfg.client;
        set(&mut c.server_url, client.server_url);
        set(&mut c.platform, client.platform);
        set(&mut c.redirect_uri, client.redirect_uri);
        set(&mut c.keyring_service, client.keyring_service);
    }
}

/// Overlay environment variables. `lookup` is `std::env::var` in production.
pub fn apply_env<F>(cfg: &mut WheelhouseConfig, lookup: F) -> Result<(), WheelhouseError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| lookup(k).filter(|v| !v.trim().is_empty()))
    };
    let parse_u64 = |keys: &[&str]| -> Result<Option<u64>, WheelhouseError> {
        get(keys)
            .map(|v| {
                v.trim().parse::<u64>().map_err(|e| {
                    WheelhouseError::Validation(format!("{} must be an integer: {e}", keys[0]))
                })
            })
            .transpose()
    };
    let parse_bool = |keys: &[&str]| -> Result<Option<bool>, WheelhouseError> {
        get(keys)
            .map(|v| match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(WheelhouseError::Validation(format!(
                    "{} must be a boolean, got {other}",
                    keys[0]
                ))),
            })
            .transpose()
    };

    let s = &mut cfg.server;
    set(&mut s.bind_addr, get(&["WHEELHOUSE_BIND_ADDR"]));
    set(
        &mut s.public_url,
        get(&["WHEELHOUSE_PUBLIC_URL", "EXPO_PUBLIC_BASE_URL"]),
    );
    set(
        &mut s.web_origin,
        get(&["WHEELHOUSE_WEB_ORIGIN", "EXPO_PUBLIC_BASE_URL"]),
    );
    set(&mut s.app_scheme, get(&["APP_SCHEME", "EXPO_PUBLIC_SCHEME"]));
    set_opt(&mut s.backend_url, get(&["BACKEND_URL"]));

    set(&mut s.tokens.secret, get(&["JWT_SECRET"]));
    set(
        &mut s.tokens.access_ttl_seconds,
        parse_u64(&["WHEELHOUSE_ACCESS_TTL_SECONDS"])?,
    );
    set(
        &mut s.tokens.refresh_ttl_seconds,
        parse_u64(&["WHEELHOUSE_REFRESH_TTL_SECONDS"])?,
    );
    set(
        &mut s.tokens.allow_access_token_fallback,
        parse_bool(&["WHEELHOUSE_ALLOW_ACCESS_TOKEN_FALLBACK"])?,
    );

    set_opt(&mut s.cookies.domain, get(&["WHEELHOUSE_COOKIE_DOMAIN"]));
    set(&mut s.cookies.secure, parse_bool(&["WHEELHOUSE_COOKIE_SECURE"])?);

    set_opt(&mut s.google.client_id, get(&["GOOGLE_CLIENT_ID"]));
    set_opt(&mut s.google.client_secret, get(&["GOOGLE_CLIENT_SECRET"]));
    set_opt(&mut s.google.redirect_uri, get(&["GOOGLE_REDIRECT_URI"]));

    set_opt(&mut s.apple.client_id, get(&["APPLE_CLIENT_ID"]));
    set_opt(&mut s.apple.client_secret, get(&["APPLE_CLIENT_SECRET"]));
    set_opt(&mut s.apple.team_id, get(&["APPLE_TEAM_ID"]));
    set_opt(&mut s.apple.key_id, get(&["APPLE_KEY_ID"]));
    set_opt(
        &mut s.apple.private_key_path,
        get(&["APPLE_PRIVATE_KEY_PATH"]).map(PathBuf::from),
    );
    set_opt(&mut s.apple.redirect_uri, get(&["APPLE_REDIRECT_URI"]));
    set_opt(&mut s.apple.bundle_id, get(&["APPLE_BUNDLE_ID"]));

    let c = &mut cfg.client;
    set(&mut c.server_url, get(&["WHEELHOUSE_SERVER_URL"]));
    if let Some(platform) = get(&["WHEELHOUSE_PLATFORM"]) {
        c.platform = platform.parse()?;
    }
    set(&mut c.redirect_uri, get(&["WHEELHOUSE_REDIRECT_URI"]));
    set(&mut c.keyring_service, get(&["WHEELHOUSE_KEYRING_SERVICE"]));
    Ok(())
}

pub fn default_config_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config").join("wheelhouse")
    } else {
        PathBuf::from(".wheelhouse")
    }
}

pub fn parse_config(content: &str, origin: &str) -> Result<WheelhouseConfig, WheelhouseError> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| WheelhouseError::Validation(format!("invalid TOML in {origin}: {e}")))?;
    let mut cfg = WheelhouseConfig::default();
    raw.apply(&mut cfg);
    Ok(cfg)
}

pub fn load_config_from_file(path: &Path) -> Result<WheelhouseConfig, WheelhouseError> {
    let content = fs::read_to_string(path).map_err(|e| {
        WheelhouseError::NotFound(format!("failed to read {}: {e}", path.display()))
    })?;
    parse_config(&content, &path.display().to_string())
}

/// Defaults, then `path` (or `<dir>/wheelhouse.toml` if it exists), then the environment.
///
/// Validation is left to the caller, which knows whether it needs the server or client half.
pub fn load_config<F>(
    path: Option<&Path>,
    config_dir: &Path,
    lookup: F,
) -> Result<WheelhouseConfig, WheelhouseError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = match path {
        Some(path) => load_config_from_file(path)?,
        None => {
            let candidate = config_dir.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                load_config_from_file(&candidate)?
            } else {
                WheelhouseConfig::default()
            }
        }
    };
    apply_env(&mut cfg, lookup)?;
    Ok(cfg)
}

pub fn write_default_config_file(dir: &Path) -> Result<PathBuf, WheelhouseError> {
    fs::create_dir_all(dir).map_err(|e| {
        WheelhouseError::Internal(format!("failed to create {}: {e}", dir.display()))
    })?;

    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        fs::write(&path, include_str!("../../../docs/wheelhouse.toml.example")).map_err(|e| {
            WheelhouseError::Internal(format!("failed to write {}: {e}", path.display()))
        })?;
    }
    Ok(path)
}

fn trim_slash(value: &str) -> &str {
    value.trim().trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    fn valid() -> ServerConfig {
        let mut cfg = ServerConfig::default();
        cfg.tokens.secret = "s3cret".to_string();
        cfg
    }

    #[test]
    fn defaults_match_documented_lifetimes() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.tokens.access_ttl_seconds, 900);
        assert_eq!(cfg.tokens.refresh_ttl_seconds, 2_592_000);
        assert_eq!(cfg.cookies.refresh_path, "/auth/refresh");
        assert!(cfg.tokens.allow_access_token_fallback);
    }

    #[test]
    fn missing_secret_is_configuration_error() {
        let err = validate_server_config(&ServerConfig::default()).unwrap_err();
        assert!(matches!(err, WheelhouseError::Configuration(_)));
        assert!(validate_server_config(&valid()).is_ok());
    }

    #[test]
    fn rejects_inverted_lifetimes() {
        let mut cfg = valid();
        cfg.tokens.refresh_ttl_seconds = 60;
        assert!(validate_server_config(&cfg).is_err());
    }

    #[test]
    fn rejects_http_app_scheme() {
        let mut cfg = valid();
        cfg.app_scheme = "https://evil.example".to_string();
        assert!(validate_server_config(&cfg).is_err());
    }

    #[test]
    fn redirect_allowlist_has_exactly_two_entries() {
        let mut cfg = valid();
        cfg.web_origin = "https://app.example.com".to_string();
        cfg.app_scheme = "wheelhouse://".to_string();

        assert_eq!(
            cfg.redirect_platform("https://app.example.com"),
            Some(Platform::Web)
        );
        assert_eq!(
            cfg.redirect_platform("https://app.example.com/"),
            Some(Platform::Web)
        );
        assert_eq!(cfg.redirect_platform("wheelhouse://"), Some(Platform::Native));
        assert_eq!(cfg.redirect_platform("https://evil.example.com"), None);
        assert_eq!(cfg.redirect_platform("https://app.example.com/x"), None);
        assert_eq!(cfg.redirect_platform(""), None);
    }

    #[test]
    fn provider_redirects_hang_off_public_url() {
        let mut cfg = valid();
        cfg.public_url = "https://auth.example.com/".to_string();
        assert_eq!(
            cfg.google_redirect_uri(),
            "https://auth.example.com/auth/callback"
        );
        assert_eq!(
            cfg.apple_redirect_uri(),
            "https://auth.example.com/auth/apple/callback"
        );
        cfg.google.redirect_uri = Some("https://elsewhere/cb".to_string());
        assert_eq!(cfg.google_redirect_uri(), "https://elsewhere/cb");
    }

    #[test]
    fn toml_then_env_layering() {
        let toml = r#"
            [server]
            public_url = "https://auth.example.com"
            web_origin = "https://app.example.com"

            [server.tokens]
            secret = "from-file"
            access_ttl_seconds = 300

            [server.google]
            client_id = "file-client"

            [client]
            platform = "web"
        "#;
        let mut cfg = parse_config(toml, "inline").unwrap();
        assert_eq!(cfg.server.tokens.secret, "from-file");
        assert_eq!(cfg.server.tokens.access_ttl_seconds, 300);
        assert_eq!(cfg.client.platform, Platform::Web);

        apply_env(
            &mut cfg,
            env(&[
                ("JWT_SECRET", "from-env"),
                ("GOOGLE_CLIENT_SECRET", "g-secret"),
                ("APP_SCHEME", "myapp://"),
                ("WHEELHOUSE_ALLOW_ACCESS_TOKEN_FALLBACK", "false"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.server.tokens.secret, "from-env");
        assert_eq!(cfg.server.google.client_id.as_deref(), Some("file-client"));
        assert_eq!(cfg.server.google.client_secret.as_deref(), Some("g-secret"));
        assert_eq!(cfg.server.app_scheme, "myapp://");
        assert!(!cfg.server.tokens.allow_access_token_fallback);
        assert!(validate_server_config(&cfg.server).is_ok());
    }

    #[test]
    fn legacy_env_names_are_honoured() {
        let mut cfg = WheelhouseConfig::default();
        apply_env(
            &mut cfg,
            env(&[
                ("EXPO_PUBLIC_BASE_URL", "https://legacy.example.com"),
                ("EXPO_PUBLIC_SCHEME", "legacy://"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.server.public_url, "https://legacy.example.com");
        assert_eq!(cfg.server.web_origin, "https://legacy.example.com");
        assert_eq!(cfg.server.app_scheme, "legacy://");
    }

    #[test]
    fn bad_numbers_in_env_fail() {
        let mut cfg = WheelhouseConfig::default();
        let err = apply_env(&mut cfg, env(&[("WHEELHOUSE_ACCESS_TTL_SECONDS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, WheelhouseError::Validation(_)));
    }

    #[test]
    fn invalid_toml_is_reported() {
        assert!(parse_config("[server\nbind_addr =", "broken").is_err());
    }

    #[test]
    fn bundled_example_parses() {
        let cfg = parse_config(include_str!("../../../docs/wheelhouse.toml.example"), "example")
            .unwrap();
        assert_eq!(cfg.server.cookies.refresh_path, "/auth/refresh");
    }
}
