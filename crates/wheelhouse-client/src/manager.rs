//! Client-side session lifecycle: restore, sign-in, silent refresh and sign-out.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use reqwest::cookie::Jar;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Response, StatusCode, Url};
use serde::Serialize;
use tokio::sync::Mutex;
use wheelhouse_api::{
    AppleNativeRequest, ErrorBody, GUEST_NAME, NativeTokens, Platform, Provider, RefreshRequest,
    SessionClaims, SessionInfo, UserProfile, WebReceipt,
};
use wheelhouse_auth::{
    decode_unverified, generate_code_challenge, generate_code_verifier, generate_state, now_unix,
};
use wheelhouse_core::ClientConfig;

use crate::error::{Result, SessionError};
use crate::store::{
    ACCESS_TOKEN_KEY, CookieJarStore, GUEST_USER_KEY, KeyringStore, REFRESH_TOKEN_KEY, SessionStore,
};

/// Where the session stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Restoring,
    Unauthenticated,
    Authenticated,
    Guest,
}

#[derive(Debug, Default)]
struct SessionState {
    phase: Phase,
    user: Option<UserProfile>,
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// A browser sign-in that has been started but not yet completed.
#[derive(Debug, Clone)]
pub struct PendingLogin {
    pub provider: Provider,
    /// Open this in the system browser.
    pub authorize_url: Url,
    pub state: String,
    code_verifier: Option<String>,
}

/// What the provider redirect carried back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    Success { code: String, state: String },
    Cancel,
    Error(String),
}

/// Parse the URL the server redirected the client surface to.
pub fn parse_redirect(redirect_url: &str) -> Result<RedirectOutcome> {
    let url = Url::parse(redirect_url)
        .map_err(|e| SessionError::Invalid(format!("unreadable redirect {redirect_url:?}: {e}")))?;
    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }
    if let Some(error) = error {
        return Ok(match error.as_str() {
            "access_denied" | "user_cancelled_authorize" | "cancel" => RedirectOutcome::Cancel,
            _ => RedirectOutcome::Error(error),
        });
    }
    match (code, state) {
        (Some(code), Some(state)) if !code.is_empty() => Ok(RedirectOutcome::Success { code, state }),
        _ => Err(SessionError::Invalid(
            "redirect carries neither a code nor an error".to_string(),
        )),
    }
}

/// Owns one client's session.
///
/// Refreshes are single-flight: callers pass the generation they observed before their
/// request failed, and only the first of them reaches the server.
pub struct SessionManager {
    server: Url,
    platform: Platform,
    redirect_uri: String,
    http: reqwest::Client,
    tokens: Arc<dyn SessionStore>,
    local: Arc<dyn SessionStore>,
    state: RwLock<SessionState>,
    refresh_gate: Mutex<()>,
    generation: AtomicU64,
    refreshing: AtomicBool,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("server", &self.server.as_str())
            .field("platform", &self.platform)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        config: &ClientConfig,
        http: reqwest::Client,
        tokens: Arc<dyn SessionStore>,
        local: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        let mut server = Url::parse(&config.server_url).map_err(|e| {
            SessionError::Invalid(format!("invalid server url {:?}: {e}", config.server_url))
        })?;
        if !server.path().ends_with('/') {
            let path = format!("{}/", server.path());
            server.set_path(&path);
        }
        Ok(Self {
            server,
            platform: config.platform,
            redirect_uri: config.redirect_uri.clone(),
            http,
            tokens,
            local,
            state: RwLock::new(SessionState::default()),
            refresh_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
            refreshing: AtomicBool::new(false),
        })
    }

    /// Native client: tokens in the OS keychain under `config.keyring_service`.
    pub fn native(config: &ClientConfig, local: Arc<dyn SessionStore>) -> Result<Self> {
        let tokens = Arc::new(KeyringStore::new(config.keyring_service.clone()));
        Self::new(config, reqwest::Client::new(), tokens, local)
    }

    /// Web client: tokens live in the HTTP client's cookie jar, set by the server.
    pub fn web(config: &ClientConfig, local: Arc<dyn SessionStore>) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .build()?;
        let server = Url::parse(&config.server_url)
            .map_err(|e| SessionError::Invalid(format!("invalid server url: {e}")))?;
        let tokens = Arc::new(CookieJarStore::new(jar, &server, &["/", "/auth/refresh"]));
        Self::new(config, http, tokens, local)
    }

    pub fn from_config(config: &ClientConfig, local: Arc<dyn SessionStore>) -> Result<Self> {
        match config.platform {
            Platform::Web => Self::web(config, local),
            Platform::Native => Self::native(config, local),
        }
    }

    // ---- observers ----

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn phase(&self) -> Phase {
        self.read_state().phase
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read_state().user.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read_state().access_token.clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    /// Number of refresh attempts that have finished.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// The HTTP client carrying this session's cookies (web) or none of them (native).
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.server
            .join(path.trim_start_matches('/'))
            .map_err(|e| SessionError::Invalid(format!("invalid path {path:?}: {e}")))
    }

    // ---- restore ----

    /// Rebuild the session from whatever survived the last run.
    pub async fn restore(&self) -> Result<Phase> {
        self.write_state().phase = Phase::Restoring;

        if let Some(guest) = self.load_guest().await? {
            self.set_guest(guest);
            return Ok(Phase::Guest);
        }

        let phase = match self.platform {
            Platform::Web => self.restore_web().await,
            Platform::Native => self.restore_native().await?,
        };
        if phase != Phase::Authenticated {
            self.write_state().phase = Phase::Unauthenticated;
        }
        tracing::debug!(?phase, platform = %self.platform, "session restored");
        Ok(phase)
    }

    async fn restore_web(&self) -> Phase {
        match self.fetch_session().await {
            Ok(profile) => {
                self.set_authenticated(profile, None, None);
                Phase::Authenticated
            }
            Err(err) => {
                tracing::debug!(error = %err, "no web session, trying refresh");
                match self.refresh().await {
                    Ok(()) if self.phase() == Phase::Authenticated => Phase::Authenticated,
                    _ => Phase::Unauthenticated,
                }
            }
        }
    }

    async fn restore_native(&self) -> Result<Phase> {
        let access = self.tokens.get(ACCESS_TOKEN_KEY).await?;
        let refresh = self.tokens.get(REFRESH_TOKEN_KEY).await?;

        if let Some(access) = access {
            match decode_access(&access) {
                Ok(claims) if claims.exp > now_unix() => {
                    self.set_authenticated(claims.profile(), Some(access), refresh);
                    return Ok(Phase::Authenticated);
                }
                Ok(_) => tracing::debug!("stored access token expired"),
                Err(err) => tracing::debug!(error = %err, "stored access token unreadable"),
            }
        }

        let Some(refresh) = refresh else {
            return Ok(Phase::Unauthenticated);
        };
        self.write_state().refresh_token = Some(refresh);
        match self.refresh().await {
            Ok(()) if self.phase() == Phase::Authenticated => Ok(Phase::Authenticated),
            Ok(()) => Ok(Phase::Unauthenticated),
            Err(err) => {
                tracing::info!(error = %err, "stored session could not be refreshed");
                Ok(Phase::Unauthenticated)
            }
        }
    }

    // ---- refresh ----

    /// Refresh unless one finished since the caller observed `seen_generation`.
    pub async fn refresh(&self) -> Result<()> {
        self.refresh_after(self.generation()).await
    }

    pub async fn refresh_after(&self, seen_generation: u64) -> Result<()> {
        let _gate = self.refresh_gate.lock().await;
        if self.generation() != seen_generation {
            tracing::debug!("refresh already completed by a concurrent caller");
            return Ok(());
        }
        self.refreshing.store(true, Ordering::SeqCst);
        let result = self.perform_refresh().await;
        self.refreshing.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn perform_refresh(&self) -> Result<()> {
        let body = match self.platform {
            Platform::Native => {
                let staged = self.read_state().refresh_token.clone();
                let token = match staged {
                    Some(token) => Some(token),
                    None => self.tokens.get(REFRESH_TOKEN_KEY).await?,
                };
                let Some(token) = token else {
                    self.force_logout().await;
                    return Err(SessionError::Unauthenticated);
                };
                RefreshRequest {
                    platform: Some(Platform::Native),
                    refresh_token: Some(token),
                }
            }
            Platform::Web => RefreshRequest {
                platform: Some(Platform::Web),
                refresh_token: None,
            },
        };

        let response = match self
            .http
            .post(self.endpoint("auth/refresh")?)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "refresh request failed, signing out");
                self.force_logout().await;
                return Err(err.into());
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let message = error_message(response).await;
            tracing::info!(%message, "refresh rejected, signing out");
            self.force_logout().await;
            return Err(SessionError::Unauthenticated);
        }
        if !status.is_success() {
            return Err(SessionError::Server {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }
        self.accept_session(response).await?;
        tracing::debug!("session refreshed");
        Ok(())
    }

    // ---- authenticated requests ----

    /// Send `request` with the session credential, refreshing once on `401`.
    ///
    /// The request body must be replayable (not a stream).
    pub async fn fetch_with_auth(&self, request: reqwest::Request) -> Result<Response> {
        if self.phase() == Phase::Guest {
            return Err(SessionError::GuestSession);
        }
        let seen = self.generation();
        let retry = request.try_clone().ok_or_else(|| {
            SessionError::Invalid("request body cannot be replayed for retry".to_string())
        })?;

        let response = self.send_authorized(request).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!(url = %response.url(), "request unauthorized, refreshing");
        self.refresh_after(seen).await?;

        let response = self.send_authorized(retry).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(SessionError::Unauthenticated);
        }
        Ok(response)
    }

    async fn send_authorized(&self, mut request: reqwest::Request) -> Result<Response> {
        if self.platform == Platform::Native {
            let token = self.access_token().ok_or(SessionError::Unauthenticated)?;
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| SessionError::Invalid("access token is not a valid header".to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(self.http.execute(request).await?)
    }

    // ---- sign-in ----

    /// Start a browser sign-in. Open `authorize_url`, then hand the redirect to
    /// [`SessionManager::complete_login`].
    pub fn begin_login(&self, provider: Provider) -> Result<PendingLogin> {
        let path = match provider {
            Provider::Google => "auth/authorize",
            Provider::Apple => "auth/apple/authorize",
            Provider::Guest => {
                return Err(SessionError::Invalid(
                    "guest sign-in does not use the browser".to_string(),
                ));
            }
        };
        let state = generate_state();
        // Apple's form_post flow has no PKCE.
        let code_verifier = (provider == Provider::Google).then(generate_code_verifier);

        let mut authorize_url = self.endpoint(path)?;
        {
            let mut query = authorize_url.query_pairs_mut();
            query
                .append_pair("client_id", provider.as_str())
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("state", &state);
            if let Some(verifier) = &code_verifier {
                query
                    .append_pair("code_challenge", &generate_code_challenge(verifier))
                    .append_pair("code_challenge_method", "S256");
            }
        }
        Ok(PendingLogin {
            provider,
            authorize_url,
            state,
            code_verifier,
        })
    }

    /// Finish a browser sign-in from the URL the client surface was redirected to.
    ///
    /// Cancellation and provider errors leave the stored session untouched.
    pub async fn complete_login(&self, pending: &PendingLogin, redirect_url: &str) -> Result<UserProfile> {
        let code = match parse_redirect(redirect_url)? {
            RedirectOutcome::Cancel => return Err(SessionError::Cancelled),
            RedirectOutcome::Error(error) => return Err(SessionError::Provider(error)),
            RedirectOutcome::Success { state, .. } if state != pending.state => {
                return Err(SessionError::StateMismatch);
            }
            RedirectOutcome::Success { code, .. } => code,
        };

        let path = match pending.provider {
            Provider::Apple => "auth/apple/token",
            _ => "auth/token",
        };
        let mut form = vec![("code", code.as_str()), ("platform", self.platform.as_str())];
        if let Some(verifier) = pending.code_verifier.as_deref() {
            form.push(("code_verifier", verifier));
        }
        let response = self
            .http
            .post(self.endpoint(path)?)
            .form(&form)
            .send()
            .await?;
        let profile = self.finish_sign_in(response).await?;
        tracing::info!(provider = %pending.provider, user = %profile.id, "signed in");
        Ok(profile)
    }

    /// Native Sign in with Apple with a credential from the device's own flow.
    pub async fn sign_in_with_apple(&self, credential: &AppleNativeRequest) -> Result<UserProfile> {
        if self.platform != Platform::Native {
            return Err(SessionError::Invalid(
                "native Apple sign-in requires the native platform".to_string(),
            ));
        }
        let response = self
            .http
            .post(self.endpoint("auth/apple/apple-native")?)
            .json(credential)
            .send()
            .await?;
        let profile = self.finish_sign_in(response).await?;
        tracing::info!(user = %profile.id, "signed in with Apple");
        Ok(profile)
    }

    /// Local-only session with no credentials and no network.
    pub async fn sign_in_as_guest(&self) -> Result<UserProfile> {
        let profile = UserProfile {
            id: format!("guest-{}", uuid::Uuid::new_v4()),
            provider: Provider::Guest,
            name: GUEST_NAME.to_string(),
            email: None,
            picture: None,
            given_name: None,
            family_name: None,
            email_verified: false,
        };
        self.local
            .save(GUEST_USER_KEY, &serde_json::to_string(&profile)?)
            .await?;
        self.clear_tokens().await;
        self.set_guest(profile.clone());
        Ok(profile)
    }

    async fn finish_sign_in(&self, response: Response) -> Result<UserProfile> {
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Server {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }
        let profile = self.accept_session(response).await?;
        if let Err(err) = self.local.delete(GUEST_USER_KEY).await {
            tracing::warn!(error = %err, "failed to clear guest marker");
        }
        Ok(profile)
    }

    /// Take in a successful token response for this platform.
    async fn accept_session(&self, response: Response) -> Result<UserProfile> {
        match self.platform {
            Platform::Native => {
                let tokens: NativeTokens = response.json().await?;
                if let Some(warning) = &tokens.warning {
                    tracing::warn!(%warning, "server issued a degraded session");
                }
                let claims = decode_access(&tokens.access_token)?;
                let refresh = match tokens.refresh_token {
                    Some(refresh) => Some(refresh),
                    None => self.read_state().refresh_token.clone(),
                };
                self.tokens.save(ACCESS_TOKEN_KEY, &tokens.access_token).await?;
                if let Some(refresh) = &refresh {
                    self.tokens.save(REFRESH_TOKEN_KEY, refresh).await?;
                }
                let profile = claims.profile();
                self.set_authenticated(profile.clone(), Some(tokens.access_token), refresh);
                Ok(profile)
            }
            Platform::Web => {
                let receipt: WebReceipt = response.json().await?;
                if let Some(warning) = &receipt.warning {
                    tracing::warn!(%warning, "server issued a degraded session");
                }
                let profile = self.fetch_session().await?;
                self.set_authenticated(profile.clone(), None, None);
                Ok(profile)
            }
        }
    }

    /// Ask the server who the session cookie belongs to.
    pub async fn fetch_session(&self) -> Result<UserProfile> {
        let response = self.http.get(self.endpoint("auth/session")?).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SessionError::Unauthenticated);
        }
        if !status.is_success() {
            return Err(SessionError::Server {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }
        let info: SessionInfo = response.json().await?;
        Ok(info.claims.profile())
    }

    // ---- sign-out ----

    /// Clear every trace of the session. Local state is reset even when the server
    /// cannot be reached.
    pub async fn sign_out(&self) {
        if self.platform == Platform::Web && self.phase() != Phase::Guest {
            match self.endpoint("auth/logout") {
                Ok(url) => match self.http.post(url).send().await {
                    Ok(response) if !response.status().is_success() => {
                        tracing::debug!(status = %response.status(), "server logout failed");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::debug!(error = %err, "server logout unreachable"),
                },
                Err(err) => tracing::debug!(error = %err, "no logout endpoint"),
            }
        }
        self.clear_tokens().await;
        if let Err(err) = self.local.delete(GUEST_USER_KEY).await {
            tracing::warn!(error = %err, "failed to clear guest marker");
        }
        self.reset(Phase::Unauthenticated);
        tracing::info!("signed out");
    }

    async fn force_logout(&self) {
        self.clear_tokens().await;
        self.reset(Phase::Unauthenticated);
    }

    async fn clear_tokens(&self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(err) = self.tokens.delete(key).await {
                tracing::warn!(key, error = %err, "failed to clear stored token");
            }
        }
    }

    // ---- state helpers ----

    async fn load_guest(&self) -> Result<Option<UserProfile>> {
        let Some(raw) = self.local.get(GUEST_USER_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(profile) => Ok(Some(profile)),
            Err(err) => {
                tracing::warn!(error = %err, "discarding unreadable guest marker");
                self.local.delete(GUEST_USER_KEY).await?;
                Ok(None)
            }
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_authenticated(&self, user: UserProfile, access: Option<String>, refresh: Option<String>) {
        let mut state = self.write_state();
        state.phase = Phase::Authenticated;
        state.user = Some(user);
        state.access_token = access;
        state.refresh_token = refresh;
    }

    fn set_guest(&self, user: UserProfile) {
        let mut state = self.write_state();
        state.phase = Phase::Guest;
        state.user = Some(user);
        state.access_token = None;
        state.refresh_token = None;
    }

    #[cfg(test)]
    pub(crate) fn replace_access_token(&self, token: String) {
        self.write_state().access_token = Some(token);
    }

    fn reset(&self, phase: Phase) {
        *self.write_state() = SessionState {
            phase,
            ..SessionState::default()
        };
    }
}

fn decode_access(token: &str) -> Result<SessionClaims> {
    decode_unverified(token).map_err(|e| SessionError::Invalid(format!("unreadable access token: {e}")))
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    }
}
