//! HTTP endpoints of the wheelhouse auth server: provider redirects, code exchange,
//! refresh rotation, session introspection and logout.

mod error;
mod extract;
mod issue;
mod rotation;
mod routes;
mod state;

use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use wheelhouse_api::WheelhouseError;
use wheelhouse_core::ServerConfig;

pub use error::{ApiError, describe_oauth_error};
pub use extract::{AuthUser, bearer_token, request_cookie};
pub use issue::IssuedSession;
pub use rotation::RefreshLedger;
pub use routes::session::FALLBACK_WARNING;
pub use state::AppState;

/// Every route, without transport layers.
pub fn router(state: AppState) -> Router {
    let auth = Router::new()
        .route("/authorize", get(routes::google::authorize))
        .route("/callback", get(routes::google::callback))
        .route("/token", post(routes::google::token))
        .route("/apple/authorize", get(routes::apple::authorize))
        .route("/apple/callback", post(routes::apple::callback))
        .route("/apple/token", post(routes::apple::token))
        .route("/apple/apple-native", post(routes::apple::native))
        .route("/refresh", post(routes::session::refresh))
        .route("/session", get(routes::session::session))
        .route("/logout", post(routes::session::logout));

    Router::new()
        .nest("/auth", auth)
        .route("/api/protected/data", get(routes::protected::data))
        .with_state(state)
}

/// Credentialed CORS for the configured web origin only.
fn cors(config: &ServerConfig) -> Result<CorsLayer, WheelhouseError> {
    let origin = HeaderValue::from_str(config.web_origin.trim_end_matches('/'))
        .map_err(|e| WheelhouseError::Configuration(format!("invalid web_origin: {e}")))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]))
}

/// Bind `config.bind_addr` and serve until Ctrl-C.
pub async fn serve(config: ServerConfig) -> Result<(), WheelhouseError> {
    let bind_addr = config.bind_addr.clone();
    let cors = cors(&config)?;
    let state = AppState::from_config(config)?;
    let app = router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| WheelhouseError::Connection(format!("failed to bind {bind_addr}: {e}")))?;
    tracing::info!(addr = %bind_addr, "wheelhouse server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
        .map_err(|e| WheelhouseError::Internal(format!("server error: {e}")))
}
