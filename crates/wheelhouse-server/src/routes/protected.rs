use axum::Json;
use serde_json::{Value, json};

use crate::extract::AuthUser;

/// `GET /api/protected/data`: sample resource behind session auth.
pub async fn data(AuthUser(claims): AuthUser) -> Json<Value> {
    Json(json!({
        "data": {
            "message": "Protected data accessed successfully",
            "timestamp": wheelhouse_auth::now_unix(),
        },
        "user": claims.profile(),
    }))
}
