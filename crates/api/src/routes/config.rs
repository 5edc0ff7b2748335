//! Configuration routes
//!
//! Writes take effect on the pipeline's next cycle. Nothing reaches disk
//! until `persist` is called.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::AppState;

/// Response for a config update
#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub updated: usize,
}

/// Response for a persist request
#[derive(Debug, Serialize)]
pub struct PersistResponse {
    pub persisted: bool,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /api/v1/config
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(Value::Object(state.config.snapshot()))
}

/// POST /api/v1/config with a JSON object of `key: value` updates
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(updates): Json<Map<String, Value>>,
) -> Json<UpdateResponse> {
    let keys: Vec<&str> = updates.keys().map(String::as_str).collect();
    info!("Config update: {}", keys.join(", "));
    let updated = state.config.set_many(updates);
    Json(UpdateResponse { updated })
}

/// POST /api/v1/config/persist
pub async fn persist_config(State(state): State<Arc<AppState>>) -> (StatusCode, Json<PersistResponse>) {
    let path = state.config.path().display().to_string();
    let store = Arc::clone(&state.config);

    let result = tokio::task::spawn_blocking(move || store.persist())
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r.map_err(|e| e.to_string()));

    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(PersistResponse {
                persisted: true,
                path,
                error: None,
            }),
        ),
        Err(e) => {
            warn!("Config persist failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PersistResponse {
                    persisted: false,
                    path,
                    error: Some(e),
                }),
            )
        }
    }
}
