//! Evidence history

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::{EvidenceEntry, DEFAULT_HISTORY_LIMIT};
use tracing::warn;

use crate::AppState;

/// Query parameters for the history endpoint
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of entries per list
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

/// Response for the history endpoint
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub snapshots: Vec<EvidenceEntry>,
    pub videos: Vec<EvidenceEntry>,
}

/// GET /api/v1/history
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, (StatusCode, String)> {
    let repository = state.repository.clone();
    let limit = params.limit;

    let listing = tokio::task::spawn_blocking(move || {
        Ok::<_, storage::StorageError>(HistoryResponse {
            snapshots: repository.recent_snapshots(limit)?,
            videos: repository.recent_videos(limit)?,
        })
    })
    .await;

    match listing {
        Ok(Ok(response)) => Ok(Json(response)),
        Ok(Err(e)) => {
            warn!("History listing failed: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}
