use axum::Json;
use axum::extract::State;

use crate::admission::AdmissionStats;
use crate::server::AppState;

/// Live admission counters.
pub async fn concurrency(State(state): State<AppState>) -> Json<AdmissionStats> {
    Json(state.admission.stats())
}
