use axum::{extract::State, routing::get, Json, Router};

use crate::models::{AppState, HealthResponse};

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ledger = state.orchestrator.ledger();

    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        ledger: ledger.backend().to_string(),
        signer: ledger.signer().map(|address| ethers::utils::to_checksum(&address, None)),
    })
}
