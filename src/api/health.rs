use axum::{extract::State, Json};
use ethers::types::Address;
use serde::Serialize;
use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub chain_id: u64,
    pub fee_payer: Address,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.clone(),
        chain_id: state.service.chain_id(),
        fee_payer: state.service.fee_payer(),
    })
}
