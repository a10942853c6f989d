use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::Result,
    models::{ApiResponse, DelegateBody, DelegateResponse, DelegationRequest, DelegationStatus, PrepareResponse},
};

use super::AppState;

/// POST /api/v1/fee-delegation/prepare
pub async fn prepare(
    State(state): State<AppState>,
    Json(req): Json<DelegationRequest>,
) -> Result<Json<ApiResponse<PrepareResponse>>> {
    let prepared = state.service.prepare_for_signing(&req).await?;
    Ok(Json(ApiResponse::success(prepared)))
}

/// POST /api/v1/fee-delegation/delegate
///
/// Answers 202 when the transaction was broadcast but no receipt arrived in
/// time.
pub async fn delegate(
    State(state): State<AppState>,
    Json(body): Json<DelegateBody>,
) -> Result<(StatusCode, Json<ApiResponse<DelegateResponse>>)> {
    let response = state.service.delegate(&body.request, body.sender).await?;
    let status = match response.status {
        DelegationStatus::Pending => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(ApiResponse::success(response))))
}
