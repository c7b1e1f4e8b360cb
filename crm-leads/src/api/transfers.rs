//! Transfer endpoints: direct transfers and the request/approve flow

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use crm_common::models::{CounsellorId, LeadId, LeadTransfer};
use serde::Deserialize;

use crate::db::transfers as queries;
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub to_counsellor_id: CounsellorId,
    #[serde(default)]
    pub reason: String,
}

/// POST /api/leads/:id/transfer
pub async fn transfer_lead(
    State(state): State<AppState>,
    Path(lead_id): Path<LeadId>,
    Json(request): Json<TransferRequest>,
) -> ApiResult<(StatusCode, Json<LeadTransfer>)> {
    let transfer =
        queries::transfer_lead(&state.db, lead_id, request.to_counsellor_id, &request.reason)
            .await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

/// POST /api/leads/:id/transfer-requests
///
/// Stores a pending request; the lead stays with its owner until approval.
pub async fn request_transfer(
    State(state): State<AppState>,
    Path(lead_id): Path<LeadId>,
    Json(request): Json<TransferRequest>,
) -> ApiResult<(StatusCode, Json<LeadTransfer>)> {
    let transfer =
        queries::request_transfer(&state.db, lead_id, request.to_counsellor_id, &request.reason)
            .await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

/// GET /api/transfers/pending
pub async fn list_pending_transfers(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<LeadTransfer>>> {
    Ok(Json(queries::list_pending_transfers(&state.db).await?))
}

/// POST /api/transfers/:id/approve
pub async fn approve_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<i64>,
) -> ApiResult<Json<LeadTransfer>> {
    Ok(Json(queries::approve_transfer(&state.db, transfer_id).await?))
}

/// DELETE /api/transfers/:id
pub async fn reject_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<i64>,
) -> ApiResult<StatusCode> {
    queries::reject_transfer(&state.db, transfer_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
