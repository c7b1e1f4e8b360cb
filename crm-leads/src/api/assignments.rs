//! Assignment endpoints

use axum::{body::Bytes, extract::State, Json};
use crm_common::assignment::{AssignmentReport, AssignmentStrategy};
use crm_common::db::get_setting_raw;
use crm_common::db::settings::DEFAULT_ASSIGNMENT_STRATEGY;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::assignment::{self as queries, AssignmentScope, AssignmentSummary};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct AssignmentRequest {
    /// Strategy name; when absent the `default_assignment_strategy`
    /// setting is used. Unknown names fall back to round robin.
    pub strategy: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    #[serde(flatten)]
    pub report: AssignmentReport,
    pub message: String,
}

impl AssignmentRequest {
    /// Decode a request body; an empty body asks for the defaults
    pub fn from_body(body: &[u8]) -> ApiResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("Malformed assignment request: {}", e)))
    }
}

/// POST /api/assignments
///
/// Distributes every unowned lead over the active counsellors.
pub async fn run_assignment(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<AssignmentResponse>> {
    let request = AssignmentRequest::from_body(&body)?;
    let name = match request.strategy {
        Some(name) => name,
        None => get_setting_raw(&state.db, DEFAULT_ASSIGNMENT_STRATEGY)
            .await?
            .unwrap_or_default(),
    };
    let strategy = AssignmentStrategy::from_name_lenient(&name);

    info!(strategy = %strategy, "Assignment requested");
    let report = queries::assign_unowned_leads(
        &state.db,
        &state.assignment_lock,
        strategy,
        AssignmentScope::AllUnassigned,
    )
    .await?;

    let message = report.message();
    Ok(Json(AssignmentResponse { report, message }))
}

/// GET /api/assignments/summary
pub async fn assignment_summary(
    State(state): State<AppState>,
) -> ApiResult<Json<AssignmentSummary>> {
    Ok(Json(queries::assignment_summary(&state.db).await?))
}
