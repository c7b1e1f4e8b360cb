//! Analytics endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use crm_common::models::CounsellorId;

use crate::db::analytics::{self as queries, CounsellorAnalytics, LeadAnalytics};
use crate::{ApiResult, AppState};

/// GET /api/analytics/leads
pub async fn lead_analytics(State(state): State<AppState>) -> ApiResult<Json<LeadAnalytics>> {
    Ok(Json(queries::lead_analytics(&state.db).await?))
}

/// GET /api/counsellors/:id/analytics
pub async fn counsellor_analytics(
    State(state): State<AppState>,
    Path(counsellor_id): Path<CounsellorId>,
) -> ApiResult<Json<CounsellorAnalytics>> {
    Ok(Json(
        queries::counsellor_analytics(&state.db, counsellor_id).await?,
    ))
}
