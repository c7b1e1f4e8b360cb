//! Counsellor endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use crm_common::models::{Counsellor, CounsellorId};
use serde::Deserialize;

use crate::db::counsellors::{self as queries, CounsellorPerformance, CounsellorUpdate, NewCounsellor};
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CounsellorListQuery {
    #[serde(default)]
    pub active: bool,
}

/// GET /api/counsellors
///
/// `?active=true` restricts the list to counsellors eligible for assignment.
pub async fn list_counsellors(
    State(state): State<AppState>,
    Query(query): Query<CounsellorListQuery>,
) -> ApiResult<Json<Vec<Counsellor>>> {
    Ok(Json(queries::list_counsellors(&state.db, query.active).await?))
}

/// POST /api/counsellors
pub async fn create_counsellor(
    State(state): State<AppState>,
    Json(new): Json<NewCounsellor>,
) -> ApiResult<(StatusCode, Json<Counsellor>)> {
    let counsellor = queries::insert_counsellor(&state.db, &new).await?;
    Ok((StatusCode::CREATED, Json(counsellor)))
}

pub async fn get_counsellor(
    State(state): State<AppState>,
    Path(counsellor_id): Path<CounsellorId>,
) -> ApiResult<Json<Counsellor>> {
    Ok(Json(queries::get_counsellor(&state.db, counsellor_id).await?))
}

pub async fn update_counsellor(
    State(state): State<AppState>,
    Path(counsellor_id): Path<CounsellorId>,
    Json(update): Json<CounsellorUpdate>,
) -> ApiResult<Json<Counsellor>> {
    Ok(Json(
        queries::update_counsellor(&state.db, counsellor_id, &update).await?,
    ))
}

/// DELETE /api/counsellors/:id
///
/// Deactivates; the counsellor keeps its leads and history.
pub async fn deactivate_counsellor(
    State(state): State<AppState>,
    Path(counsellor_id): Path<CounsellorId>,
) -> ApiResult<Json<Counsellor>> {
    Ok(Json(
        queries::deactivate_counsellor(&state.db, counsellor_id).await?,
    ))
}

/// GET /api/counsellors/performance
pub async fn counsellor_performance(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<CounsellorPerformance>>> {
    Ok(Json(queries::counsellor_performance(&state.db).await?))
}
