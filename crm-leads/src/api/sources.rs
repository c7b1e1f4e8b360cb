//! Lead source endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use crm_common::models::{LeadSource, SourceId};

use crate::db::sources::{self as queries, SourceInput};
use crate::{ApiResult, AppState};

pub async fn list_sources(State(state): State<AppState>) -> ApiResult<Json<Vec<LeadSource>>> {
    Ok(Json(queries::list_sources(&state.db).await?))
}

pub async fn create_source(
    State(state): State<AppState>,
    Json(input): Json<SourceInput>,
) -> ApiResult<(StatusCode, Json<LeadSource>)> {
    let source = queries::insert_source(&state.db, &input).await?;
    Ok((StatusCode::CREATED, Json(source)))
}

pub async fn update_source(
    State(state): State<AppState>,
    Path(source_id): Path<SourceId>,
    Json(input): Json<SourceInput>,
) -> ApiResult<Json<LeadSource>> {
    Ok(Json(queries::update_source(&state.db, source_id, &input).await?))
}

pub async fn delete_source(
    State(state): State<AppState>,
    Path(source_id): Path<SourceId>,
) -> ApiResult<StatusCode> {
    queries::delete_source(&state.db, source_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
