//! Business endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use crm_common::models::{Business, BusinessId, BusinessStatus, CounsellorId, LeadId, NewBusiness};
use serde::Deserialize;

use crate::db::businesses::{self as queries, BusinessFilter};
use crate::{ApiResult, AppState};

/// POST /api/leads/:id/business
pub async fn create_business(
    State(state): State<AppState>,
    Path(lead_id): Path<LeadId>,
    Json(new_business): Json<NewBusiness>,
) -> ApiResult<(StatusCode, Json<Business>)> {
    let business = queries::create_business(&state.db, lead_id, &new_business).await?;
    Ok((StatusCode::CREATED, Json(business)))
}

#[derive(Debug, Deserialize)]
pub struct BusinessListQuery {
    pub counsellor_id: Option<CounsellorId>,
    pub status: Option<String>,
}

/// GET /api/businesses
pub async fn list_businesses(
    State(state): State<AppState>,
    Query(query): Query<BusinessListQuery>,
) -> ApiResult<Json<Vec<Business>>> {
    let filter = BusinessFilter {
        counsellor_id: query.counsellor_id,
        status: query
            .status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<BusinessStatus>)
            .transpose()?,
    };
    Ok(Json(queries::list_businesses(&state.db, &filter).await?))
}

/// GET /api/businesses/:id
pub async fn get_business(
    State(state): State<AppState>,
    Path(business_id): Path<BusinessId>,
) -> ApiResult<Json<Business>> {
    Ok(Json(queries::get_business(&state.db, business_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct BusinessStatusRequest {
    pub status: String,
}

/// POST /api/businesses/:id/status
pub async fn update_business_status(
    State(state): State<AppState>,
    Path(business_id): Path<BusinessId>,
    Json(request): Json<BusinessStatusRequest>,
) -> ApiResult<Json<Business>> {
    let status: BusinessStatus = request.status.parse()?;
    Ok(Json(
        queries::update_business_status(&state.db, business_id, status).await?,
    ))
}
