//! Lead endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use crm_common::models::{
    CounsellorId, Lead, LeadActivity, LeadId, LeadStatus, LeadTransfer, NewLead,
};
use serde::{Deserialize, Serialize};

use crate::db::import::{ImportReport, ImportRequest};
use crate::db::leads::{self as queries, LeadFilter, NewActivity};
use crate::db::transfers::list_transfers;
use crate::pagination::{calculate_pagination, PAGE_SIZE};
use crate::{ApiResult, AppState};

/// Query parameters for the lead list
#[derive(Debug, Deserialize)]
pub struct LeadListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    pub status: Option<String>,
    pub counsellor_id: Option<CounsellorId>,
    #[serde(default)]
    pub unassigned: bool,
    /// Only leads whose scheduled follow-up has come due
    #[serde(default)]
    pub follow_up_due: bool,
}

fn default_page() -> i64 {
    1
}

#[derive(Debug, Serialize)]
pub struct LeadListResponse {
    pub total_results: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub leads: Vec<Lead>,
}

/// GET /api/leads
pub async fn list_leads(
    State(state): State<AppState>,
    Query(query): Query<LeadListQuery>,
) -> ApiResult<Json<LeadListResponse>> {
    let filter = LeadFilter {
        status: query
            .status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<LeadStatus>)
            .transpose()?,
        counsellor_id: query.counsellor_id,
        unassigned: query.unassigned,
        follow_up_due: query.follow_up_due,
    };

    let total_results = queries::count_leads(&state.db, &filter).await?;
    let pagination = calculate_pagination(total_results, query.page);
    let leads = queries::list_leads(&state.db, &filter, PAGE_SIZE, pagination.offset).await?;

    Ok(Json(LeadListResponse {
        total_results,
        page: pagination.page,
        page_size: PAGE_SIZE,
        total_pages: pagination.total_pages,
        leads,
    }))
}

/// POST /api/leads
pub async fn create_lead(
    State(state): State<AppState>,
    Json(new_lead): Json<NewLead>,
) -> ApiResult<(StatusCode, Json<Lead>)> {
    let lead = queries::insert_lead(&state.db, &new_lead).await?;
    Ok((StatusCode::CREATED, Json(lead)))
}

#[derive(Debug, Serialize)]
pub struct LeadDetail {
    #[serde(flatten)]
    pub lead: Lead,
    pub activities: Vec<LeadActivity>,
    pub transfers: Vec<LeadTransfer>,
}

/// GET /api/leads/:id
pub async fn get_lead(
    State(state): State<AppState>,
    Path(lead_id): Path<LeadId>,
) -> ApiResult<Json<LeadDetail>> {
    let lead = queries::get_lead(&state.db, lead_id).await?;
    let activities = queries::list_activities(&state.db, lead_id).await?;
    let transfers = list_transfers(&state.db, lead_id).await?;
    Ok(Json(LeadDetail {
        lead,
        activities,
        transfers,
    }))
}

/// PUT /api/leads/:id
pub async fn update_lead(
    State(state): State<AppState>,
    Path(lead_id): Path<LeadId>,
    Json(update): Json<NewLead>,
) -> ApiResult<Json<Lead>> {
    Ok(Json(queries::update_lead(&state.db, lead_id, &update).await?))
}

/// DELETE /api/leads/:id
pub async fn delete_lead(
    State(state): State<AppState>,
    Path(lead_id): Path<LeadId>,
) -> ApiResult<StatusCode> {
    queries::delete_lead(&state.db, lead_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

/// POST /api/leads/:id/status
pub async fn update_lead_status(
    State(state): State<AppState>,
    Path(lead_id): Path<LeadId>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Json<Lead>> {
    let status: LeadStatus = request.status.parse()?;
    Ok(Json(queries::update_status(&state.db, lead_id, status).await?))
}

#[derive(Debug, Deserialize)]
pub struct LostRequest {
    #[serde(default)]
    pub reason: String,
}

/// POST /api/leads/:id/lost
pub async fn mark_lead_lost(
    State(state): State<AppState>,
    Path(lead_id): Path<LeadId>,
    Json(request): Json<LostRequest>,
) -> ApiResult<Json<Lead>> {
    Ok(Json(queries::mark_lost(&state.db, lead_id, &request.reason).await?))
}

#[derive(Debug, Deserialize)]
pub struct FollowUpRequest {
    /// RFC 3339 timestamp; `null` or absent clears the follow-up
    pub follow_up_date: Option<DateTime<Utc>>,
}

/// POST /api/leads/:id/follow-up
pub async fn schedule_follow_up(
    State(state): State<AppState>,
    Path(lead_id): Path<LeadId>,
    Json(request): Json<FollowUpRequest>,
) -> ApiResult<Json<Lead>> {
    let at = request.follow_up_date.map(|at| at.naive_utc());
    Ok(Json(queries::schedule_follow_up(&state.db, lead_id, at).await?))
}

/// POST /api/leads/:id/activities
pub async fn add_lead_activity(
    State(state): State<AppState>,
    Path(lead_id): Path<LeadId>,
    Json(activity): Json<NewActivity>,
) -> ApiResult<(StatusCode, Json<LeadActivity>)> {
    let logged = queries::add_activity(&state.db, lead_id, &activity).await?;
    Ok((StatusCode::CREATED, Json(logged)))
}

/// POST /api/leads/import
pub async fn import_leads(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> ApiResult<Json<ImportReport>> {
    let report =
        crate::db::import::import_leads(&state.db, &state.assignment_lock, request).await?;
    Ok(Json(report))
}
