//! crm-leads library - lead management HTTP service
//!
//! JSON API over the lead store: leads, counsellors, lead sources,
//! assignment batches, transfers, businesses and analytics.

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod pagination;

pub use error::{ApiError, ApiResult};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Held for the duration of every assignment batch
    pub assignment_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            assignment_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{delete, get, post, put};

    let leads = Router::new()
        .route("/api/leads", get(api::list_leads).post(api::create_lead))
        .route("/api/leads/import", post(api::import_leads))
        .route(
            "/api/leads/:id",
            get(api::get_lead).put(api::update_lead).delete(api::delete_lead),
        )
        .route("/api/leads/:id/status", post(api::update_lead_status))
        .route("/api/leads/:id/lost", post(api::mark_lead_lost))
        .route("/api/leads/:id/follow-up", post(api::schedule_follow_up))
        .route("/api/leads/:id/activities", post(api::add_lead_activity))
        .route("/api/leads/:id/business", post(api::create_business));

    let transfers = Router::new()
        .route("/api/leads/:id/transfer", post(api::transfer_lead))
        .route("/api/leads/:id/transfer-requests", post(api::request_transfer))
        .route("/api/transfers/pending", get(api::list_pending_transfers))
        .route("/api/transfers/:id", delete(api::reject_transfer))
        .route("/api/transfers/:id/approve", post(api::approve_transfer));

    let businesses = Router::new()
        .route("/api/businesses", get(api::list_businesses))
        .route("/api/businesses/:id", get(api::get_business))
        .route("/api/businesses/:id/status", post(api::update_business_status));

    let counsellors = Router::new()
        .route(
            "/api/counsellors",
            get(api::list_counsellors).post(api::create_counsellor),
        )
        .route("/api/counsellors/performance", get(api::counsellor_performance))
        .route(
            "/api/counsellors/:id",
            get(api::get_counsellor)
                .put(api::update_counsellor)
                .delete(api::deactivate_counsellor),
        )
        .route("/api/counsellors/:id/analytics", get(api::counsellor_analytics));

    let sources = Router::new()
        .route("/api/sources", get(api::list_sources).post(api::create_source))
        .route(
            "/api/sources/:id",
            put(api::update_source).delete(api::delete_source),
        );

    let assignments = Router::new()
        .route("/api/assignments", post(api::run_assignment))
        .route("/api/assignments/summary", get(api::assignment_summary));

    Router::new()
        .merge(leads)
        .merge(counsellors)
        .merge(transfers)
        .merge(businesses)
        .merge(sources)
        .merge(assignments)
        .route("/api/analytics/leads", get(api::lead_analytics))
        .route("/api/buildinfo", get(api::get_build_info))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
