//! HTTP API handlers for crm-leads

pub mod analytics;
pub mod assignments;
pub mod businesses;
pub mod buildinfo;
pub mod counsellors;
pub mod health;
pub mod leads;
pub mod sources;
pub mod transfers;

pub use analytics::{counsellor_analytics, lead_analytics};
pub use assignments::{assignment_summary, run_assignment};
pub use businesses::{create_business, get_business, list_businesses, update_business_status};
pub use buildinfo::{get_build_info, BuildInfo};
pub use counsellors::{
    counsellor_performance, create_counsellor, deactivate_counsellor, get_counsellor,
    list_counsellors, update_counsellor,
};
pub use health::health_routes;
pub use leads::{
    add_lead_activity, create_lead, delete_lead, get_lead, import_leads, list_leads,
    mark_lead_lost, schedule_follow_up, update_lead, update_lead_status,
};
pub use sources::{create_source, delete_source, list_sources, update_source};
pub use transfers::{
    approve_transfer, list_pending_transfers, reject_transfer, request_transfer, transfer_lead,
};
