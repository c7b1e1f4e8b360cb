//! Bulk lead import with optional post-import assignment

use crm_common::assignment::{AssignmentOutcome, AssignmentReport, AssignmentStrategy};
use crm_common::db::settings::IMPORT_MAX_ROWS;
use crm_common::db::get_setting;
use crm_common::models::{CounsellorId, LeadId, NewLead, SourceId};
use crm_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::assignment::{assign_unowned_leads, AssignmentScope};
use super::counsellors::require_active_counsellor;
use super::leads::insert_lead;
use super::sources::get_source;

const DEFAULT_MAX_ROWS: usize = 5000;

/// Body of `POST /api/leads/import`
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRequest {
    pub source_id: SourceId,
    /// Owner for every imported row; disables auto-assignment
    pub assigned_counsellor_id: Option<CounsellorId>,
    #[serde(default)]
    pub auto_assign: bool,
    /// Strategy name; unknown names fall back to round robin
    pub assignment_method: Option<String>,
    /// One JSON object per lead. Rows are decoded individually so a bad
    /// row only counts as an error.
    pub rows: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub errors: usize,
    pub lead_ids: Vec<LeadId>,
    pub assignment: Option<AssignmentReport>,
    pub message: String,
}

pub async fn import_leads(
    pool: &SqlitePool,
    lock: &Mutex<()>,
    request: ImportRequest,
) -> Result<ImportReport> {
    let max_rows: usize = get_setting(pool, IMPORT_MAX_ROWS, DEFAULT_MAX_ROWS).await?;
    if request.rows.len() > max_rows {
        return Err(Error::InvalidInput(format!(
            "Import has {} rows; at most {} are allowed",
            request.rows.len(),
            max_rows
        )));
    }

    let source = match get_source(pool, request.source_id).await {
        Ok(source) => source,
        Err(Error::NotFound(msg)) => return Err(Error::InvalidInput(msg)),
        Err(e) => return Err(e),
    };
    if let Some(counsellor_id) = request.assigned_counsellor_id {
        require_active_counsellor(pool, counsellor_id).await?;
    }

    let mut lead_ids = Vec::with_capacity(request.rows.len());
    let mut errors = 0;

    for (index, row) in request.rows.into_iter().enumerate() {
        let mut lead: NewLead = match serde_json::from_value(row) {
            Ok(lead) => lead,
            Err(e) => {
                debug!(row = index + 1, "Skipping undecodable import row: {}", e);
                errors += 1;
                continue;
            }
        };
        lead.source_id = Some(source.id);
        lead.assigned_counsellor_id = request.assigned_counsellor_id;

        match insert_lead(pool, &lead).await {
            Ok(created) => lead_ids.push(created.id),
            Err(e) => {
                debug!(row = index + 1, "Skipping import row: {}", e);
                errors += 1;
            }
        }
    }

    info!(
        source = %source.name,
        imported = lead_ids.len(),
        errors,
        "Lead import finished"
    );

    let imported = lead_ids.len();
    let wants_assignment =
        request.auto_assign && request.assigned_counsellor_id.is_none() && imported > 0;

    if !wants_assignment {
        return Ok(ImportReport {
            imported,
            errors,
            lead_ids,
            assignment: None,
            message: format!(
                "Successfully imported {} leads. {} errors occurred.",
                imported, errors
            ),
        });
    }

    let strategy = request
        .assignment_method
        .as_deref()
        .map(AssignmentStrategy::from_name_lenient)
        .unwrap_or_default();

    let (assignment, message) = match assign_unowned_leads(
        pool,
        lock,
        strategy,
        AssignmentScope::Only(&lead_ids),
    )
    .await
    {
        Ok(report) if report.outcome == AssignmentOutcome::NoEligibleCounsellors => {
            let message = format!(
                "Successfully imported {} leads but no active counsellors found for auto-assignment. {} errors occurred.",
                imported, errors
            );
            (Some(report), message)
        }
        Ok(report) => {
            let message = format!(
                "Successfully imported {} leads and auto-assigned {} of them using {} method. {} errors occurred.",
                imported,
                report.assigned,
                strategy.label(),
                errors
            );
            (Some(report), message)
        }
        Err(e) => {
            warn!("Auto-assignment after import failed: {}", e);
            let message = format!(
                "Successfully imported {} leads but auto-assignment failed: {}. {} errors occurred.",
                imported, e, errors
            );
            (None, message)
        }
    };

    Ok(ImportReport {
        imported,
        errors,
        lead_ids,
        assignment,
        message,
    })
}
