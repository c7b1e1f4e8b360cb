//! Assignment batches against the lead store
//!
//! A batch runs with the service-wide assignment lock held and inside one
//! `BEGIN IMMEDIATE` transaction. The write lock is taken before the
//! snapshot is read, so other writers wait for the batch instead of
//! invalidating its snapshot:
//!
//! 1. snapshot the unowned leads (creation order) and the active
//!    counsellors together with the leads they already own
//! 2. `crm_common::assignment::plan` decides an owner per lead
//! 3. each decision is written with a conditional UPDATE that only
//!    matches a still-unowned lead
//!
//! A write that fails is logged and counted; the rest of the batch is
//! still applied and committed.

use chrono::{NaiveDateTime, Utc};
use crm_common::assignment::{
    plan, AssignmentReport, AssignmentStrategy, CounsellorProfile, LeadCandidate, OwnedLead,
};
use crm_common::db::WorkloadThresholds;
use crm_common::models::{CounsellorId, LeadId, LeadStatus, SourceId};
use crm_common::Result;
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Which unowned leads a batch considers
#[derive(Debug, Clone, Copy)]
pub enum AssignmentScope<'a> {
    /// Every lead without an owner
    AllUnassigned,
    /// Only these leads, if still unowned (post-import assignment)
    Only(&'a [LeadId]),
}

/// Run one assignment batch
pub async fn assign_unowned_leads(
    pool: &SqlitePool,
    lock: &Mutex<()>,
    strategy: AssignmentStrategy,
    scope: AssignmentScope<'_>,
) -> Result<AssignmentReport> {
    let _batch = lock.lock().await;
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

    let candidates = load_candidates(&mut *tx, scope).await?;
    let profiles = load_profiles(&mut *tx).await?;

    debug!(
        strategy = %strategy,
        candidates = candidates.len(),
        counsellors = profiles.len(),
        "Assignment snapshot loaded"
    );

    let decided = plan(&candidates, &profiles, strategy);
    let mut report = AssignmentReport::for_plan(&decided);

    for decision in &decided.decisions {
        let result = sqlx::query(
            r#"
            UPDATE leads SET assigned_counsellor_id = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND assigned_counsellor_id IS NULL
            "#,
        )
        .bind(decision.counsellor_id)
        .bind(decision.lead_id)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => report.record_assigned(),
            Ok(_) => {
                debug!(lead_id = decision.lead_id, "Lead already owned, skipping");
                report.record_skipped();
            }
            Err(e) => {
                warn!(
                    lead_id = decision.lead_id,
                    counsellor_id = decision.counsellor_id,
                    "Failed to save assignment: {}",
                    e
                );
                report.record_failed();
            }
        }
    }

    tx.commit().await?;

    info!(
        strategy = %strategy,
        assigned = report.assigned,
        skipped = report.skipped,
        failed = report.failed,
        "Assignment batch complete"
    );
    Ok(report)
}

async fn load_candidates(
    conn: &mut SqliteConnection,
    scope: AssignmentScope<'_>,
) -> Result<Vec<LeadCandidate>> {
    let rows = sqlx::query(
        r#"
        SELECT id, industry, source_id FROM leads
        WHERE assigned_counsellor_id IS NULL
        ORDER BY created_at, id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let wanted: Option<HashSet<LeadId>> = match scope {
        AssignmentScope::AllUnassigned => None,
        AssignmentScope::Only(ids) => Some(ids.iter().copied().collect()),
    };

    let mut candidates = Vec::with_capacity(rows.len());
    for row in &rows {
        let lead_id: LeadId = row.try_get("id")?;
        if wanted.as_ref().is_some_and(|ids| !ids.contains(&lead_id)) {
            continue;
        }
        let industry: Option<String> = row.try_get("industry")?;
        let source_id: Option<SourceId> = row.try_get("source_id")?;

        let mut candidate = LeadCandidate::new(lead_id);
        if let Some(industry) = industry {
            candidate = candidate.with_industry(industry);
        }
        if let Some(source_id) = source_id {
            candidate = candidate.with_source(source_id);
        }
        candidates.push(candidate);
    }
    Ok(candidates)
}

/// Active counsellors with the leads they currently own
async fn load_profiles(conn: &mut SqliteConnection) -> Result<Vec<CounsellorProfile>> {
    let ids: Vec<CounsellorId> =
        sqlx::query_scalar("SELECT id FROM counsellors WHERE is_active = 1 ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;

    let mut owned: BTreeMap<CounsellorId, Vec<OwnedLead>> =
        ids.iter().map(|&id| (id, Vec::new())).collect();

    let rows = sqlx::query(
        r#"
        SELECT l.assigned_counsellor_id, l.industry, l.source_id, l.status
        FROM leads l
        JOIN counsellors c ON c.id = l.assigned_counsellor_id
        WHERE c.is_active = 1
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    for row in &rows {
        let owner: CounsellorId = row.try_get("assigned_counsellor_id")?;
        let status: String = row.try_get("status")?;
        let status = status.parse::<LeadStatus>()?;
        let industry: Option<String> = row.try_get("industry")?;
        let source_id: Option<SourceId> = row.try_get("source_id")?;

        let mut lead = OwnedLead::new(status);
        if let Some(industry) = industry {
            lead = lead.with_industry(industry);
        }
        if let Some(source_id) = source_id {
            lead = lead.with_source(source_id);
        }
        if let Some(list) = owned.get_mut(&owner) {
            list.push(lead);
        }
    }

    Ok(owned
        .into_iter()
        .map(|(id, leads)| CounsellorProfile::new(id).with_owned(leads))
        .collect())
}

/// Current workload of one active counsellor
#[derive(Debug, Clone, Serialize)]
pub struct CounsellorWorkload {
    pub counsellor_id: CounsellorId,
    pub name: String,
    pub department: Option<String>,
    pub lead_count: i64,
    /// LOW, MEDIUM or HIGH
    pub workload_status: &'static str,
}

/// Data behind the assignment screen
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentSummary {
    pub unassigned_count: i64,
    pub active_counsellors_count: i64,
    /// Assigned leads divided by active counsellors, one decimal
    pub avg_leads_per_counsellor: f64,
    /// Whole days since the oldest unowned lead was created
    pub oldest_unassigned_days: i64,
    pub counsellor_workload: Vec<CounsellorWorkload>,
}

pub async fn assignment_summary(pool: &SqlitePool) -> Result<AssignmentSummary> {
    let unassigned_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM leads WHERE assigned_counsellor_id IS NULL")
            .fetch_one(pool)
            .await?;
    let assigned_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM leads WHERE assigned_counsellor_id IS NOT NULL")
            .fetch_one(pool)
            .await?;
    let oldest_unassigned: Option<NaiveDateTime> = sqlx::query_scalar(
        "SELECT MIN(created_at) FROM leads WHERE assigned_counsellor_id IS NULL",
    )
    .fetch_one(pool)
    .await?;

    let thresholds = WorkloadThresholds::load(pool).await?;

    let rows = sqlx::query(
        r#"
        SELECT c.id, c.first_name, c.last_name, c.department, COUNT(l.id) AS lead_count
        FROM counsellors c
        LEFT JOIN leads l ON l.assigned_counsellor_id = c.id
        WHERE c.is_active = 1
        GROUP BY c.id
        ORDER BY c.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut counsellor_workload = Vec::with_capacity(rows.len());
    for row in &rows {
        let first_name: String = row.try_get("first_name")?;
        let last_name: String = row.try_get("last_name")?;
        let lead_count: i64 = row.try_get("lead_count")?;
        counsellor_workload.push(CounsellorWorkload {
            counsellor_id: row.try_get("id")?,
            name: format!("{} {}", first_name, last_name).trim().to_string(),
            department: row.try_get("department")?,
            lead_count,
            workload_status: thresholds.band(lead_count),
        });
    }

    let active_counsellors_count = counsellor_workload.len() as i64;
    let avg_leads_per_counsellor = if active_counsellors_count > 0 {
        (assigned_count as f64 / active_counsellors_count as f64 * 10.0).round() / 10.0
    } else {
        0.0
    };
    let oldest_unassigned_days = oldest_unassigned
        .map(|created| (Utc::now().naive_utc() - created).num_days().max(0))
        .unwrap_or(0);

    Ok(AssignmentSummary {
        unassigned_count,
        active_counsellors_count,
        avg_leads_per_counsellor,
        oldest_unassigned_days,
        counsellor_workload,
    })
}
