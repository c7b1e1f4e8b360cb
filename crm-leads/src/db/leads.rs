//! Lead queries: CRUD, status changes, follow-ups and activities

use chrono::NaiveDateTime;
use crm_common::ids::generate_lead_code;
use crm_common::models::{
    ActivityType, CounsellorId, Lead, LeadActivity, LeadId, LeadStatus, NewLead,
};
use crm_common::{Error, Result};
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};
use tracing::{debug, info, warn};

use super::counsellors::require_active_counsellor;
use super::{activity_from_row, invalid_on_foreign_key, lead_from_row, LEAD_COLUMNS};

/// Attempts at finding an unused lead code before giving up
const LEAD_CODE_ATTEMPTS: usize = 5;

/// Filters for the lead list
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub counsellor_id: Option<CounsellorId>,
    pub unassigned: bool,
    /// Only leads whose scheduled follow-up is due
    pub follow_up_due: bool,
}

impl LeadFilter {
    fn push_where<'a>(&self, qb: &mut QueryBuilder<'a, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        if let Some(status) = self.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(counsellor_id) = self.counsellor_id {
            qb.push(" AND assigned_counsellor_id = ").push_bind(counsellor_id);
        }
        if self.unassigned {
            qb.push(" AND assigned_counsellor_id IS NULL");
        }
        if self.follow_up_due {
            qb.push(" AND next_follow_up IS NOT NULL AND next_follow_up <= CURRENT_TIMESTAMP");
        }
    }
}

pub async fn count_leads(pool: &SqlitePool, filter: &LeadFilter) -> Result<i64> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM leads");
    filter.push_where(&mut qb);
    let count = qb.build_query_scalar::<i64>().fetch_one(pool).await?;
    Ok(count)
}

/// One page of leads, newest first
pub async fn list_leads(
    pool: &SqlitePool,
    filter: &LeadFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<Lead>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM leads", LEAD_COLUMNS));
    filter.push_where(&mut qb);
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(lead_from_row).collect()
}

pub async fn get_lead<'e, E>(executor: E, lead_id: LeadId) -> Result<Lead>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(&format!("SELECT {} FROM leads WHERE id = ?", LEAD_COLUMNS))
        .bind(lead_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Lead {} not found", lead_id)))?;
    lead_from_row(&row)
}

/// Insert a lead with a freshly generated lead code
pub async fn insert_lead(pool: &SqlitePool, new_lead: &NewLead) -> Result<Lead> {
    new_lead.validate()?;
    if let Some(counsellor_id) = new_lead.assigned_counsellor_id {
        require_active_counsellor(pool, counsellor_id).await?;
    }

    for attempt in 1..=LEAD_CODE_ATTEMPTS {
        let lead_code = generate_lead_code();
        let result = sqlx::query(
            r#"
            INSERT INTO leads (
                lead_code, first_name, last_name, email, phone, company, position,
                industry, source_id, priority, assigned_counsellor_id, expected_value,
                notes, city, country
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&lead_code)
        .bind(new_lead.first_name.trim())
        .bind(new_lead.last_name.trim())
        .bind(non_blank(&new_lead.email))
        .bind(non_blank(&new_lead.phone))
        .bind(non_blank(&new_lead.company))
        .bind(non_blank(&new_lead.position))
        .bind(non_blank(&new_lead.industry))
        .bind(new_lead.source_id)
        .bind(new_lead.priority.unwrap_or_default().as_str())
        .bind(new_lead.assigned_counsellor_id)
        .bind(new_lead.expected_value)
        .bind(&new_lead.notes)
        .bind(non_blank(&new_lead.city))
        .bind(non_blank(&new_lead.country))
        .execute(pool)
        .await;

        match result {
            Ok(done) => {
                let lead_id = done.last_insert_rowid();
                debug!(lead_id, lead_code = %lead_code, "Lead created");
                return get_lead(pool, lead_id).await;
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.is_unique_violation() && db_err.message().contains("lead_code") =>
            {
                warn!(attempt, lead_code = %lead_code, "Lead code collision, regenerating");
            }
            Err(e) => {
                return Err(invalid_on_foreign_key(e, || {
                    "Referenced lead source or counsellor does not exist".to_string()
                }))
            }
        }
    }

    Err(Error::Internal("Could not generate a unique lead code".to_string()))
}

/// Replace the editable fields of a lead
///
/// Status is changed through [`update_status`], [`mark_lost`] and
/// [`super::transfers::transfer_lead`] only.
pub async fn update_lead(pool: &SqlitePool, lead_id: LeadId, update: &NewLead) -> Result<Lead> {
    update.validate()?;
    let current = get_lead(pool, lead_id).await?;
    if let Some(counsellor_id) = update.assigned_counsellor_id {
        if current.assigned_counsellor_id != Some(counsellor_id) {
            require_active_counsellor(pool, counsellor_id).await?;
        }
    }

    sqlx::query(
        r#"
        UPDATE leads SET
            first_name = ?, last_name = ?, email = ?, phone = ?, company = ?,
            position = ?, industry = ?, source_id = ?, priority = ?,
            assigned_counsellor_id = ?, expected_value = ?, notes = ?, city = ?,
            country = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(update.first_name.trim())
    .bind(update.last_name.trim())
    .bind(non_blank(&update.email))
    .bind(non_blank(&update.phone))
    .bind(non_blank(&update.company))
    .bind(non_blank(&update.position))
    .bind(non_blank(&update.industry))
    .bind(update.source_id)
    .bind(update.priority.unwrap_or(current.priority).as_str())
    .bind(update.assigned_counsellor_id)
    .bind(update.expected_value)
    .bind(&update.notes)
    .bind(non_blank(&update.city))
    .bind(non_blank(&update.country))
    .bind(lead_id)
    .execute(pool)
    .await
    .map_err(|e| invalid_on_foreign_key(e, || "Referenced lead source does not exist".to_string()))?;

    get_lead(pool, lead_id).await
}

pub async fn delete_lead(pool: &SqlitePool, lead_id: LeadId) -> Result<()> {
    let result = sqlx::query("DELETE FROM leads WHERE id = ?")
        .bind(lead_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Lead {} not found", lead_id)));
    }
    info!(lead_id, "Lead deleted");
    Ok(())
}

pub async fn update_status(pool: &SqlitePool, lead_id: LeadId, status: LeadStatus) -> Result<Lead> {
    let result = sqlx::query(
        "UPDATE leads SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(lead_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Lead {} not found", lead_id)));
    }
    debug!(lead_id, status = %status, "Lead status updated");
    get_lead(pool, lead_id).await
}

/// Close a lead as lost, appending the reason to its notes
pub async fn mark_lost(pool: &SqlitePool, lead_id: LeadId, reason: &str) -> Result<Lead> {
    let lead = get_lead(pool, lead_id).await?;
    let notes = format!("{}\n\nLost Reason: {}", lead.notes, reason.trim());

    sqlx::query(
        "UPDATE leads SET status = ?, notes = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(LeadStatus::ClosedLost.as_str())
    .bind(notes)
    .bind(lead_id)
    .execute(pool)
    .await?;

    get_lead(pool, lead_id).await
}

/// Set, or clear with `None`, the next scheduled follow-up (UTC)
pub async fn schedule_follow_up(
    pool: &SqlitePool,
    lead_id: LeadId,
    at: Option<NaiveDateTime>,
) -> Result<Lead> {
    let result = sqlx::query(
        "UPDATE leads SET next_follow_up = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(at)
    .bind(lead_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Lead {} not found", lead_id)));
    }
    debug!(lead_id, next_follow_up = ?at, "Follow-up scheduled");
    get_lead(pool, lead_id).await
}

/// Activity as submitted by a client
#[derive(Debug, Clone, Deserialize)]
pub struct NewActivity {
    pub activity_type: ActivityType,
    pub subject: String,
    pub outcome: Option<String>,
    /// Defaults to the lead's current owner
    pub counsellor_id: Option<CounsellorId>,
}

/// Log an activity and stamp the lead's last contact date
pub async fn add_activity(
    pool: &SqlitePool,
    lead_id: LeadId,
    activity: &NewActivity,
) -> Result<LeadActivity> {
    if activity.subject.trim().is_empty() {
        return Err(Error::InvalidInput("subject is required".to_string()));
    }
    let lead = get_lead(pool, lead_id).await?;
    let counsellor_id = activity.counsellor_id.or(lead.assigned_counsellor_id);

    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

    let activity_id = sqlx::query(
        r#"
        INSERT INTO lead_activities (lead_id, counsellor_id, activity_type, subject, outcome)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(lead_id)
    .bind(counsellor_id)
    .bind(activity.activity_type.as_str())
    .bind(activity.subject.trim())
    .bind(non_blank(&activity.outcome))
    .execute(&mut *tx)
    .await
    .map_err(|e| invalid_on_foreign_key(e, || "Referenced counsellor does not exist".to_string()))?
    .last_insert_rowid();

    sqlx::query(
        "UPDATE leads SET last_contact_date = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(lead_id)
    .execute(&mut *tx)
    .await?;

    let row = sqlx::query("SELECT * FROM lead_activities WHERE id = ?")
        .bind(activity_id)
        .fetch_one(&mut *tx)
        .await?;
    let logged = activity_from_row(&row)?;

    tx.commit().await?;
    Ok(logged)
}

/// Activities for a lead, most recent first
pub async fn list_activities(pool: &SqlitePool, lead_id: LeadId) -> Result<Vec<LeadActivity>> {
    let rows = sqlx::query(
        "SELECT * FROM lead_activities WHERE lead_id = ? ORDER BY completed_at DESC, id DESC",
    )
    .bind(lead_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(activity_from_row).collect()
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
