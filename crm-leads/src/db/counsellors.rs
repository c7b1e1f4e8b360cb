//! Counsellor queries and per-counsellor statistics

use crm_common::assignment::ConversionRate;
use crm_common::models::{Counsellor, CounsellorId, LeadStatus};
use crm_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteExecutor, SqlitePool};
use tracing::info;

use super::{conflict_on_unique, counsellor_from_row, COUNSELLOR_COLUMNS};

/// Fields accepted when creating a counsellor
#[derive(Debug, Clone, Deserialize)]
pub struct NewCounsellor {
    pub employee_id: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    pub department: Option<String>,
}

impl NewCounsellor {
    fn validate(&self) -> Result<()> {
        if self.employee_id.trim().is_empty() {
            return Err(Error::InvalidInput("employee_id is required".to_string()));
        }
        if self.first_name.trim().is_empty() {
            return Err(Error::InvalidInput("first_name is required".to_string()));
        }
        if !self.email.contains('@') {
            return Err(Error::InvalidInput(format!("Invalid email: {}", self.email)));
        }
        Ok(())
    }
}

/// Partial update; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CounsellorUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn list_counsellors(pool: &SqlitePool, active_only: bool) -> Result<Vec<Counsellor>> {
    let sql = if active_only {
        format!("SELECT {} FROM counsellors WHERE is_active = 1 ORDER BY id", COUNSELLOR_COLUMNS)
    } else {
        format!("SELECT {} FROM counsellors ORDER BY id", COUNSELLOR_COLUMNS)
    };
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(counsellor_from_row).collect()
}

pub async fn get_counsellor<'e, E>(executor: E, counsellor_id: CounsellorId) -> Result<Counsellor>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(&format!(
        "SELECT {} FROM counsellors WHERE id = ?",
        COUNSELLOR_COLUMNS
    ))
    .bind(counsellor_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Counsellor {} not found", counsellor_id)))?;
    counsellor_from_row(&row)
}

/// Look up a counsellor referenced from a request body
///
/// A missing counsellor is invalid input rather than a missing resource;
/// an inactive one is a conflict.
pub async fn require_active_counsellor<'e, E>(
    executor: E,
    counsellor_id: CounsellorId,
) -> Result<Counsellor>
where
    E: SqliteExecutor<'e>,
{
    let counsellor = match get_counsellor(executor, counsellor_id).await {
        Ok(counsellor) => counsellor,
        Err(Error::NotFound(msg)) => return Err(Error::InvalidInput(msg)),
        Err(e) => return Err(e),
    };
    if !counsellor.is_active {
        return Err(Error::Conflict(format!(
            "Counsellor {} is inactive",
            counsellor.full_name()
        )));
    }
    Ok(counsellor)
}

pub async fn insert_counsellor(pool: &SqlitePool, new: &NewCounsellor) -> Result<Counsellor> {
    new.validate()?;

    let id = sqlx::query(
        r#"
        INSERT INTO counsellors (employee_id, first_name, last_name, email, department)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.employee_id.trim())
    .bind(new.first_name.trim())
    .bind(new.last_name.trim())
    .bind(new.email.trim())
    .bind(new.department.as_deref().map(str::trim).filter(|d| !d.is_empty()))
    .execute(pool)
    .await
    .map_err(|e| {
        conflict_on_unique(e, || {
            format!(
                "A counsellor with employee id {} or email {} already exists",
                new.employee_id, new.email
            )
        })
    })?
    .last_insert_rowid();

    info!(counsellor_id = id, "Counsellor created");
    get_counsellor(pool, id).await
}

pub async fn update_counsellor(
    pool: &SqlitePool,
    counsellor_id: CounsellorId,
    update: &CounsellorUpdate,
) -> Result<Counsellor> {
    let current = get_counsellor(pool, counsellor_id).await?;

    let email = update.email.clone().unwrap_or(current.email);
    if !email.contains('@') {
        return Err(Error::InvalidInput(format!("Invalid email: {}", email)));
    }
    let first_name = update.first_name.clone().unwrap_or(current.first_name);
    if first_name.trim().is_empty() {
        return Err(Error::InvalidInput("first_name is required".to_string()));
    }

    sqlx::query(
        r#"
        UPDATE counsellors SET
            first_name = ?, last_name = ?, email = ?, department = ?, is_active = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(first_name.trim())
    .bind(update.last_name.clone().unwrap_or(current.last_name))
    .bind(email.trim())
    .bind(update.department.clone().or(current.department))
    .bind(update.is_active.unwrap_or(current.is_active))
    .bind(counsellor_id)
    .execute(pool)
    .await
    .map_err(|e| conflict_on_unique(e, || format!("Email {} is already in use", email)))?;

    get_counsellor(pool, counsellor_id).await
}

/// Deactivate a counsellor; owned leads are left in place
pub async fn deactivate_counsellor(pool: &SqlitePool, counsellor_id: CounsellorId) -> Result<Counsellor> {
    let result = sqlx::query(
        "UPDATE counsellors SET is_active = 0, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(counsellor_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Counsellor {} not found", counsellor_id)));
    }
    info!(counsellor_id, "Counsellor deactivated");
    get_counsellor(pool, counsellor_id).await
}

/// Lead totals for one active counsellor
#[derive(Debug, Clone, Serialize)]
pub struct CounsellorPerformance {
    pub counsellor_id: CounsellorId,
    pub name: String,
    pub department: Option<String>,
    pub total_leads: i64,
    pub closed_won: i64,
    pub closed_lost: i64,
    /// Percent of owned leads that are CLOSED_WON
    pub conversion_rate: f64,
}

pub async fn counsellor_performance(pool: &SqlitePool) -> Result<Vec<CounsellorPerformance>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id, c.first_name, c.last_name, c.department,
               COUNT(l.id) AS total_leads,
               COALESCE(SUM(CASE WHEN l.status = ? THEN 1 ELSE 0 END), 0) AS closed_won,
               COALESCE(SUM(CASE WHEN l.status = ? THEN 1 ELSE 0 END), 0) AS closed_lost
        FROM counsellors c
        LEFT JOIN leads l ON l.assigned_counsellor_id = c.id
        WHERE c.is_active = 1
        GROUP BY c.id
        ORDER BY c.id
        "#,
    )
    .bind(LeadStatus::ClosedWon.as_str())
    .bind(LeadStatus::ClosedLost.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<CounsellorPerformance> {
            let total_leads: i64 = row.try_get("total_leads")?;
            let closed_won: i64 = row.try_get("closed_won")?;
            let first_name: String = row.try_get("first_name")?;
            let last_name: String = row.try_get("last_name")?;
            let rate = ConversionRate::new(closed_won.max(0) as u64, total_leads.max(0) as u64);
            Ok(CounsellorPerformance {
                counsellor_id: row.try_get("id")?,
                name: format!("{} {}", first_name, last_name).trim().to_string(),
                department: row.try_get("department")?,
                total_leads,
                closed_won,
                closed_lost: row.try_get("closed_lost")?,
                conversion_rate: (rate.as_percent() * 100.0).round() / 100.0,
            })
        })
        .collect()
}
