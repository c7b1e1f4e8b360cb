//! Businesses won from leads
//!
//! Creating a business closes its lead as won and records the business
//! value as the lead's actual value, in one transaction.

use chrono::Utc;
use crm_common::ids::generate_business_code;
use crm_common::models::{
    Business, BusinessId, BusinessStatus, CounsellorId, LeadId, LeadStatus, NewBusiness,
};
use crm_common::{Error, Result};
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};
use tracing::{info, warn};

use super::business_from_row;
use super::leads::get_lead;

const BUSINESS_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct BusinessFilter {
    pub counsellor_id: Option<CounsellorId>,
    pub status: Option<BusinessStatus>,
}

pub async fn list_businesses(pool: &SqlitePool, filter: &BusinessFilter) -> Result<Vec<Business>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM businesses WHERE 1 = 1");
    if let Some(counsellor_id) = filter.counsellor_id {
        qb.push(" AND counsellor_id = ").push_bind(counsellor_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    qb.push(" ORDER BY created_at DESC, id DESC");

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(business_from_row).collect()
}

pub async fn get_business<'e, E>(executor: E, business_id: BusinessId) -> Result<Business>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query("SELECT * FROM businesses WHERE id = ?")
        .bind(business_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Business {} not found", business_id)))?;
    business_from_row(&row)
}

/// Record a business won from an owned lead
///
/// The business belongs to the lead's current owner. The lead moves to
/// CLOSED_WON with `actual_value` set to the business value.
pub async fn create_business(
    pool: &SqlitePool,
    lead_id: LeadId,
    new_business: &NewBusiness,
) -> Result<Business> {
    new_business.validate()?;

    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

    let lead = get_lead(&mut *tx, lead_id).await?;
    let Some(counsellor_id) = lead.assigned_counsellor_id else {
        return Err(Error::InvalidInput(format!(
            "Lead {} has no owner; assign it before recording a business",
            lead_id
        )));
    };
    let start_date = new_business
        .start_date
        .unwrap_or_else(|| Utc::now().date_naive());
    if let Some(end) = new_business.end_date {
        if end < start_date {
            return Err(Error::InvalidInput(format!(
                "end_date {} is before start_date {}",
                end, start_date
            )));
        }
    }

    let mut business_id = None;
    for attempt in 1..=BUSINESS_CODE_ATTEMPTS {
        let business_code = generate_business_code();
        let result = sqlx::query(
            r#"
            INSERT INTO businesses (
                business_code, lead_id, counsellor_id, title, description, value,
                status, start_date, end_date, payment_terms, notes
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&business_code)
        .bind(lead_id)
        .bind(counsellor_id)
        .bind(new_business.title.trim())
        .bind(new_business.description.trim())
        .bind(new_business.value)
        .bind(new_business.status.unwrap_or_default().as_str())
        .bind(start_date)
        .bind(new_business.end_date)
        .bind(new_business.payment_terms.trim())
        .bind(&new_business.notes)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(done) => {
                business_id = Some(done.last_insert_rowid());
                break;
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.is_unique_violation() && db_err.message().contains("business_code") =>
            {
                warn!(attempt, business_code = %business_code, "Business code collision, regenerating");
            }
            Err(e) => return Err(e.into()),
        }
    }
    let business_id = business_id
        .ok_or_else(|| Error::Internal("Could not generate a unique business code".to_string()))?;

    sqlx::query(
        r#"
        UPDATE leads SET status = ?, actual_value = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(LeadStatus::ClosedWon.as_str())
    .bind(new_business.value)
    .bind(lead_id)
    .execute(&mut *tx)
    .await?;

    let business = get_business(&mut *tx, business_id).await?;
    tx.commit().await?;

    info!(
        lead_id,
        business_id,
        counsellor_id,
        business_code = %business.business_code,
        value = business.value,
        "Business recorded, lead closed as won"
    );
    Ok(business)
}

pub async fn update_business_status(
    pool: &SqlitePool,
    business_id: BusinessId,
    status: BusinessStatus,
) -> Result<Business> {
    let result = sqlx::query(
        "UPDATE businesses SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(business_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Business {} not found", business_id)));
    }
    info!(business_id, status = %status, "Business status changed");
    get_business(pool, business_id).await
}
