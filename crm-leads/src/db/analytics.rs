//! Lead analytics: status distribution and monthly trends, service-wide
//! or for one counsellor

use chrono::{Datelike, NaiveDate, Utc};
use crm_common::db::get_setting;
use crm_common::db::settings::ANALYTICS_TREND_MONTHS;
use crm_common::models::{CounsellorId, LeadStatus};
use crm_common::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use super::counsellors::get_counsellor;

const DEFAULT_TREND_MONTHS: u32 = 6;
const MAX_TREND_MONTHS: u32 = 36;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusCount {
    pub status: LeadStatus,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthlyCount {
    /// `YYYY-MM`
    pub month: String,
    /// Month name, e.g. `October`
    pub label: String,
    pub leads: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadAnalytics {
    /// Every status in pipeline order, including zero counts
    pub status_data: Vec<StatusCount>,
    /// Current month first
    pub monthly_data: Vec<MonthlyCount>,
}

pub async fn lead_analytics(pool: &SqlitePool) -> Result<LeadAnalytics> {
    let months = trend_months(pool).await?;

    let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM leads GROUP BY status")
        .fetch_all(pool)
        .await?;
    let status_data = status_counts(&rows)?;

    let rows = sqlx::query(
        "SELECT strftime('%Y-%m', created_at) AS month, COUNT(*) AS count FROM leads GROUP BY month",
    )
    .fetch_all(pool)
    .await?;
    let by_month = month_counts(&rows)?;

    let monthly_data = trailing_months(Utc::now().date_naive(), months)
        .into_iter()
        .map(|first_day| {
            let (month, label) = month_keys(first_day);
            MonthlyCount {
                leads: by_month.get(&month).copied().unwrap_or(0),
                label,
                month,
            }
        })
        .collect();

    Ok(LeadAnalytics {
        status_data,
        monthly_data,
    })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthlyActivityCount {
    /// `YYYY-MM`
    pub month: String,
    pub label: String,
    pub activities: i64,
}

/// Analytics for a single counsellor's book of leads
#[derive(Debug, Clone, Serialize)]
pub struct CounsellorAnalytics {
    pub counsellor_id: CounsellorId,
    /// Statuses of the leads the counsellor currently owns
    pub status_data: Vec<StatusCount>,
    /// Activities the counsellor logged, current month first
    pub monthly_activities: Vec<MonthlyActivityCount>,
}

pub async fn counsellor_analytics(
    pool: &SqlitePool,
    counsellor_id: CounsellorId,
) -> Result<CounsellorAnalytics> {
    get_counsellor(pool, counsellor_id).await?;
    let months = trend_months(pool).await?;

    let rows = sqlx::query(
        "SELECT status, COUNT(*) AS count FROM leads WHERE assigned_counsellor_id = ? GROUP BY status",
    )
    .bind(counsellor_id)
    .fetch_all(pool)
    .await?;
    let status_data = status_counts(&rows)?;

    let rows = sqlx::query(
        r#"
        SELECT strftime('%Y-%m', completed_at) AS month, COUNT(*) AS count
        FROM lead_activities
        WHERE counsellor_id = ?
        GROUP BY month
        "#,
    )
    .bind(counsellor_id)
    .fetch_all(pool)
    .await?;
    let by_month = month_counts(&rows)?;

    let monthly_activities = trailing_months(Utc::now().date_naive(), months)
        .into_iter()
        .map(|first_day| {
            let (month, label) = month_keys(first_day);
            MonthlyActivityCount {
                activities: by_month.get(&month).copied().unwrap_or(0),
                label,
                month,
            }
        })
        .collect();

    Ok(CounsellorAnalytics {
        counsellor_id,
        status_data,
        monthly_activities,
    })
}

async fn trend_months(pool: &SqlitePool) -> Result<u32> {
    let months: u32 = get_setting(pool, ANALYTICS_TREND_MONTHS, DEFAULT_TREND_MONTHS).await?;
    Ok(months.clamp(1, MAX_TREND_MONTHS))
}

/// Every status in pipeline order from `status, count` rows, missing ones as 0
fn status_counts(rows: &[SqliteRow]) -> Result<Vec<StatusCount>> {
    let mut by_status: HashMap<String, i64> = HashMap::with_capacity(rows.len());
    for row in rows {
        by_status.insert(row.try_get("status")?, row.try_get("count")?);
    }
    Ok(LeadStatus::ALL
        .iter()
        .map(|&status| StatusCount {
            status,
            count: by_status.get(status.as_str()).copied().unwrap_or(0),
        })
        .collect())
}

fn month_counts(rows: &[SqliteRow]) -> Result<HashMap<String, i64>> {
    let mut by_month = HashMap::with_capacity(rows.len());
    for row in rows {
        let month: Option<String> = row.try_get("month")?;
        if let Some(month) = month {
            by_month.insert(month, row.try_get("count")?);
        }
    }
    Ok(by_month)
}

fn month_keys(first_day: NaiveDate) -> (String, String) {
    (
        first_day.format("%Y-%m").to_string(),
        first_day.format("%B").to_string(),
    )
}

/// First day of `count` calendar months ending with the month of `today`, newest first
fn trailing_months(today: NaiveDate, count: u32) -> Vec<NaiveDate> {
    let mut year = today.year();
    let mut month = today.month();
    let mut result = Vec::with_capacity(count as usize);

    for _ in 0..count {
        if let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) {
            result.push(first);
        }
        if month == 1 {
            month = 12;
            year -= 1;
        } else {
            month -= 1;
        }
    }
    result
}
