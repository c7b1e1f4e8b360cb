//! Domain models
//!
//! Plain data types shared by the assignment engine and the HTTP service.
//! Enumerations are stored in the database as their SCREAMING_SNAKE_CASE
//! names (see `as_str`), which is also their JSON form.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Database identifier of a counsellor
pub type CounsellorId = i64;

/// Database identifier of a lead
pub type LeadId = i64;

/// Database identifier of a lead source
pub type SourceId = i64;

/// Database identifier of a business
pub type BusinessId = i64;

/// Sales pipeline stage of a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    ProposalSent,
    Negotiation,
    ClosedWon,
    ClosedLost,
    Transferred,
}

impl LeadStatus {
    /// Every status, in pipeline order
    pub const ALL: [LeadStatus; 8] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Qualified,
        LeadStatus::ProposalSent,
        LeadStatus::Negotiation,
        LeadStatus::ClosedWon,
        LeadStatus::ClosedLost,
        LeadStatus::Transferred,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "NEW",
            LeadStatus::Contacted => "CONTACTED",
            LeadStatus::Qualified => "QUALIFIED",
            LeadStatus::ProposalSent => "PROPOSAL_SENT",
            LeadStatus::Negotiation => "NEGOTIATION",
            LeadStatus::ClosedWon => "CLOSED_WON",
            LeadStatus::ClosedLost => "CLOSED_LOST",
            LeadStatus::Transferred => "TRANSFERRED",
        }
    }

    /// True for the "won" outcome used by conversion statistics
    pub fn is_won(&self) -> bool {
        matches!(self, LeadStatus::ClosedWon)
    }
}

impl Default for LeadStatus {
    fn default() -> Self {
        LeadStatus::New
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        LeadStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown lead status: {}", s)))
    }
}

/// Lead priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl LeadPriority {
    pub const ALL: [LeadPriority; 4] = [
        LeadPriority::Low,
        LeadPriority::Medium,
        LeadPriority::High,
        LeadPriority::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadPriority::Low => "LOW",
            LeadPriority::Medium => "MEDIUM",
            LeadPriority::High => "HIGH",
            LeadPriority::Urgent => "URGENT",
        }
    }
}

impl Default for LeadPriority {
    fn default() -> Self {
        LeadPriority::Medium
    }
}

impl fmt::Display for LeadPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadPriority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        LeadPriority::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown lead priority: {}", s)))
    }
}

/// Kind of interaction logged against a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    Call,
    Email,
    Meeting,
    Note,
    FollowUp,
}

impl ActivityType {
    pub const ALL: [ActivityType; 5] = [
        ActivityType::Call,
        ActivityType::Email,
        ActivityType::Meeting,
        ActivityType::Note,
        ActivityType::FollowUp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Call => "CALL",
            ActivityType::Email => "EMAIL",
            ActivityType::Meeting => "MEETING",
            ActivityType::Note => "NOTE",
            ActivityType::FollowUp => "FOLLOW_UP",
        }
    }
}

impl FromStr for ActivityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ActivityType::ALL
            .iter()
            .copied()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown activity type: {}", s)))
    }
}

/// Sales agent eligible to own leads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counsellor {
    pub id: CounsellorId,
    pub employee_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub department: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl Counsellor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Lead-origin category (web form, referral, trade show, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSource {
    pub id: SourceId,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
}

/// Prospective customer tracked through the sales pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub lead_code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub industry: Option<String>,
    pub source_id: Option<SourceId>,
    pub status: LeadStatus,
    pub priority: LeadPriority,
    pub assigned_counsellor_id: Option<CounsellorId>,
    pub previous_counsellor_id: Option<CounsellorId>,
    pub expected_value: f64,
    pub notes: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub last_contact_date: Option<NaiveDateTime>,
    pub next_follow_up: Option<NaiveDateTime>,
    /// Value of the business that closed the lead
    pub actual_value: Option<f64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Lead {
    /// Industry label, treating blank strings as absent
    pub fn industry_label(&self) -> Option<&str> {
        self.industry
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Fields supplied when creating a lead (manual entry or bulk import)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewLead {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub industry: Option<String>,
    pub source_id: Option<SourceId>,
    pub priority: Option<LeadPriority>,
    pub assigned_counsellor_id: Option<CounsellorId>,
    #[serde(default)]
    pub expected_value: f64,
    #[serde(default)]
    pub notes: String,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl NewLead {
    /// Validate required fields before insert
    pub fn validate(&self) -> Result<()> {
        if self.first_name.trim().is_empty() {
            return Err(Error::InvalidInput("first_name is required".to_string()));
        }
        if self.expected_value < 0.0 || !self.expected_value.is_finite() {
            return Err(Error::InvalidInput(format!(
                "expected_value must be a non-negative number, got {}",
                self.expected_value
            )));
        }
        if let Some(email) = self.email.as_deref() {
            if !email.is_empty() && !email.contains('@') {
                return Err(Error::InvalidInput(format!("Invalid email: {}", email)));
            }
        }
        Ok(())
    }
}

/// Record of a lead moving from one counsellor to another
///
/// A request starts with `admin_approved = false`; the lead only moves once
/// it is approved. Direct transfers are stored already approved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadTransfer {
    pub id: i64,
    pub lead_id: LeadId,
    pub from_counsellor_id: Option<CounsellorId>,
    pub to_counsellor_id: CounsellorId,
    pub reason: String,
    pub admin_approved: bool,
    pub approved_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// Lifecycle of a won business
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusinessStatus {
    #[default]
    Active,
    OnHold,
    Completed,
    Cancelled,
}

impl BusinessStatus {
    pub const ALL: [BusinessStatus; 4] = [
        BusinessStatus::Active,
        BusinessStatus::OnHold,
        BusinessStatus::Completed,
        BusinessStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessStatus::Active => "ACTIVE",
            BusinessStatus::OnHold => "ON_HOLD",
            BusinessStatus::Completed => "COMPLETED",
            BusinessStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BusinessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusinessStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        BusinessStatus::ALL
            .iter()
            .copied()
            .find(|b| b.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown business status: {}", s)))
    }
}

/// Deal won from a lead
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub id: BusinessId,
    pub business_code: String,
    pub lead_id: LeadId,
    pub counsellor_id: Option<CounsellorId>,
    pub title: String,
    pub description: String,
    pub value: f64,
    pub status: BusinessStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub payment_terms: String,
    pub notes: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Fields supplied when closing a lead with a business
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBusiness {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub value: f64,
    pub status: Option<BusinessStatus>,
    /// Defaults to today
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub payment_terms: String,
    #[serde(default)]
    pub notes: String,
}

impl NewBusiness {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidInput("title is required".to_string()));
        }
        if self.value < 0.0 || !self.value.is_finite() {
            return Err(Error::InvalidInput(format!(
                "value must be a non-negative number, got {}",
                self.value
            )));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(Error::InvalidInput(format!(
                    "end_date {} is before start_date {}",
                    end, start
                )));
            }
        }
        Ok(())
    }
}

/// Interaction logged by a counsellor against a lead
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadActivity {
    pub id: i64,
    pub lead_id: LeadId,
    pub counsellor_id: Option<CounsellorId>,
    pub activity_type: ActivityType,
    pub subject: String,
    pub outcome: Option<String>,
    pub completed_at: NaiveDateTime,
}
