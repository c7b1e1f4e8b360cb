//! # Lead Assignment Engine
//!
//! Distributes a batch of unowned leads across a pool of active counsellors
//! according to a selectable [`AssignmentStrategy`].
//!
//! The engine is split in two phases:
//!
//! ```text
//!   snapshot (caller)          decide (this module)             persist (caller)
//! ┌────────────────────┐    ┌──────────────────────────┐    ┌──────────────────────┐
//! │ unowned leads      │───▶│ plan(leads, pool, strat) │───▶│ apply each decision  │
//! │ counsellor history │    │  -> AssignmentPlan       │    │  -> AssignmentReport │
//! └────────────────────┘    └──────────────────────────┘    └──────────────────────┘
//! ```
//!
//! [`plan`] is pure: it never touches storage, and all running tallies
//! (workload, performance totals) live in local memory for the duration of
//! one batch. Persistence is the caller's job; [`AssignmentReport`] collects
//! the per-lead results so that one failed write does not abort the batch.
//!
//! Counsellors are always ordered by identifier before ranking. Every
//! strategy breaks ties toward the lower identifier, so a plan is fully
//! determined by its inputs.
//!
//! ## Strategies
//!
//! - **round_robin**: the i-th lead goes to counsellor `i mod N`.
//! - **workload_balanced**: lowest running lead count first (min-heap).
//! - **performance_based**: highest historical conversion rate first, then
//!   fewest total leads. The rate is frozen for the batch; only the total
//!   moves.
//! - **specialization_based**: per-counsellor success rates by industry and
//!   by source, minus a linear workload penalty. Highest score wins.

mod rankers;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::models::{CounsellorId, Lead, LeadId, LeadStatus, SourceId};
use crate::{Error, Result};

pub use rankers::ConversionRate;

/// Policy governing how the engine ranks counsellors for each lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    #[default]
    RoundRobin,
    WorkloadBalanced,
    PerformanceBased,
    SpecializationBased,
}

impl AssignmentStrategy {
    pub const ALL: [AssignmentStrategy; 4] = [
        AssignmentStrategy::RoundRobin,
        AssignmentStrategy::WorkloadBalanced,
        AssignmentStrategy::PerformanceBased,
        AssignmentStrategy::SpecializationBased,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStrategy::RoundRobin => "round_robin",
            AssignmentStrategy::WorkloadBalanced => "workload_balanced",
            AssignmentStrategy::PerformanceBased => "performance_based",
            AssignmentStrategy::SpecializationBased => "specialization_based",
        }
    }

    /// Human-readable name used in confirmation messages
    pub fn label(&self) -> &'static str {
        match self {
            AssignmentStrategy::RoundRobin => "Round Robin",
            AssignmentStrategy::WorkloadBalanced => "Workload Balanced",
            AssignmentStrategy::PerformanceBased => "Performance Based",
            AssignmentStrategy::SpecializationBased => "Specialization Based",
        }
    }

    /// Parse a strategy name, falling back to round-robin for unknown names
    pub fn from_name_lenient(name: &str) -> Self {
        match name.parse() {
            Ok(strategy) => strategy,
            Err(_) => {
                warn!(
                    requested = name,
                    "Unknown assignment strategy, falling back to round_robin"
                );
                AssignmentStrategy::RoundRobin
            }
        }
    }
}

impl fmt::Display for AssignmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AssignmentStrategy::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown assignment strategy: {}", s)))
    }
}

/// An unowned lead as seen by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadCandidate {
    pub lead_id: LeadId,
    pub industry: Option<String>,
    pub source_id: Option<SourceId>,
}

impl LeadCandidate {
    pub fn new(lead_id: LeadId) -> Self {
        Self {
            lead_id,
            industry: None,
            source_id: None,
        }
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    pub fn with_source(mut self, source_id: SourceId) -> Self {
        self.source_id = Some(source_id);
        self
    }

    /// Industry label with surrounding whitespace removed; blank counts as absent
    pub(crate) fn industry_key(&self) -> Option<&str> {
        normalize_industry(self.industry.as_deref())
    }
}

/// One lead currently owned by a counsellor, as captured at snapshot time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedLead {
    pub industry: Option<String>,
    pub source_id: Option<SourceId>,
    pub status: LeadStatus,
}

impl OwnedLead {
    pub fn new(status: LeadStatus) -> Self {
        Self {
            industry: None,
            source_id: None,
            status,
        }
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    pub fn with_source(mut self, source_id: SourceId) -> Self {
        self.source_id = Some(source_id);
        self
    }
}

/// Snapshot of one eligible counsellor and the leads it owns at batch start
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CounsellorProfile {
    pub counsellor_id: CounsellorId,
    pub owned: Vec<OwnedLead>,
}

impl CounsellorProfile {
    pub fn new(counsellor_id: CounsellorId) -> Self {
        Self {
            counsellor_id,
            owned: Vec::new(),
        }
    }

    pub fn with_owned(mut self, owned: impl IntoIterator<Item = OwnedLead>) -> Self {
        self.owned.extend(owned);
        self
    }

    /// Number of leads currently owned
    pub fn workload(&self) -> u64 {
        self.owned.len() as u64
    }

    /// Number of owned leads that reached CLOSED_WON
    pub fn closed_won(&self) -> u64 {
        self.owned.iter().filter(|lead| lead.status.is_won()).count() as u64
    }

    pub fn conversion_rate(&self) -> ConversionRate {
        ConversionRate::new(self.closed_won(), self.workload())
    }
}

/// Build counsellor profiles from a flat list of leads
///
/// Leads owned by counsellors outside `counsellor_ids` are ignored; a
/// counsellor owning nothing gets an empty profile.
pub fn profiles_from_leads(counsellor_ids: &[CounsellorId], leads: &[Lead]) -> Vec<CounsellorProfile> {
    let mut by_id: BTreeMap<CounsellorId, CounsellorProfile> = counsellor_ids
        .iter()
        .map(|&id| (id, CounsellorProfile::new(id)))
        .collect();

    for lead in leads {
        let Some(owner) = lead.assigned_counsellor_id else {
            continue;
        };
        if let Some(profile) = by_id.get_mut(&owner) {
            profile.owned.push(OwnedLead {
                industry: lead.industry.clone(),
                source_id: lead.source_id,
                status: lead.status,
            });
        }
    }

    by_id.into_values().collect()
}

/// A single decided (lead, counsellor) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentDecision {
    pub lead_id: LeadId,
    pub counsellor_id: CounsellorId,
}

/// Why a plan has (or has not) got decisions in it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOutcome {
    /// At least one lead was decided
    Assigned,
    /// There were no unowned leads to distribute
    NothingToAssign,
    /// There was nobody to assign to
    NoEligibleCounsellors,
}

/// Result of the decision phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentPlan {
    pub strategy: AssignmentStrategy,
    pub outcome: AssignmentOutcome,
    pub decisions: Vec<AssignmentDecision>,
}

impl AssignmentPlan {
    fn empty(strategy: AssignmentStrategy, outcome: AssignmentOutcome) -> Self {
        Self {
            strategy,
            outcome,
            decisions: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    /// Counsellor chosen for a lead, if the lead is part of this plan
    pub fn owner_of(&self, lead_id: LeadId) -> Option<CounsellorId> {
        self.decisions
            .iter()
            .find(|d| d.lead_id == lead_id)
            .map(|d| d.counsellor_id)
    }

    /// Number of new leads per counsellor
    pub fn counts_by_counsellor(&self) -> BTreeMap<CounsellorId, usize> {
        let mut counts = BTreeMap::new();
        for decision in &self.decisions {
            *counts.entry(decision.counsellor_id).or_insert(0) += 1;
        }
        counts
    }
}

/// Result of the persistence phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentReport {
    pub strategy: AssignmentStrategy,
    pub outcome: AssignmentOutcome,
    /// Decisions written successfully
    pub assigned: usize,
    /// Decisions not applied because the lead was no longer unowned
    pub skipped: usize,
    /// Decisions whose write failed
    pub failed: usize,
}

impl AssignmentReport {
    pub fn for_plan(plan: &AssignmentPlan) -> Self {
        Self {
            strategy: plan.strategy,
            outcome: plan.outcome,
            assigned: 0,
            skipped: 0,
            failed: 0,
        }
    }

    pub fn record_assigned(&mut self) {
        self.assigned += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failed(&mut self) {
        self.failed += 1;
    }

    /// User-facing confirmation message
    pub fn message(&self) -> String {
        match self.outcome {
            AssignmentOutcome::NoEligibleCounsellors => {
                "No active counsellors found! Activate or add a counsellor before assigning leads."
                    .to_string()
            }
            AssignmentOutcome::NothingToAssign => "No unassigned leads found!".to_string(),
            AssignmentOutcome::Assigned => {
                let mut message = format!(
                    "Successfully assigned {} leads using {} method!",
                    self.assigned,
                    self.strategy.label()
                );
                if self.skipped > 0 {
                    message.push_str(&format!(
                        " {} leads were already assigned and left untouched.",
                        self.skipped
                    ));
                }
                if self.failed > 0 {
                    message.push_str(&format!(" {} leads could not be saved.", self.failed));
                }
                message
            }
        }
    }
}

/// Ranking interface shared by all strategies
///
/// The driver in [`plan`] calls `select` once per lead and then
/// `on_assigned` with the slot it got back. Slots index the
/// identifier-ordered counsellor pool.
pub(crate) trait Ranker {
    fn select(&mut self, lead: &LeadCandidate) -> usize;
    fn on_assigned(&mut self, slot: usize);
}

/// Decide an owner for every lead in `leads`
///
/// Leads are processed in input order. Repeated lead ids are decided once.
/// The counsellor pool is sorted by identifier and deduplicated first.
pub fn plan(
    leads: &[LeadCandidate],
    counsellors: &[CounsellorProfile],
    strategy: AssignmentStrategy,
) -> AssignmentPlan {
    if counsellors.is_empty() {
        debug!(lead_count = leads.len(), "No eligible counsellors for assignment");
        return AssignmentPlan::empty(strategy, AssignmentOutcome::NoEligibleCounsellors);
    }
    if leads.is_empty() {
        return AssignmentPlan::empty(strategy, AssignmentOutcome::NothingToAssign);
    }

    let mut pool: Vec<&CounsellorProfile> = counsellors.iter().collect();
    pool.sort_by_key(|c| c.counsellor_id);
    pool.dedup_by_key(|c| c.counsellor_id);

    let mut ranker = rankers::StrategyRanker::new(strategy, &pool);
    let mut seen = HashSet::with_capacity(leads.len());
    let mut decisions = Vec::with_capacity(leads.len());

    for lead in leads {
        if !seen.insert(lead.lead_id) {
            continue;
        }
        let slot = ranker.select(lead);
        ranker.on_assigned(slot);
        decisions.push(AssignmentDecision {
            lead_id: lead.lead_id,
            counsellor_id: pool[slot].counsellor_id,
        });
    }

    debug!(
        strategy = %strategy,
        decided = decisions.len(),
        pool_size = pool.len(),
        "Assignment plan computed"
    );

    AssignmentPlan {
        strategy,
        outcome: AssignmentOutcome::Assigned,
        decisions,
    }
}

/// A lead record the engine can assign in memory
pub trait Assignable {
    fn candidate(&self) -> LeadCandidate;
    fn owner(&self) -> Option<CounsellorId>;
    fn set_owner(&mut self, counsellor_id: CounsellorId);
}

impl Assignable for Lead {
    fn candidate(&self) -> LeadCandidate {
        LeadCandidate {
            lead_id: self.id,
            industry: self.industry.clone(),
            source_id: self.source_id,
        }
    }

    fn owner(&self) -> Option<CounsellorId> {
        self.assigned_counsellor_id
    }

    fn set_owner(&mut self, counsellor_id: CounsellorId) {
        self.assigned_counsellor_id = Some(counsellor_id);
    }
}

/// Assign every unowned lead in `leads` and return how many were assigned
///
/// Leads that already have an owner are left untouched.
pub fn assign<L: Assignable>(
    leads: &mut [L],
    counsellors: &[CounsellorProfile],
    strategy: AssignmentStrategy,
) -> usize {
    let candidates: Vec<LeadCandidate> = leads
        .iter()
        .filter(|lead| lead.owner().is_none())
        .map(Assignable::candidate)
        .collect();

    let plan = plan(&candidates, counsellors, strategy);
    let owners: HashMap<LeadId, CounsellorId> = plan
        .decisions
        .iter()
        .map(|d| (d.lead_id, d.counsellor_id))
        .collect();

    let mut assigned = 0;
    for lead in leads.iter_mut() {
        if lead.owner().is_some() {
            continue;
        }
        if let Some(&counsellor_id) = owners.get(&lead.candidate().lead_id) {
            lead.set_owner(counsellor_id);
            assigned += 1;
        }
    }
    assigned
}

pub(crate) fn normalize_industry(industry: Option<&str>) -> Option<&str> {
    industry.map(str::trim).filter(|s| !s.is_empty())
}
