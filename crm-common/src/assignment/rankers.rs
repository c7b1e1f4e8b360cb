//! Per-strategy rankers driven by `assignment::plan`
//!
//! Each ranker owns the running state for one batch. Slots refer to the
//! identifier-ordered pool handed to [`StrategyRanker::new`]; lower slot
//! always wins a tie.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use super::{normalize_industry, CounsellorProfile, LeadCandidate, Ranker};
use crate::models::SourceId;
use crate::AssignmentStrategy;

/// Conversion rate held as an exact fraction
///
/// Ordering compares `won / total` without floating point; a counsellor
/// with no leads has rate 0.
#[derive(Debug, Clone, Copy)]
pub struct ConversionRate {
    won: u64,
    total: u64,
}

impl ConversionRate {
    pub fn new(won: u64, total: u64) -> Self {
        Self {
            won: won.min(total),
            total,
        }
    }

    /// Rate in percent (0.0 - 100.0)
    pub fn as_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.won as f64 / self.total as f64 * 100.0
        }
    }

    fn as_fraction(&self) -> (u128, u128) {
        if self.total == 0 {
            (0, 1)
        } else {
            (self.won as u128, self.total as u128)
        }
    }
}

impl Ord for ConversionRate {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a_num, a_den) = self.as_fraction();
        let (b_num, b_den) = other.as_fraction();
        (a_num * b_den).cmp(&(b_num * a_den))
    }
}

impl PartialOrd for ConversionRate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ConversionRate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ConversionRate {}

/// Enum-dispatched ranker, one variant per strategy
pub(super) enum StrategyRanker {
    RoundRobin(RoundRobin),
    WorkloadBalanced(WorkloadBalanced),
    PerformanceBased(PerformanceBased),
    SpecializationBased(SpecializationBased),
}

impl StrategyRanker {
    /// `pool` must be non-empty and ordered by counsellor identifier
    pub(super) fn new(strategy: AssignmentStrategy, pool: &[&CounsellorProfile]) -> Self {
        match strategy {
            AssignmentStrategy::RoundRobin => StrategyRanker::RoundRobin(RoundRobin::new(pool.len())),
            AssignmentStrategy::WorkloadBalanced => {
                StrategyRanker::WorkloadBalanced(WorkloadBalanced::new(pool))
            }
            AssignmentStrategy::PerformanceBased => {
                StrategyRanker::PerformanceBased(PerformanceBased::new(pool))
            }
            AssignmentStrategy::SpecializationBased => {
                StrategyRanker::SpecializationBased(SpecializationBased::new(pool))
            }
        }
    }
}

impl Ranker for StrategyRanker {
    fn select(&mut self, lead: &LeadCandidate) -> usize {
        match self {
            StrategyRanker::RoundRobin(r) => r.select(lead),
            StrategyRanker::WorkloadBalanced(r) => r.select(lead),
            StrategyRanker::PerformanceBased(r) => r.select(lead),
            StrategyRanker::SpecializationBased(r) => r.select(lead),
        }
    }

    fn on_assigned(&mut self, slot: usize) {
        match self {
            StrategyRanker::RoundRobin(r) => r.on_assigned(slot),
            StrategyRanker::WorkloadBalanced(r) => r.on_assigned(slot),
            StrategyRanker::PerformanceBased(r) => r.on_assigned(slot),
            StrategyRanker::SpecializationBased(r) => r.on_assigned(slot),
        }
    }
}

// -----------------------------------------------------------------------------
// round_robin
// -----------------------------------------------------------------------------

pub(super) struct RoundRobin {
    pool_size: usize,
    position: usize,
}

impl RoundRobin {
    fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            position: 0,
        }
    }
}

impl Ranker for RoundRobin {
    fn select(&mut self, _lead: &LeadCandidate) -> usize {
        self.position % self.pool_size
    }

    fn on_assigned(&mut self, _slot: usize) {
        self.position += 1;
    }
}

// -----------------------------------------------------------------------------
// workload_balanced
// -----------------------------------------------------------------------------

/// Min-heap keyed by (running lead count, slot)
pub(super) struct WorkloadBalanced {
    heap: BinaryHeap<Reverse<(u64, usize)>>,
}

impl WorkloadBalanced {
    fn new(pool: &[&CounsellorProfile]) -> Self {
        let heap = pool
            .iter()
            .enumerate()
            .map(|(slot, profile)| Reverse((profile.workload(), slot)))
            .collect();
        Self { heap }
    }
}

impl Ranker for WorkloadBalanced {
    fn select(&mut self, _lead: &LeadCandidate) -> usize {
        match self.heap.peek() {
            Some(Reverse((_, slot))) => *slot,
            None => 0,
        }
    }

    fn on_assigned(&mut self, slot: usize) {
        if let Some(Reverse((load, top))) = self.heap.pop() {
            debug_assert_eq!(top, slot, "workload ranker assigned off the top of the heap");
            self.heap.push(Reverse((load + 1, top)));
        }
    }
}

// -----------------------------------------------------------------------------
// performance_based
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PerformanceEntry {
    rate: ConversionRate,
    total: u64,
    slot: usize,
}

impl Ord for PerformanceEntry {
    /// Greater = better: higher rate, then fewer total leads, then lower slot
    fn cmp(&self, other: &Self) -> Ordering {
        self.rate
            .cmp(&other.rate)
            .then_with(|| other.total.cmp(&self.total))
            .then_with(|| other.slot.cmp(&self.slot))
    }
}

impl PartialOrd for PerformanceEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Max-heap of performance entries; the rate is fixed at snapshot time
pub(super) struct PerformanceBased {
    heap: BinaryHeap<PerformanceEntry>,
}

impl PerformanceBased {
    fn new(pool: &[&CounsellorProfile]) -> Self {
        let heap = pool
            .iter()
            .enumerate()
            .map(|(slot, profile)| PerformanceEntry {
                rate: profile.conversion_rate(),
                total: profile.workload(),
                slot,
            })
            .collect();
        Self { heap }
    }
}

impl Ranker for PerformanceBased {
    fn select(&mut self, _lead: &LeadCandidate) -> usize {
        self.heap.peek().map(|entry| entry.slot).unwrap_or(0)
    }

    fn on_assigned(&mut self, slot: usize) {
        if let Some(mut entry) = self.heap.pop() {
            debug_assert_eq!(entry.slot, slot, "performance ranker assigned off the top of the heap");
            entry.total += 1;
            self.heap.push(entry);
        }
    }
}

// -----------------------------------------------------------------------------
// specialization_based
// -----------------------------------------------------------------------------

/// Industry expertise weight per unit of success rate
const INDUSTRY_WEIGHT: f64 = 100.0;
/// Source expertise weight per unit of success rate
const SOURCE_WEIGHT: f64 = 50.0;
/// Score penalty per lead currently owned
const WORKLOAD_PENALTY: f64 = 2.0;

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    won: u64,
    total: u64,
}

impl Bucket {
    fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.won as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Expertise {
    by_industry: HashMap<String, Bucket>,
    by_source: HashMap<SourceId, Bucket>,
    workload: u64,
}

impl Expertise {
    fn from_profile(profile: &CounsellorProfile) -> Self {
        let mut expertise = Expertise {
            workload: profile.workload(),
            ..Default::default()
        };

        for lead in &profile.owned {
            let won = lead.status.is_won() as u64;
            if let Some(industry) = normalize_industry(lead.industry.as_deref()) {
                let bucket = expertise.by_industry.entry(industry.to_string()).or_default();
                bucket.total += 1;
                bucket.won += won;
            }
            if let Some(source_id) = lead.source_id {
                let bucket = expertise.by_source.entry(source_id).or_default();
                bucket.total += 1;
                bucket.won += won;
            }
        }

        expertise
    }

    fn score(&self, lead: &LeadCandidate) -> f64 {
        let mut score = 0.0;
        if let Some(bucket) = lead.industry_key().and_then(|key| self.by_industry.get(key)) {
            score += bucket.success_rate() * INDUSTRY_WEIGHT;
        }
        if let Some(bucket) = lead.source_id.and_then(|id| self.by_source.get(&id)) {
            score += bucket.success_rate() * SOURCE_WEIGHT;
        }
        score - self.workload as f64 * WORKLOAD_PENALTY
    }
}

/// Linear scan over expertise profiles; profiles are fixed, workload moves
pub(super) struct SpecializationBased {
    experts: Vec<Expertise>,
}

impl SpecializationBased {
    fn new(pool: &[&CounsellorProfile]) -> Self {
        Self {
            experts: pool.iter().map(|p| Expertise::from_profile(p)).collect(),
        }
    }
}

impl Ranker for SpecializationBased {
    fn select(&mut self, lead: &LeadCandidate) -> usize {
        let mut best: Option<(usize, f64)> = None;
        for (slot, expert) in self.experts.iter().enumerate() {
            let score = expert.score(lead);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((slot, score)),
            }
        }
        best.map(|(slot, _)| slot).unwrap_or(0)
    }

    fn on_assigned(&mut self, slot: usize) {
        if let Some(expert) = self.experts.get_mut(slot) {
            expert.workload += 1;
        }
    }
}
