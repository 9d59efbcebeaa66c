//! Prioritization engine
//!
//! Turns a completed task's findings into a budgeted plan. Every finding is a
//! candidate with an effort (hours) and an impact score:
//!
//! ```text
//! impact = ln(1 + frequency) + 1.5 * severity_rank + 3.0 * goal_overlap
//! ```
//!
//! Candidates are bucketed (MoSCoW quartiles or a Lean impact/effort matrix)
//! and then filled greedily by impact-per-hour until the next task would
//! overflow the budget. The plan is deterministic for identical input.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use sts_common::events::TaskStatus;
use thiserror::Error;
use tracing::info;

use super::classifier::Classifier;
use super::effort::estimate_hours;
use crate::models::{
    Finding, PlanCategory, PlanMetadata, PlanSummary, PlanTask, PrioritizationMethod,
    PrioritizationPlan, Severity,
};
use crate::store::{StoreError, TaskStore};

const FREQUENCY_WEIGHT: f64 = 1.0;
const SEVERITY_WEIGHT: f64 = 1.5;
const GOAL_WEIGHT: f64 = 3.0;
const HIGH_UTILIZATION_PERCENT: f64 = 90.0;

pub const MUST_HAVE: &str = "Must Have";
pub const SHOULD_HAVE: &str = "Should Have";
pub const COULD_HAVE: &str = "Could Have";
pub const WONT_HAVE: &str = "Won't Have";

pub const HIGH_IMPACT_LOW_EFFORT: &str = "High Impact / Low Effort";
pub const HIGH_IMPACT_HIGH_EFFORT: &str = "High Impact / High Effort";
pub const LOW_IMPACT_LOW_EFFORT: &str = "Low Impact / Low Effort";
pub const LOW_IMPACT_HIGH_EFFORT: &str = "Low Impact / High Effort";

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "our", "your", "their", "are",
    "was", "were", "will", "would", "should", "could", "can", "have", "has", "had", "not", "but",
    "all", "any", "more", "most", "less", "than", "then", "them", "they", "its", "out", "about",
    "over", "under", "via", "per", "who", "what", "when", "where", "which", "how", "why", "make",
    "get", "improve", "increase", "reduce", "users", "user", "app",
];

#[derive(Debug, Error)]
pub enum PrioritizationError {
    /// Unknown or expired task id
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task {0} is {1}; only completed tasks can be prioritized")]
    TaskNotCompleted(String, TaskStatus),

    #[error("Task {0} has no findings to prioritize")]
    InsufficientData(String),

    #[error("Invalid prioritization request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for PrioritizationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => PrioritizationError::TaskNotFound(id),
            other => PrioritizationError::Store(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PrioritizationRequest {
    pub task_id: String,
    pub method: PrioritizationMethod,
    pub sprint_duration_days: u32,
    pub budget_hours: f64,
    pub business_goal: String,
}

/// One scored finding
#[derive(Debug, Clone)]
struct Candidate<'a> {
    /// Position in the flattened finding list, used for tie-breaks
    index: usize,
    finding: &'a Finding,
    hours: f64,
    impact: f64,
    goal_overlap: f64,
}

impl Candidate<'_> {
    fn ratio(&self) -> f64 {
        if self.hours > 0.0 {
            self.impact / self.hours
        } else {
            f64::INFINITY
        }
    }
}

/// Lowercased goal words of 3+ characters, stop words removed, first-seen order
pub fn goal_keywords(goal: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(goal)
        .filter(|w| w.chars().count() >= 3 && !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Fraction of `keywords` present in `text`
pub fn goal_overlap(keywords: &[String], text: &str) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let words: HashSet<String> = tokenize(text).collect();
    let matched = keywords.iter().filter(|k| words.contains(*k)).count();
    matched as f64 / keywords.len() as f64
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

pub fn impact_score(frequency: u32, severity: Severity, goal_overlap: f64) -> f64 {
    FREQUENCY_WEIGHT * (1.0 + frequency as f64).ln()
        + SEVERITY_WEIGHT * severity.rank() as f64
        + GOAL_WEIGHT * goal_overlap
}

/// Build a plan from findings and their effort estimates (same order)
pub fn build_plan(
    findings: &[&Finding],
    hours: &[f64],
    method: PrioritizationMethod,
    sprint_duration_days: u32,
    budget_hours: f64,
    business_goal: &str,
) -> PrioritizationPlan {
    let keywords = goal_keywords(business_goal);
    let candidates: Vec<Candidate> = findings
        .iter()
        .zip(hours)
        .enumerate()
        .map(|(index, (finding, hours))| {
            let overlap = goal_overlap(
                &keywords,
                &format!("{} {}", finding.title, finding.description),
            );
            Candidate {
                index,
                finding: *finding,
                hours: *hours,
                impact: impact_score(finding.frequency, finding.severity, overlap),
                goal_overlap: overlap,
            }
        })
        .collect();

    let buckets = match method {
        PrioritizationMethod::MoSCoW => moscow_buckets(&candidates),
        PrioritizationMethod::Lean => lean_buckets(&candidates),
    };

    let included = greedy_fill(&buckets, budget_hours);

    let prioritized_categories: Vec<PlanCategory> = buckets
        .iter()
        .map(|bucket| PlanCategory {
            category_name: bucket.name.to_string(),
            tasks: bucket
                .members
                .iter()
                .map(|c| plan_task(c, included.contains(&c.index)))
                .collect(),
        })
        .collect();

    let summary = summarize(&buckets, &included, method, budget_hours);

    PrioritizationPlan {
        plan_metadata: PlanMetadata {
            method,
            goal: business_goal.to_string(),
            budget_hours,
            sprint_duration_days,
        },
        prioritized_categories,
        summary,
    }
}

struct Bucket<'a> {
    name: &'static str,
    /// Eligible for the budget fill
    fillable: bool,
    /// Ordered by impact/effort ratio, descending
    members: Vec<Candidate<'a>>,
}

impl<'a> Bucket<'a> {
    fn new(name: &'static str, fillable: bool, mut members: Vec<Candidate<'a>>) -> Self {
        members.sort_by(|a, b| {
            b.ratio()
                .partial_cmp(&a.ratio())
                .unwrap_or(Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });
        Self {
            name,
            fillable,
            members,
        }
    }
}

/// Quartiles by impact rank, ties broken by input order
fn moscow_buckets<'a>(candidates: &[Candidate<'a>]) -> Vec<Bucket<'a>> {
    let mut ranked: Vec<Candidate<'a>> = candidates.to_vec();
    ranked.sort_by(|a, b| {
        b.impact
            .partial_cmp(&a.impact)
            .unwrap_or(Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });

    let n = ranked.len();
    let mut groups: [Vec<Candidate<'a>>; 4] = Default::default();
    for (rank, candidate) in ranked.into_iter().enumerate() {
        groups[(rank * 4 / n).min(3)].push(candidate);
    }

    let [must, should, could, wont] = groups;
    vec![
        Bucket::new(MUST_HAVE, true, must),
        Bucket::new(SHOULD_HAVE, true, should),
        Bucket::new(COULD_HAVE, true, could),
        Bucket::new(WONT_HAVE, false, wont),
    ]
}

/// Median splits: impact >= median is high, hours <= median is low
fn lean_buckets<'a>(candidates: &[Candidate<'a>]) -> Vec<Bucket<'a>> {
    let impact_median = median(candidates.iter().map(|c| c.impact).collect());
    let effort_median = median(candidates.iter().map(|c| c.hours).collect());

    let mut quadrants: [Vec<Candidate<'a>>; 4] = Default::default();
    for candidate in candidates {
        let high_impact = candidate.impact >= impact_median;
        let low_effort = candidate.hours <= effort_median;
        let slot = match (high_impact, low_effort) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        };
        quadrants[slot].push(candidate.clone());
    }

    let [hi_le, hi_he, li_le, li_he] = quadrants;
    vec![
        Bucket::new(HIGH_IMPACT_LOW_EFFORT, true, hi_le),
        Bucket::new(HIGH_IMPACT_HIGH_EFFORT, true, hi_he),
        Bucket::new(LOW_IMPACT_LOW_EFFORT, true, li_le),
        Bucket::new(LOW_IMPACT_HIGH_EFFORT, false, li_he),
    ]
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Indices of included candidates; filling stops at the first overflow
fn greedy_fill(buckets: &[Bucket], budget_hours: f64) -> HashSet<usize> {
    let mut included = HashSet::new();
    let mut used = 0.0;

    'fill: for bucket in buckets.iter().filter(|b| b.fillable) {
        for candidate in &bucket.members {
            if used + candidate.hours > budget_hours {
                break 'fill;
            }
            used += candidate.hours;
            included.insert(candidate.index);
        }
    }
    included
}

fn plan_task(candidate: &Candidate, included: bool) -> PlanTask {
    let finding = candidate.finding;
    PlanTask {
        title: finding.title.clone(),
        finding_type: finding.finding_type,
        impact_reasoning: format!(
            "{} severity, {} mentions, {:.0}% goal keyword match",
            finding.severity,
            finding.frequency,
            candidate.goal_overlap * 100.0
        ),
        estimated_hours: round2(candidate.hours),
        impact_score: round2(candidate.impact),
        included,
    }
}

fn summarize(
    buckets: &[Bucket],
    included: &HashSet<usize>,
    method: PrioritizationMethod,
    budget_hours: f64,
) -> PlanSummary {
    let all: Vec<&Candidate> = buckets.iter().flat_map(|b| b.members.iter()).collect();
    let total_estimated_hours: f64 = all
        .iter()
        .filter(|c| included.contains(&c.index))
        .map(|c| c.hours)
        .sum();
    let budget_utilization_percentage = if budget_hours > 0.0 {
        total_estimated_hours / budget_hours * 100.0
    } else {
        0.0
    };
    let excluded = all.len() - included.len();
    // Won't Have and Low Impact / High Effort never compete for the budget
    let over_budget = buckets
        .iter()
        .filter(|b| b.fillable)
        .flat_map(|b| b.members.iter())
        .filter(|c| !included.contains(&c.index))
        .count();

    let mut key_risks = Vec::new();
    if over_budget > 0 {
        key_risks.push(format!(
            "{} of {} tasks ({:.0}%) excluded; {} of them exceed the {}h budget",
            excluded,
            all.len(),
            excluded as f64 / all.len() as f64 * 100.0,
            over_budget,
            budget_hours
        ));
    }
    if method == PrioritizationMethod::MoSCoW {
        let must_hours: f64 = buckets
            .iter()
            .filter(|b| b.name == MUST_HAVE)
            .flat_map(|b| b.members.iter())
            .map(|c| c.hours)
            .sum();
        if must_hours > budget_hours {
            key_risks.push(format!(
                "Sprint duration may be insufficient for Must-have scope ({:.1}h needed, {}h budget)",
                must_hours, budget_hours
            ));
        }
    }
    if budget_utilization_percentage > HIGH_UTILIZATION_PERCENT {
        key_risks.push(format!(
            "Budget utilization at {:.1}% leaves little room for unplanned work",
            budget_utilization_percentage
        ));
    }
    let unscheduled_critical = all
        .iter()
        .filter(|c| c.finding.severity == Severity::Critical && !included.contains(&c.index))
        .count();
    if unscheduled_critical > 0 {
        key_risks.push(format!(
            "{} critical-severity items are not scheduled",
            unscheduled_critical
        ));
    }

    PlanSummary {
        total_estimated_hours: round2(total_estimated_hours),
        budget_utilization_percentage: round2(budget_utilization_percentage),
        included_tasks: included.len(),
        excluded_tasks: excluded,
        key_risks,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Prioritization against the task store
#[derive(Clone)]
pub struct Prioritizer {
    store: TaskStore,
    /// Asked for effort estimates when set
    effort_estimator: Option<Arc<dyn Classifier>>,
}

impl Prioritizer {
    pub fn new(store: TaskStore, effort_estimator: Option<Arc<dyn Classifier>>) -> Self {
        Self {
            store,
            effort_estimator,
        }
    }

    /// Plan a completed task's findings
    ///
    /// # Errors
    /// - `TaskNotFound` for unknown or expired ids
    /// - `TaskNotCompleted` while the task is pending, running or failed
    /// - `InsufficientData` when the task produced no findings
    pub async fn prioritize(
        &self,
        request: &PrioritizationRequest,
    ) -> Result<PrioritizationPlan, PrioritizationError> {
        if !request.budget_hours.is_finite() || request.budget_hours < 0.0 {
            return Err(PrioritizationError::InvalidRequest(format!(
                "budget must be a non-negative number of hours, got {}",
                request.budget_hours
            )));
        }

        let task = self.store.get(&request.task_id).await?;
        if task.status != TaskStatus::Completed {
            return Err(PrioritizationError::TaskNotCompleted(task.task_id, task.status));
        }
        let result = task
            .result
            .ok_or_else(|| PrioritizationError::InsufficientData(request.task_id.clone()))?;

        let findings: Vec<&Finding> = result.sentiment_analysis.all_findings().collect();
        if findings.is_empty() {
            return Err(PrioritizationError::InsufficientData(request.task_id.clone()));
        }

        let hours = estimate_hours(&findings, self.effort_estimator.as_deref()).await;
        let plan = build_plan(
            &findings,
            &hours,
            request.method,
            request.sprint_duration_days,
            request.budget_hours,
            &request.business_goal,
        );

        info!(
            task_id = %request.task_id,
            method = %request.method,
            included = plan.summary.included_tasks,
            excluded = plan.summary.excluded_tasks,
            "Prioritization plan built"
        );
        Ok(plan)
    }
}
