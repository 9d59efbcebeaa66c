//! Prioritization plan produced for a completed task

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::FindingType;

/// Prioritization framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrioritizationMethod {
    #[serde(rename = "MoSCoW")]
    MoSCoW,
    #[serde(rename = "Lean")]
    Lean,
}

impl fmt::Display for PrioritizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrioritizationMethod::MoSCoW => f.write_str("MoSCoW"),
            PrioritizationMethod::Lean => f.write_str("Lean"),
        }
    }
}

impl FromStr for PrioritizationMethod {
    type Err = String;

    /// Case-insensitive; "Lean Prioritization" is accepted as Lean
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "moscow" => Ok(PrioritizationMethod::MoSCoW),
            "lean" | "lean prioritization" => Ok(PrioritizationMethod::Lean),
            other => Err(format!(
                "Unknown prioritization method '{}': expected MoSCoW or Lean",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub method: PrioritizationMethod,
    pub goal: String,
    pub budget_hours: f64,
    pub sprint_duration_days: u32,
}

/// One scheduled (or unscheduled) piece of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTask {
    pub title: String,
    #[serde(rename = "type")]
    pub finding_type: FindingType,
    pub impact_reasoning: String,
    pub estimated_hours: f64,
    pub impact_score: f64,
    /// Fits within the budget
    pub included: bool,
}

/// A bucket (MoSCoW group or Lean quadrant) in display order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanCategory {
    pub category_name: String,
    pub tasks: Vec<PlanTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Hours over included tasks only
    pub total_estimated_hours: f64,
    pub budget_utilization_percentage: f64,
    pub included_tasks: usize,
    pub excluded_tasks: usize,
    pub key_risks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritizationPlan {
    pub plan_metadata: PlanMetadata,
    pub prioritized_categories: Vec<PlanCategory>,
    pub summary: PlanSummary,
}

impl PrioritizationPlan {
    pub fn category(&self, name: &str) -> Option<&PlanCategory> {
        self.prioritized_categories
            .iter()
            .find(|c| c.category_name == name)
    }

    pub fn included_tasks(&self) -> impl Iterator<Item = &PlanTask> {
        self.prioritized_categories
            .iter()
            .flat_map(|c| c.tasks.iter())
            .filter(|t| t.included)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!("MoSCoW".parse(), Ok(PrioritizationMethod::MoSCoW));
        assert_eq!("moscow".parse(), Ok(PrioritizationMethod::MoSCoW));
        assert_eq!("LEAN".parse(), Ok(PrioritizationMethod::Lean));
        assert_eq!(
            "Lean Prioritization".parse(),
            Ok(PrioritizationMethod::Lean)
        );
        assert!("kano".parse::<PrioritizationMethod>().is_err());
    }
}
