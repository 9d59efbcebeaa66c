//! Effort estimates for prioritization candidates

use tracing::{info, warn};

use super::classifier::{Classifier, EffortQuery};
use crate::models::{Finding, FindingType, Severity};

/// Base hours by finding type
pub fn base_hours(finding_type: FindingType) -> f64 {
    match finding_type {
        FindingType::Bug => 3.0,
        FindingType::FeatureRequest => 8.0,
        FindingType::Requirement => 10.0,
        FindingType::UsabilityFriction => 4.0,
        FindingType::PainPoint => 5.0,
        FindingType::PositiveReview => 1.0,
        FindingType::AiInsight => 6.0,
    }
}

pub fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 5.0,
        Severity::High => 3.0,
        Severity::Medium => 2.0,
        Severity::Low => 1.0,
    }
}

/// `base_hours + severity_weight`
pub fn heuristic_hours(finding: &Finding) -> f64 {
    base_hours(finding.finding_type) + severity_weight(finding.severity)
}

/// Hours per finding, in input order
///
/// With `classifier` set, the model is asked first; any failure or a reply of
/// the wrong length falls back to the heuristic for every finding.
pub async fn estimate_hours(findings: &[&Finding], classifier: Option<&dyn Classifier>) -> Vec<f64> {
    if let Some(classifier) = classifier {
        let queries: Vec<EffortQuery> = findings
            .iter()
            .map(|f| EffortQuery {
                finding_type: f.finding_type,
                title: f.title.clone(),
                description: f.description.clone(),
            })
            .collect();

        match classifier.estimate_effort(&queries).await {
            Ok(hours) if hours.len() == findings.len() => {
                info!(count = hours.len(), "Using model effort estimates");
                return hours;
            }
            Ok(hours) => warn!(
                expected = findings.len(),
                received = hours.len(),
                "Effort estimate count mismatch, using heuristic"
            ),
            Err(e) => warn!(error = %e, "Effort estimation failed, using heuristic"),
        }
    }

    findings.iter().map(|f| heuristic_hours(f)).collect()
}
