//! Classified findings and the sentiment analysis they roll up into

use serde::{Deserialize, Serialize};
use std::fmt;

/// The seven fixed finding categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    Bug,
    FeatureRequest,
    Requirement,
    UsabilityFriction,
    PainPoint,
    PositiveReview,
    AiInsight,
}

impl FindingType {
    pub const ALL: [FindingType; 7] = [
        FindingType::Bug,
        FindingType::FeatureRequest,
        FindingType::Requirement,
        FindingType::UsabilityFriction,
        FindingType::PainPoint,
        FindingType::PositiveReview,
        FindingType::AiInsight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FindingType::Bug => "bug",
            FindingType::FeatureRequest => "feature_request",
            FindingType::Requirement => "requirement",
            FindingType::UsabilityFriction => "usability_friction",
            FindingType::PainPoint => "pain_point",
            FindingType::PositiveReview => "positive_review",
            FindingType::AiInsight => "ai_insight",
        }
    }

    /// Name of the result array holding findings of this type
    pub fn array_name(&self) -> &'static str {
        match self {
            FindingType::Bug => "bugs",
            FindingType::FeatureRequest => "feature_requests",
            FindingType::Requirement => "requirements",
            FindingType::UsabilityFriction => "usability_frictions",
            FindingType::PainPoint => "pain_points",
            FindingType::PositiveReview => "positive_reviews",
            FindingType::AiInsight => "ai_insights",
        }
    }
}

impl fmt::Display for FindingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// critical 4, high 3, medium 2, low 1
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 4,
            Severity::High => 3,
            Severity::Medium => 2,
            Severity::Low => 1,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        })
    }
}

/// One categorized insight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub finding_type: FindingType,
    /// Free-form sub-category chosen by the classifier (e.g. "performance")
    #[serde(default)]
    pub category: String,
    pub title: String,
    pub description: String,
    pub frequency: u32,
    pub severity: Severity,
    /// Up to three verbatim excerpts
    #[serde(default)]
    pub sample_reviews: Vec<String>,
    #[serde(default)]
    pub recommendation: String,
    /// 1-10, higher is more urgent
    pub priority_score: u8,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Sentiment split over all analyzed reviews
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallSentiment {
    pub positive_percentage: f64,
    pub negative_percentage: f64,
    pub neutral_percentage: f64,
    /// Mean star rating over app store records, 0 when there are none
    pub average_rating: f64,
    pub total_reviews_analyzed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub bugs: usize,
    pub features: usize,
    pub requirements: usize,
    pub usability: usize,
    pub pain_points: usize,
    pub positive: usize,
    pub ai_insights: usize,
}

impl SummaryCounts {
    pub fn total(&self) -> usize {
        self.bugs
            + self.features
            + self.requirements
            + self.usability
            + self.pain_points
            + self.positive
            + self.ai_insights
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityAction {
    pub action: String,
    pub reason: String,
    pub expected_impact: String,
    pub effort_required: String,
}

/// Full classification output for one task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    pub overall_sentiment: OverallSentiment,
    pub summary_counts: SummaryCounts,
    pub bugs: Vec<Finding>,
    pub feature_requests: Vec<Finding>,
    pub requirements: Vec<Finding>,
    pub usability_frictions: Vec<Finding>,
    pub pain_points: Vec<Finding>,
    pub positive_reviews: Vec<Finding>,
    pub ai_insights: Vec<Finding>,
    pub priority_actions: Vec<PriorityAction>,
    pub key_insights: Vec<String>,
}

impl SentimentAnalysis {
    pub fn findings_of(&self, finding_type: FindingType) -> &[Finding] {
        match finding_type {
            FindingType::Bug => &self.bugs,
            FindingType::FeatureRequest => &self.feature_requests,
            FindingType::Requirement => &self.requirements,
            FindingType::UsabilityFriction => &self.usability_frictions,
            FindingType::PainPoint => &self.pain_points,
            FindingType::PositiveReview => &self.positive_reviews,
            FindingType::AiInsight => &self.ai_insights,
        }
    }

    pub fn findings_of_mut(&mut self, finding_type: FindingType) -> &mut Vec<Finding> {
        match finding_type {
            FindingType::Bug => &mut self.bugs,
            FindingType::FeatureRequest => &mut self.feature_requests,
            FindingType::Requirement => &mut self.requirements,
            FindingType::UsabilityFriction => &mut self.usability_frictions,
            FindingType::PainPoint => &mut self.pain_points,
            FindingType::PositiveReview => &mut self.positive_reviews,
            FindingType::AiInsight => &mut self.ai_insights,
        }
    }

    /// All findings flattened in category order, then array order
    pub fn all_findings(&self) -> impl Iterator<Item = &Finding> {
        FindingType::ALL
            .into_iter()
            .flat_map(move |t| self.findings_of(t).iter())
    }

    pub fn finding_count(&self) -> usize {
        FindingType::ALL
            .iter()
            .map(|t| self.findings_of(*t).len())
            .sum()
    }
}
