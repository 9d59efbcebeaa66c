//! Data models for sts-api
//!
//! - Task records and stored analysis results
//! - Raw review records per source
//! - Classified findings and prioritization plans

pub mod finding;
pub mod plan;
pub mod review;
pub mod task;

pub use finding::{
    Finding, FindingType, OverallSentiment, PriorityAction, SentimentAnalysis, Severity,
    SummaryCounts,
};
pub use plan::{
    PlanCategory, PlanMetadata, PlanSummary, PlanTask, PrioritizationMethod, PrioritizationPlan,
};
pub use review::{
    AppleReview, GooglePlayReview, RedditPost, ReviewRecord, SearchResult, SourceBatch, SourceKind,
};
pub use task::{AnalysisResult, SourceSummary, Task, TaskUpdate};
