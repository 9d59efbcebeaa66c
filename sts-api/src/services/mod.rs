//! Task processing services
//!
//! - `corpus`: merge and deduplicate adapter output, render prompt chunks
//! - `classifier`: the external classification client
//! - `analysis`: classify a corpus and derive summary fields
//! - `coordinator`: run a scrape task end to end
//! - `effort` / `prioritization`: turn findings into a budgeted plan

pub mod analysis;
pub mod classifier;
pub mod coordinator;
pub mod corpus;
pub mod effort;
pub mod prioritization;

pub use analysis::{AnalysisOutcome, AnalysisSettings};
pub use classifier::{
    ClassificationError, ClassificationRequest, Classifier, GeminiClassifier, GeminiSettings,
    ModelAnalysis,
};
pub use coordinator::{CoordinatorSettings, ScrapeCoordinator, ScrapeError, ScrapeJob};
pub use corpus::{MergedCorpus, SourceOutcome};
pub use prioritization::{PrioritizationError, PrioritizationRequest, Prioritizer};
