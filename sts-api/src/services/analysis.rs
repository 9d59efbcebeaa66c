//! Corpus classification and derived analysis fields
//!
//! The corpus is rendered into one or more prompt chunks, each chunk is
//! classified in turn, and the per-chunk replies are merged into a single
//! [`SentimentAnalysis`]. Counts, the average rating and priority actions are
//! computed locally rather than trusted from the model.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::classifier::{ClassificationError, ClassificationRequest, Classifier, ModelAnalysis};
use super::corpus::MergedCorpus;
use crate::models::{
    Finding, FindingType, OverallSentiment, PriorityAction, SentimentAnalysis, Severity,
    SummaryCounts,
};

/// Search links forwarded to the model as extra context
pub const MAX_GOOGLE_URLS: usize = 15;
pub const MAX_KEY_INSIGHTS: usize = 10;
pub const MAX_PRIORITY_ACTIONS: usize = 7;

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Prompt size above which the corpus is split
    pub max_chars_per_request: usize,
    /// Pause between consecutive batch requests
    pub batch_delay: Duration,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            max_chars_per_request: 600_000,
            batch_delay: Duration::from_millis(7000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub analysis: SentimentAnalysis,
    /// "single_request" or "batch_processing (N batches)"
    pub processing_mode: String,
}

/// Classify the whole corpus and derive the summary fields
pub async fn analyze_corpus(
    classifier: Arc<dyn Classifier>,
    product_name: &str,
    corpus: &MergedCorpus,
    settings: &AnalysisSettings,
) -> Result<AnalysisOutcome, ClassificationError> {
    let chunks = corpus.render_batches(settings.max_chars_per_request.max(1));
    let google_urls = corpus.google_urls(MAX_GOOGLE_URLS);
    let total = chunks.len();

    let processing_mode = if total <= 1 {
        "single_request".to_string()
    } else {
        format!("batch_processing ({} batches)", total)
    };
    info!(product = %product_name, batches = total, records = corpus.total_records(), "Starting classification");

    let mut replies = Vec::with_capacity(total);
    for (i, chunk) in chunks.into_iter().enumerate() {
        if i > 0 && !settings.batch_delay.is_zero() {
            debug!(delay_ms = settings.batch_delay.as_millis() as u64, "Pausing between batches");
            tokio::time::sleep(settings.batch_delay).await;
        }

        let request = ClassificationRequest {
            product_name: product_name.to_string(),
            sources: corpus.sources(),
            corpus_text: chunk.text,
            google_urls: google_urls.clone(),
            batch_note: (total > 1).then(|| {
                format!(
                    "NOTE: this is batch {} of {}. Analyze only the data in this batch.",
                    i + 1,
                    total
                )
            }),
        };
        let reply = classifier.classify(&request).await?;
        debug!(batch = i + 1, of = total, "Batch classified");
        replies.push((chunk.records, reply));
    }

    let mut analysis = merge_replies(replies);
    analysis.overall_sentiment.average_rating = round2(corpus.average_rating());
    analysis.overall_sentiment.total_reviews_analyzed = corpus.total_records();
    analysis.summary_counts = summary_counts(&analysis);
    analysis.priority_actions = priority_actions(&analysis);

    Ok(AnalysisOutcome {
        analysis,
        processing_mode,
    })
}

/// Concatenate arrays, weight sentiment by record count, dedup insights
pub fn merge_replies(replies: Vec<(usize, ModelAnalysis)>) -> SentimentAnalysis {
    let mut merged = SentimentAnalysis::default();
    let total_weight: usize = replies.iter().map(|(n, _)| (*n).max(1)).sum();
    let mut seen_insights = HashSet::new();

    let mut positive = 0.0;
    let mut negative = 0.0;
    let mut neutral = 0.0;

    for (records, reply) in replies {
        let weight = records.max(1) as f64 / total_weight.max(1) as f64;
        positive += reply.overall_sentiment.positive_percentage * weight;
        negative += reply.overall_sentiment.negative_percentage * weight;
        neutral += reply.overall_sentiment.neutral_percentage * weight;

        for insight in &reply.key_insights {
            let key = insight.trim().to_lowercase();
            if !key.is_empty()
                && merged.key_insights.len() < MAX_KEY_INSIGHTS
                && seen_insights.insert(key)
            {
                merged.key_insights.push(insight.trim().to_string());
            }
        }

        for (finding_type, findings) in reply.arrays() {
            merged
                .findings_of_mut(finding_type)
                .extend(findings.iter().cloned());
        }
    }

    merged.overall_sentiment = OverallSentiment {
        positive_percentage: round2(positive),
        negative_percentage: round2(negative),
        neutral_percentage: round2(neutral),
        ..OverallSentiment::default()
    };
    merged
}

pub fn summary_counts(analysis: &SentimentAnalysis) -> SummaryCounts {
    SummaryCounts {
        bugs: analysis.bugs.len(),
        features: analysis.feature_requests.len(),
        requirements: analysis.requirements.len(),
        usability: analysis.usability_frictions.len(),
        pain_points: analysis.pain_points.len(),
        positive: analysis.positive_reviews.len(),
        ai_insights: analysis.ai_insights.len(),
    }
}

/// Top critical bugs, requirements and usability frictions, most urgent first
pub fn priority_actions(analysis: &SentimentAnalysis) -> Vec<PriorityAction> {
    let mut picked: Vec<(u8, PriorityAction)> = Vec::new();

    let critical_bugs: Vec<&Finding> = analysis
        .bugs
        .iter()
        .filter(|f| f.severity == Severity::Critical)
        .collect();
    for bug in top_by_priority(critical_bugs, 3) {
        picked.push((
            bug.priority_score,
            PriorityAction {
                action: format!("Fix critical bug: {}", bug.title),
                reason: format!("Critical severity with {} mentions", bug.frequency),
                expected_impact: "high".to_string(),
                effort_required: "high".to_string(),
            },
        ));
    }

    for req in top_by_priority(analysis.findings_of(FindingType::Requirement).iter().collect(), 2) {
        picked.push((
            req.priority_score,
            PriorityAction {
                action: format!("Implement required feature: {}", req.title),
                reason: format!("Expected by users ({} mentions)", req.frequency),
                expected_impact: "high".to_string(),
                effort_required: "medium".to_string(),
            },
        ));
    }

    for ux in top_by_priority(
        analysis.findings_of(FindingType::UsabilityFriction).iter().collect(),
        2,
    ) {
        picked.push((
            ux.priority_score,
            PriorityAction {
                action: format!("Fix UX issue: {}", ux.title),
                reason: format!("Causes user frustration ({} mentions)", ux.frequency),
                expected_impact: "medium".to_string(),
                effort_required: "low".to_string(),
            },
        ));
    }

    // stable: equal scores keep bug → requirement → usability order
    picked.sort_by(|a, b| b.0.cmp(&a.0));
    picked
        .into_iter()
        .take(MAX_PRIORITY_ACTIONS)
        .map(|(_, action)| action)
        .collect()
}

fn top_by_priority(mut findings: Vec<&Finding>, n: usize) -> Vec<&Finding> {
    findings.sort_by(|a, b| b.priority_score.cmp(&a.priority_score));
    findings.truncate(n);
    findings
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::finding::fixtures::finding;
    use crate::models::{GooglePlayReview, ReviewRecord, SourceBatch, SourceKind};
    use crate::services::classifier::mock::MockClassifier;
    use crate::services::classifier::ModelSentiment;
    use crate::services::corpus::{merge, SourceOutcome};
    use std::sync::atomic::Ordering;

    fn reply(positive: f64, negative: f64, insights: &[&str]) -> ModelAnalysis {
        ModelAnalysis {
            overall_sentiment: ModelSentiment {
                positive_percentage: positive,
                negative_percentage: negative,
                neutral_percentage: 100.0 - positive - negative,
            },
            bugs: vec![finding(FindingType::Bug, "Crash", 4, Severity::Critical)],
            key_insights: insights.iter().map(|s| s.to_string()).collect(),
            ..ModelAnalysis::default()
        }
    }

    fn corpus(n: usize) -> MergedCorpus {
        let records = (0..n)
            .map(|i| {
                ReviewRecord::GooglePlay(GooglePlayReview {
                    rating: Some(if i % 2 == 0 { 5.0 } else { 3.0 }),
                    snippet: format!("review text {}", i),
                    likes: None,
                    iso_date: None,
                })
            })
            .collect();
        merge(vec![SourceOutcome {
            source: SourceKind::GooglePlay,
            query: "com.example".to_string(),
            result: Ok(SourceBatch::new(SourceKind::GooglePlay, "com.example", records)),
        }])
    }

    #[test]
    fn test_merge_weights_sentiment_by_records() {
        let merged = merge_replies(vec![(30, reply(80.0, 10.0, &["A"])), (10, reply(40.0, 50.0, &["a", "B"]))]);

        assert!((merged.overall_sentiment.positive_percentage - 70.0).abs() < 0.01);
        assert!((merged.overall_sentiment.negative_percentage - 20.0).abs() < 0.01);
        assert_eq!(merged.bugs.len(), 2);
        assert_eq!(merged.key_insights, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_key_insights_capped() {
        let many: Vec<String> = (0..15).map(|i| format!("insight {}", i)).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        let merged = merge_replies(vec![(1, reply(50.0, 50.0, &refs))]);
        assert_eq!(merged.key_insights.len(), MAX_KEY_INSIGHTS);
    }

    #[test]
    fn test_priority_actions_selection() {
        let mut analysis = SentimentAnalysis::default();
        for i in 0..5 {
            let mut bug = finding(FindingType::Bug, &format!("bug {}", i), 10, Severity::Critical);
            bug.priority_score = 5 + i as u8;
            analysis.bugs.push(bug);
        }
        analysis
            .bugs
            .push(finding(FindingType::Bug, "minor", 1, Severity::Low));
        for i in 0..3 {
            analysis
                .requirements
                .push(finding(FindingType::Requirement, &format!("req {}", i), 3, Severity::High));
            analysis.usability_frictions.push(finding(
                FindingType::UsabilityFriction,
                &format!("ux {}", i),
                2,
                Severity::Medium,
            ));
        }

        let actions = priority_actions(&analysis);
        assert_eq!(actions.len(), MAX_PRIORITY_ACTIONS);
        assert_eq!(actions[0].action, "Fix critical bug: bug 4");
        assert_eq!(actions[0].reason, "Critical severity with 10 mentions");
        assert_eq!(
            actions.iter().filter(|a| a.action.starts_with("Fix critical bug")).count(),
            3
        );
        assert!(!actions.iter().any(|a| a.action.ends_with("minor")));
    }

    #[tokio::test]
    async fn test_analyze_single_request() {
        let classifier = Arc::new(MockClassifier::new(reply(60.0, 30.0, &["x"])));
        let outcome = analyze_corpus(classifier.clone(), "Example", &corpus(4), &AnalysisSettings::default())
            .await
            .unwrap();

        assert_eq!(outcome.processing_mode, "single_request");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        let sentiment = &outcome.analysis.overall_sentiment;
        assert_eq!(sentiment.total_reviews_analyzed, 4);
        assert!((sentiment.average_rating - 4.0).abs() < f64::EPSILON);
        assert_eq!(outcome.analysis.summary_counts.bugs, 1);
    }

    #[tokio::test]
    async fn test_analyze_in_batches() {
        let classifier = Arc::new(MockClassifier::new(reply(60.0, 30.0, &[])));
        let settings = AnalysisSettings {
            max_chars_per_request: 300,
            batch_delay: Duration::ZERO,
        };
        let outcome = analyze_corpus(classifier.clone(), "Example", &corpus(40), &settings)
            .await
            .unwrap();

        let calls = classifier.calls.load(Ordering::SeqCst);
        assert!(calls > 1);
        assert_eq!(outcome.processing_mode, format!("batch_processing ({} batches)", calls));
        assert_eq!(outcome.analysis.bugs.len(), calls);
    }

    #[tokio::test]
    async fn test_classification_failure_propagates() {
        let classifier = Arc::new(MockClassifier::failing());
        let result = analyze_corpus(classifier, "Example", &corpus(2), &AnalysisSettings::default()).await;
        assert!(matches!(result, Err(ClassificationError::Schema(_))));
    }
}
