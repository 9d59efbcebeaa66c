//! Classification client
//!
//! [`Classifier`] is the seam to the external language model. The Gemini
//! implementation calls `generateContent` over REST in JSON response mode and
//! parses the reply through a strict schema: anything that does not match
//! fails with [`ClassificationError::Schema`].

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{Finding, FindingType, SourceKind};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Findings carry at most this many sample excerpts
pub const MAX_SAMPLE_REVIEWS: usize = 3;

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("Classification service not configured: {0}")]
    NotConfigured(String),

    #[error("Classification request failed: {0}")]
    Transport(String),

    #[error("Classification service returned HTTP {0}: {1}")]
    Status(u16, String),

    #[error("Classification service returned no content")]
    Empty,

    #[error("Classification response did not match schema: {0}")]
    Schema(String),

    #[error("Effort estimation not supported by this classifier")]
    Unsupported,
}

impl ClassificationError {
    /// Transport failures, rate limiting and server errors may succeed on retry
    pub fn is_transient(&self) -> bool {
        match self {
            ClassificationError::Transport(_) | ClassificationError::Empty => true,
            ClassificationError::Status(code, _) => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// One prompt's worth of input
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub product_name: String,
    pub sources: Vec<SourceKind>,
    /// Rendered source sections
    pub corpus_text: String,
    /// Search result links offered as extra context
    pub google_urls: Vec<String>,
    /// "Batch 2 of 3" style note when the corpus is split
    pub batch_note: Option<String>,
}

/// Sentiment split as reported by the model
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelSentiment {
    pub positive_percentage: f64,
    pub negative_percentage: f64,
    pub neutral_percentage: f64,
}

/// Validated model output for one request
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelAnalysis {
    pub overall_sentiment: ModelSentiment,
    pub bugs: Vec<Finding>,
    pub feature_requests: Vec<Finding>,
    pub requirements: Vec<Finding>,
    pub usability_frictions: Vec<Finding>,
    pub pain_points: Vec<Finding>,
    pub positive_reviews: Vec<Finding>,
    pub ai_insights: Vec<Finding>,
    #[serde(default)]
    pub key_insights: Vec<String>,
}

impl ModelAnalysis {
    pub fn arrays(&self) -> [(FindingType, &Vec<Finding>); 7] {
        [
            (FindingType::Bug, &self.bugs),
            (FindingType::FeatureRequest, &self.feature_requests),
            (FindingType::Requirement, &self.requirements),
            (FindingType::UsabilityFriction, &self.usability_frictions),
            (FindingType::PainPoint, &self.pain_points),
            (FindingType::PositiveReview, &self.positive_reviews),
            (FindingType::AiInsight, &self.ai_insights),
        ]
    }
}

/// Work item sent for an effort estimate
#[derive(Debug, Clone)]
pub struct EffortQuery {
    pub finding_type: FindingType,
    pub title: String,
    pub description: String,
}

/// External classification service
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    /// Classify one chunk of corpus text
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ModelAnalysis, ClassificationError>;

    /// Hour estimates for `items`, in the same order
    async fn estimate_effort(&self, _items: &[EffortQuery]) -> Result<Vec<f64>, ClassificationError> {
        Err(ClassificationError::Unsupported)
    }
}

// ============================================================================
// Response cleaning and strict parsing
// ============================================================================

/// Strip control characters and markdown fences, keep the outermost `{...}`
pub fn clean_json_response(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect();

    let trimmed = cleaned.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);

    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if end > start => unfenced[start..=end].to_string(),
        _ => unfenced.trim().to_string(),
    }
}

/// Parse and validate a model reply
pub fn parse_model_response(text: &str) -> Result<ModelAnalysis, ClassificationError> {
    let cleaned = clean_json_response(text);
    if cleaned.is_empty() {
        return Err(ClassificationError::Empty);
    }

    let mut analysis: ModelAnalysis = serde_json::from_str(&cleaned)
        .map_err(|e| ClassificationError::Schema(e.to_string()))?;

    validate(&analysis)?;

    for finding_type in FindingType::ALL {
        for finding in findings_mut(&mut analysis, finding_type) {
            finding.sample_reviews.truncate(MAX_SAMPLE_REVIEWS);
        }
    }
    Ok(analysis)
}

fn findings_mut(analysis: &mut ModelAnalysis, finding_type: FindingType) -> &mut Vec<Finding> {
    match finding_type {
        FindingType::Bug => &mut analysis.bugs,
        FindingType::FeatureRequest => &mut analysis.feature_requests,
        FindingType::Requirement => &mut analysis.requirements,
        FindingType::UsabilityFriction => &mut analysis.usability_frictions,
        FindingType::PainPoint => &mut analysis.pain_points,
        FindingType::PositiveReview => &mut analysis.positive_reviews,
        FindingType::AiInsight => &mut analysis.ai_insights,
    }
}

fn validate(analysis: &ModelAnalysis) -> Result<(), ClassificationError> {
    let s = &analysis.overall_sentiment;
    for (name, value) in [
        ("positive_percentage", s.positive_percentage),
        ("negative_percentage", s.negative_percentage),
        ("neutral_percentage", s.neutral_percentage),
    ] {
        if !(0.0..=100.0).contains(&value) {
            return Err(ClassificationError::Schema(format!(
                "{} out of range: {}",
                name, value
            )));
        }
    }
    let sum = s.positive_percentage + s.negative_percentage + s.neutral_percentage;
    if (sum - 100.0).abs() > 2.0 {
        return Err(ClassificationError::Schema(format!(
            "sentiment percentages sum to {}",
            sum
        )));
    }

    for (expected, findings) in analysis.arrays() {
        for (i, finding) in findings.iter().enumerate() {
            let at = format!("{}[{}]", expected.array_name(), i);
            if finding.finding_type != expected {
                return Err(ClassificationError::Schema(format!(
                    "{} has type '{}'",
                    at, finding.finding_type
                )));
            }
            if finding.title.trim().is_empty() {
                return Err(ClassificationError::Schema(format!("{} has an empty title", at)));
            }
            if !(1..=10).contains(&finding.priority_score) {
                return Err(ClassificationError::Schema(format!(
                    "{} priority_score {} outside 1..=10",
                    at, finding.priority_score
                )));
            }
        }
    }
    Ok(())
}

// ============================================================================
// Prompts
// ============================================================================

pub fn build_prompt(request: &ClassificationRequest) -> String {
    let sources: Vec<&str> = request.sources.iter().map(SourceKind::as_str).collect();
    let urls = if request.google_urls.is_empty() {
        String::new()
    } else {
        let list: Vec<String> = request.google_urls.iter().map(|u| format!("- {}", u)).collect();
        format!(
            "\nGOOGLE SEARCH URLS (additional review context):\n{}\n",
            list.join("\n")
        )
    };
    let batch_note = request
        .batch_note
        .as_deref()
        .map(|n| format!("\n{}\n", n))
        .unwrap_or_default();

    format!(
        r#"You are an expert app analyst specializing in user feedback analysis.

PRODUCT: {product}
SOURCES: {sources}

TASKS:
1. Analyze ALL reviews and discussions in the data below.
2. Categorize EVERY finding into exactly ONE of these 7 types:
   - bug: technical issues, crashes, errors, broken features
   - feature_request: user-requested new features or enhancements
   - requirement: must-have features users expect but are missing
   - usability_friction: UX issues that frustrate users
   - pain_point: general problems causing user dissatisfaction
   - positive_review: things users love, praise and appreciate
   - ai_insight: patterns, trends or correlations you identify across sources
3. Estimate the overall sentiment split (percentages summing to 100).
4. Summarize up to 5 key insights.

OUTPUT: a single JSON object, no markdown, with exactly these keys:
{{
  "overall_sentiment": {{"positive_percentage": 0-100, "negative_percentage": 0-100, "neutral_percentage": 0-100}},
  "bugs": [FINDING], "feature_requests": [FINDING], "requirements": [FINDING],
  "usability_frictions": [FINDING], "pain_points": [FINDING],
  "positive_reviews": [FINDING], "ai_insights": [FINDING],
  "key_insights": ["..."]
}}
FINDING = {{"type": "<one of the 7 types, matching its array>", "category": "short sub-category",
  "title": "non-empty", "description": "...", "frequency": <mentions, integer>,
  "severity": "critical|high|medium|low", "sample_reviews": ["up to 3 excerpts"],
  "recommendation": "...", "priority_score": <1-10, higher is more urgent>,
  "sources": ["google_play_store|apple_app_store|reddit|google_search"]}}
Use an empty array for a type with no findings.
{batch_note}
SCRAPED DATA (pipe-delimited rows, one section per source):
{corpus}
{urls}"#,
        product = request.product_name,
        sources = sources.join(", "),
        batch_note = batch_note,
        corpus = request.corpus_text,
        urls = urls,
    )
}

fn build_effort_prompt(items: &[EffortQuery]) -> String {
    let lines: Vec<String> = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "{} | {} | {} | {}",
                i,
                item.finding_type,
                crate::models::review::sanitize_cell(&item.title),
                crate::models::review::sanitize_cell(&item.description)
            )
        })
        .collect();

    format!(
        r#"You are a senior engineering lead. Estimate the developer hours needed for each work item.

ITEMS (index | type | title | description):
{}

OUTPUT: a single JSON object, no markdown: {{"estimates": [{{"index": <int>, "hours": <number > 0>}}]}}
Return exactly one estimate per item."#,
        lines.join("\n")
    )
}

#[derive(Debug, Deserialize)]
struct EffortReply {
    estimates: Vec<EffortEstimate>,
}

#[derive(Debug, Deserialize)]
struct EffortEstimate {
    index: usize,
    hours: f64,
}

/// Parse an effort reply; every item needs one positive estimate
pub fn parse_effort_response(text: &str, expected: usize) -> Result<Vec<f64>, ClassificationError> {
    let reply: EffortReply = serde_json::from_str(&clean_json_response(text))
        .map_err(|e| ClassificationError::Schema(e.to_string()))?;

    let mut hours = vec![None; expected];
    for estimate in reply.estimates {
        if estimate.index >= expected || !(estimate.hours.is_finite() && estimate.hours > 0.0) {
            return Err(ClassificationError::Schema(format!(
                "invalid estimate for item {}",
                estimate.index
            )));
        }
        hours[estimate.index] = Some(estimate.hours);
    }

    hours
        .into_iter()
        .enumerate()
        .map(|(i, h)| h.ok_or_else(|| ClassificationError::Schema(format!("no estimate for item {}", i))))
        .collect()
}

// ============================================================================
// Gemini client
// ============================================================================

/// Gemini client settings
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Total attempts per request, transient failures only
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash-lite".to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
            max_attempts: 2,
            retry_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(300),
        }
    }
}

pub struct GeminiClassifier {
    http_client: reqwest::Client,
    settings: GeminiSettings,
}

impl GeminiClassifier {
    pub fn new(settings: GeminiSettings) -> Result<Self, ClassificationError> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| ClassificationError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            settings,
        })
    }

    /// Send a prompt and return the reply text, retrying transient failures
    async fn generate(&self, prompt: &str) -> Result<String, ClassificationError> {
        if !sts_common::config::is_valid_key(&self.settings.api_key) {
            return Err(ClassificationError::NotConfigured(
                "Gemini API key is empty".to_string(),
            ));
        }

        let attempts = self.settings.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.generate_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(attempt, max_attempts = attempts, error = %e, "Gemini request failed, retrying");
                    tokio::time::sleep(self.settings.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, ClassificationError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        );
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {"responseMimeType": "application/json", "temperature": 0.2}
        });

        debug!(model = %self.settings.model, prompt_chars = prompt.len(), "Sending Gemini request");

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassificationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClassificationError::Status(status.as_u16(), error_text));
        }

        let reply: Value = response
            .json()
            .await
            .map_err(|e| ClassificationError::Transport(e.to_string()))?;
        extract_text(&reply)
    }
}

/// Concatenate the text parts of the first candidate
pub fn extract_text(reply: &Value) -> Result<String, ClassificationError> {
    let text: String = reply
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(ClassificationError::Empty)
    } else {
        Ok(text)
    }
}

#[async_trait::async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ModelAnalysis, ClassificationError> {
        let prompt = build_prompt(request);
        info!(
            model = %self.settings.model,
            product = %request.product_name,
            chars = prompt.len(),
            "Classifying reviews"
        );

        let text = self.generate(&prompt).await?;
        let analysis = parse_model_response(&text)?;

        info!(
            findings = analysis.arrays().iter().map(|(_, f)| f.len()).sum::<usize>(),
            "Classification response parsed"
        );
        Ok(analysis)
    }

    async fn estimate_effort(&self, items: &[EffortQuery]) -> Result<Vec<f64>, ClassificationError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let text = self.generate(&build_effort_prompt(items)).await?;
        parse_effort_response(&text, items.len())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "overall_sentiment": {"positive_percentage": 60, "negative_percentage": 30, "neutral_percentage": 10},
        "bugs": [{"type": "bug", "category": "stability", "title": "Crash on launch", "description": "App closes",
                  "frequency": 12, "severity": "critical", "sample_reviews": ["a", "b", "c", "d"],
                  "recommendation": "Fix it", "priority_score": 9, "sources": ["google_play_store"]}],
        "feature_requests": [], "requirements": [], "usability_frictions": [],
        "pain_points": [], "positive_reviews": [], "ai_insights": [],
        "key_insights": ["Stability is the top complaint"]
    }"#;

    #[test]
    fn test_clean_json_response() {
        assert_eq!(clean_json_response("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(clean_json_response("Here you go: {\"a\": {}} thanks"), "{\"a\": {}}");
        assert_eq!(clean_json_response("{\u{0007}\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_valid_response() {
        let analysis = parse_model_response(VALID).unwrap();
        assert_eq!(analysis.bugs.len(), 1);
        assert_eq!(analysis.bugs[0].sample_reviews.len(), MAX_SAMPLE_REVIEWS);
        assert_eq!(analysis.key_insights.len(), 1);
    }

    #[test]
    fn test_missing_array_is_schema_error() {
        let text = VALID.replace("\"pain_points\": [],", "");
        assert!(matches!(
            parse_model_response(&text),
            Err(ClassificationError::Schema(_))
        ));
    }

    #[test]
    fn test_type_must_match_array() {
        let text = VALID.replace("\"type\": \"bug\"", "\"type\": \"pain_point\"");
        let err = parse_model_response(&text).unwrap_err();
        assert!(err.to_string().contains("bugs[0]"));
    }

    #[test]
    fn test_unknown_severity_rejected() {
        let text = VALID.replace("\"critical\"", "\"urgent\"");
        assert!(matches!(
            parse_model_response(&text),
            Err(ClassificationError::Schema(_))
        ));
    }

    #[test]
    fn test_priority_and_sentiment_ranges() {
        let text = VALID.replace("\"priority_score\": 9", "\"priority_score\": 0");
        assert!(parse_model_response(&text).is_err());

        let text = VALID.replace("\"neutral_percentage\": 10", "\"neutral_percentage\": 40");
        assert!(parse_model_response(&text).is_err());
    }

    #[test]
    fn test_empty_reply() {
        assert!(matches!(
            parse_model_response("```\n```"),
            Err(ClassificationError::Empty)
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ClassificationError::Status(503, String::new()).is_transient());
        assert!(ClassificationError::Status(429, String::new()).is_transient());
        assert!(!ClassificationError::Status(400, String::new()).is_transient());
        assert!(!ClassificationError::Schema(String::new()).is_transient());
    }

    #[test]
    fn test_extract_text() {
        let reply = json!({"candidates": [{"content": {"parts": [{"text": "{\"a\""}, {"text": ": 1}"}]}}]});
        assert_eq!(extract_text(&reply).unwrap(), "{\"a\": 1}");
        assert!(matches!(
            extract_text(&json!({"candidates": []})),
            Err(ClassificationError::Empty)
        ));
    }

    #[test]
    fn test_parse_effort_response() {
        let hours = parse_effort_response(
            r#"{"estimates": [{"index": 1, "hours": 4}, {"index": 0, "hours": 2.5}]}"#,
            2,
        )
        .unwrap();
        assert_eq!(hours, vec![2.5, 4.0]);

        assert!(parse_effort_response(r#"{"estimates": [{"index": 0, "hours": 1}]}"#, 2).is_err());
        assert!(parse_effort_response(r#"{"estimates": [{"index": 0, "hours": -1}]}"#, 1).is_err());
    }

    #[test]
    fn test_prompt_mentions_urls_and_batch() {
        let prompt = build_prompt(&ClassificationRequest {
            product_name: "Spotify".to_string(),
            sources: vec![SourceKind::Reddit],
            corpus_text: "ROWS".to_string(),
            google_urls: vec!["https://a.example".to_string()],
            batch_note: Some("Batch 1 of 2".to_string()),
        });
        assert!(prompt.contains("PRODUCT: Spotify"));
        assert!(prompt.contains("- https://a.example"));
        assert!(prompt.contains("Batch 1 of 2"));
        assert!(prompt.contains("ROWS"));
    }

    #[tokio::test]
    async fn test_missing_key_not_configured() {
        let classifier = GeminiClassifier::new(GeminiSettings::default()).unwrap();
        let result = classifier.estimate_effort(&[EffortQuery {
            finding_type: FindingType::Bug,
            title: "t".to_string(),
            description: "d".to_string(),
        }])
        .await;
        assert!(matches!(result, Err(ClassificationError::NotConfigured(_))));
    }
}
