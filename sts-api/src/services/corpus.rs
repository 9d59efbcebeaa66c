//! Merging adapter outcomes into one deduplicated review corpus
//!
//! Records are fingerprinted with SHA-256 over the source name and the
//! normalized record text. The first occurrence wins; order is source order
//! as configured, then record order within the source.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::models::{ReviewRecord, SourceBatch, SourceKind, SourceSummary};
use crate::sources::SourceError;

/// Result of running one adapter
#[derive(Debug)]
pub struct SourceOutcome {
    pub source: SourceKind,
    pub query: String,
    pub result: Result<SourceBatch, SourceError>,
}

/// Deduplicated records of all succeeding sources
#[derive(Debug, Clone, Default)]
pub struct MergedCorpus {
    /// Non-empty batches only, in source order
    pub batches: Vec<SourceBatch>,
    /// One entry per enabled source, failed ones included
    pub summaries: Vec<SourceSummary>,
}

/// Trimmed, lowercased, whitespace-collapsed text
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn fingerprint(record: &ReviewRecord) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(record.source().as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize_text(&record.content()).as_bytes());
    hasher.finalize().into()
}

/// Merge outcomes, preserving their order
pub fn merge(outcomes: Vec<SourceOutcome>) -> MergedCorpus {
    let mut seen: HashSet<[u8; 32]> = HashSet::new();
    let mut corpus = MergedCorpus::default();

    for outcome in outcomes {
        match outcome.result {
            Ok(batch) => {
                let fetched = batch.records.len();
                let records: Vec<ReviewRecord> = batch
                    .records
                    .into_iter()
                    .filter(|record| seen.insert(fingerprint(record)))
                    .collect();

                corpus.summaries.push(SourceSummary {
                    source: outcome.source,
                    query: batch.query.clone(),
                    fetched,
                    after_dedup: records.len(),
                    error: None,
                });
                if !records.is_empty() {
                    corpus
                        .batches
                        .push(SourceBatch::new(outcome.source, batch.query, records));
                }
            }
            Err(e) => corpus.summaries.push(SourceSummary {
                source: outcome.source,
                query: outcome.query,
                fetched: 0,
                after_dedup: 0,
                error: Some(e.to_string()),
            }),
        }
    }

    corpus
}

impl MergedCorpus {
    pub fn total_records(&self) -> usize {
        self.batches.iter().map(SourceBatch::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_records() == 0
    }

    /// Sources that contributed records
    pub fn sources(&self) -> Vec<SourceKind> {
        self.batches.iter().map(|b| b.source).collect()
    }

    /// Mean star rating over app store records; 0 when none are rated
    pub fn average_rating(&self) -> f64 {
        let ratings: Vec<f64> = self
            .batches
            .iter()
            .filter(|b| b.source.is_app_store())
            .flat_map(|b| b.records.iter())
            .filter_map(ReviewRecord::rating)
            .filter(|r| *r > 0.0)
            .collect();

        if ratings.is_empty() {
            0.0
        } else {
            ratings.iter().sum::<f64>() / ratings.len() as f64
        }
    }

    /// Google Search result links, at most `max`
    pub fn google_urls(&self, max: usize) -> Vec<String> {
        self.batches
            .iter()
            .flat_map(|b| b.records.iter())
            .filter_map(|r| match r {
                ReviewRecord::GoogleSearch(result) => Some(result.link.clone()),
                _ => None,
            })
            .take(max)
            .collect()
    }

    /// Render the corpus as prompt text, split into chunks of at most
    /// `max_chars` at row boundaries
    ///
    /// Each chunk repeats the header of every section it touches. A single
    /// row longer than `max_chars` gets a chunk of its own.
    pub fn render_batches(&self, max_chars: usize) -> Vec<RenderedBatch> {
        let mut batches = Vec::new();
        let mut current = RenderedBatch::default();

        for batch in &self.batches {
            let header = section_header(batch);
            let mut section_open = false;

            for record in &batch.records {
                let row = record.to_row();
                let needed = row.len() + 1 + if section_open { 0 } else { header.len() };

                if current.records > 0 && current.text.len() + needed > max_chars {
                    batches.push(std::mem::take(&mut current));
                    section_open = false;
                }
                if !section_open {
                    current.text.push_str(&header);
                    section_open = true;
                }
                current.text.push_str(&row);
                current.text.push('\n');
                current.records += 1;
            }
        }

        if current.records > 0 {
            batches.push(current);
        }
        batches
    }
}

/// One chunk of prompt text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedBatch {
    pub text: String,
    /// Rows contained in `text`
    pub records: usize,
}

fn section_header(batch: &SourceBatch) -> String {
    format!(
        "\n=== SOURCE: {} ===\nQuery: {}\nCount: {}\n{}\n",
        batch.source.display_name(),
        batch.query,
        batch.len(),
        batch.source.row_header()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GooglePlayReview, SearchResult};

    fn play(snippet: &str, rating: f64) -> ReviewRecord {
        ReviewRecord::GooglePlay(GooglePlayReview {
            rating: Some(rating),
            snippet: snippet.to_string(),
            likes: None,
            iso_date: None,
        })
    }

    fn search(link: &str) -> ReviewRecord {
        ReviewRecord::GoogleSearch(SearchResult {
            link: link.to_string(),
            title: "t".to_string(),
            snippet: "s".to_string(),
            source: None,
        })
    }

    fn ok(source: SourceKind, records: Vec<ReviewRecord>) -> SourceOutcome {
        SourceOutcome {
            source,
            query: "q".to_string(),
            result: Ok(SourceBatch::new(source, "q", records)),
        }
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Great\n\tAPP  now "), "great app now");
    }

    #[test]
    fn test_dedup_first_seen_wins() {
        let corpus = merge(vec![ok(
            SourceKind::GooglePlay,
            vec![play("Great app", 5.0), play("  great   APP ", 1.0), play("Bad", 1.0)],
        )]);

        assert_eq!(corpus.total_records(), 2);
        assert_eq!(corpus.batches[0].records[0].rating(), Some(5.0));
        assert_eq!(corpus.summaries[0].fetched, 3);
        assert_eq!(corpus.summaries[0].after_dedup, 2);
    }

    #[test]
    fn test_same_text_different_sources_kept() {
        let a = play("same", 3.0);
        let b = ReviewRecord::AppleStore(crate::models::AppleReview {
            title: String::new(),
            text: "same".to_string(),
            rating: Some(3.0),
            review_date: None,
            reviewed_version: None,
        });
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_failed_sources_summarized() {
        let corpus = merge(vec![
            SourceOutcome {
                source: SourceKind::Reddit,
                query: "x Review".to_string(),
                result: Err(SourceError::Timeout(120)),
            },
            ok(SourceKind::GoogleSearch, vec![search("https://a"), search("https://b")]),
        ]);

        assert_eq!(corpus.sources(), vec![SourceKind::GoogleSearch]);
        assert_eq!(corpus.summaries.len(), 2);
        assert_eq!(corpus.summaries[0].error.as_deref(), Some("Timed out after 120s"));
        assert_eq!(corpus.google_urls(1), vec!["https://a".to_string()]);
    }

    #[test]
    fn test_average_rating_app_stores_only() {
        let corpus = merge(vec![
            ok(SourceKind::GooglePlay, vec![play("a", 4.0), play("b", 2.0)]),
            ok(SourceKind::GoogleSearch, vec![search("https://a")]),
        ]);
        assert!((corpus.average_rating() - 3.0).abs() < f64::EPSILON);
        assert_eq!(MergedCorpus::default().average_rating(), 0.0);
    }

    #[test]
    fn test_render_batches_split_at_rows() {
        let records: Vec<ReviewRecord> = (0..50).map(|i| play(&format!("review number {}", i), 4.0)).collect();
        let corpus = merge(vec![ok(SourceKind::GooglePlay, records)]);

        let single = corpus.render_batches(usize::MAX);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].records, 50);

        let split = corpus.render_batches(400);
        assert!(split.len() > 1);
        assert_eq!(split.iter().map(|b| b.records).sum::<usize>(), 50);
        for batch in &split {
            assert!(batch.text.contains("=== SOURCE: Google Play Store ==="));
            assert!(batch.text.len() <= 400);
        }
    }
}
