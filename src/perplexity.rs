//! Perplexity of human and generated reviews under a reference model.

use std::fmt;
use std::path::Path;

use anyhow::Result;
use indicatif::ProgressIterator;
use log::{info, warn};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::generation::{GenerationError, build_http_client, check_status};
use crate::rate_limit::{RateLimiter, RetryPolicy, call_with_retry};
use crate::structs::ReviewEntry;
use crate::utils::progress_bar;
use crate::writer::write_rows;

pub const GROQ_ENDPOINT: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_SCORING_MODEL: &str = "llama-3.1-8b-instant";
pub const ANALYZED_REVIEWS_FILE: &str = "analyzed_reviews.csv";
/// Upper bound applied to scores before summarising, so a few degenerate
/// texts do not dominate the mean.
pub const SUMMARY_CLIP: f64 = 150.0;

pub const ANALYZED_COLUMNS: [&str; 10] = [
    "text",
    "product_title",
    "rating",
    "timestamp",
    "user_id",
    "asin",
    "label",
    "pair_id",
    "source",
    "perplexity",
];

/// `exp(-mean(logprobs))`, or `None` for an empty sequence.
pub fn perplexity(logprobs: &[f64]) -> Option<f64> {
    if logprobs.is_empty() {
        return None;
    }
    let mean = logprobs.iter().sum::<f64>() / logprobs.len() as f64;
    Some((-mean).exp())
}

pub trait LogprobScorer {
    /// Token log-probabilities the service reports for `text`.
    fn token_logprobs(&self, model: &str, text: &str) -> Result<Vec<f64>, GenerationError>;
}

/// Chat-completions client for the Groq OpenAI-compatible API.
pub struct GroqClient {
    http: Client,
    api_key: String,
    endpoint: String,
}

impl GroqClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, GenerationError> {
        Ok(Self {
            http: build_http_client()?,
            api_key: api_key.into(),
            endpoint: GROQ_ENDPOINT.to_owned(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    logprobs: Option<ChoiceLogprobs>,
}

#[derive(Debug, Deserialize)]
struct ChoiceLogprobs {
    #[serde(default)]
    content: Option<Vec<TokenLogprob>>,
}

#[derive(Debug, Deserialize)]
struct TokenLogprob {
    logprob: f64,
}

impl ChatCompletion {
    fn into_logprobs(self) -> Vec<f64> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.logprobs)
            .and_then(|logprobs| logprobs.content)
            .map(|tokens| tokens.into_iter().map(|token| token.logprob).collect())
            .unwrap_or_default()
    }
}

impl LogprobScorer for GroqClient {
    fn token_logprobs(&self, model: &str, text: &str) -> Result<Vec<f64>, GenerationError> {
        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));
        let body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": text }],
            "max_tokens": 1,
            "logprobs": true,
            "top_logprobs": 1,
        });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;
        let completion: ChatCompletion = check_status(response)?
            .json()
            .map_err(|e| GenerationError::Parse(e.to_string()))?;
        Ok(completion.into_logprobs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Human,
    #[serde(rename = "AI")]
    Ai,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Human => f.write_str("Human"),
            Source::Ai => f.write_str("AI"),
        }
    }
}

/// A review row with its score. `perplexity` is empty when the text was
/// blank or scoring failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedReview {
    pub text: String,
    pub product_title: String,
    pub rating: u8,
    pub timestamp: Option<i64>,
    pub user_id: String,
    pub asin: String,
    pub label: crate::structs::Label,
    pub pair_id: Option<u64>,
    pub source: Source,
    pub perplexity: Option<f64>,
}

impl AnalyzedReview {
    fn new(entry: ReviewEntry, source: Source, perplexity: Option<f64>) -> Self {
        Self {
            text: entry.text,
            product_title: entry.product_title,
            rating: entry.rating,
            timestamp: entry.timestamp,
            user_id: entry.user_id,
            asin: entry.asin,
            label: entry.label,
            pair_id: entry.pair_id,
            source,
            perplexity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoringSettings {
    pub model: String,
    pub retry: RetryPolicy,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_SCORING_MODEL.to_owned(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Scores every review in order. Failures are logged and leave the score
/// empty; blank texts are not sent.
pub fn score_reviews<S, L>(
    reviews: Vec<(Source, ReviewEntry)>,
    scorer: &S,
    limiter: &mut L,
    settings: &ScoringSettings,
) -> Result<Vec<AnalyzedReview>>
where
    S: LogprobScorer + ?Sized,
    L: RateLimiter + ?Sized,
{
    info!("Calculating perplexity for {} reviews", reviews.len());
    let bar = progress_bar(reviews.len(), "Scoring")?;
    let mut analyzed = Vec::with_capacity(reviews.len());

    for (source, entry) in reviews.into_iter().progress_with(bar) {
        let score = if entry.text.trim().is_empty() {
            None
        } else {
            match call_with_retry(limiter, &settings.retry, || {
                scorer.token_logprobs(&settings.model, &entry.text)
            }) {
                Ok(logprobs) => perplexity(&logprobs),
                Err(e) => {
                    warn!("API error for {} review of {}: {e}", source, entry.asin);
                    None
                }
            }
        };
        analyzed.push(AnalyzedReview::new(entry, source, score));
    }
    Ok(analyzed)
}

pub fn write_analyzed(path: &Path, rows: &[AnalyzedReview]) -> Result<()> {
    write_rows(path, &ANALYZED_COLUMNS, rows)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerplexitySummary {
    pub source: Source,
    pub scored: usize,
    pub unscored: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
}

fn median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2]),
        _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
    }
}

/// Per-source statistics over scores clipped at `clip`.
pub fn summarize(rows: &[AnalyzedReview], clip: f64) -> Vec<PerplexitySummary> {
    [Source::Human, Source::Ai]
        .into_iter()
        .map(|source| {
            let of_source = rows.iter().filter(|row| row.source == source);
            let mut scores: Vec<f64> = of_source
                .clone()
                .filter_map(|row| row.perplexity)
                .map(|score| score.min(clip))
                .collect();
            scores.sort_by(f64::total_cmp);
            let mean = (!scores.is_empty())
                .then(|| scores.iter().sum::<f64>() / scores.len() as f64);
            PerplexitySummary {
                source,
                scored: scores.len(),
                unscored: of_source.count() - scores.len(),
                mean,
                median: median(&scores),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::tests::RecordingLimiter;
    use crate::writer::read_rows;
    use std::cell::RefCell;
    use tempfile::tempdir;

    struct FixedScorer {
        logprobs: Vec<f64>,
        fail_on: Option<&'static str>,
        seen: RefCell<Vec<String>>,
    }

    impl LogprobScorer for FixedScorer {
        fn token_logprobs(&self, _model: &str, text: &str) -> Result<Vec<f64>, GenerationError> {
            self.seen.borrow_mut().push(text.to_owned());
            if self.fail_on == Some(text) {
                return Err(GenerationError::Api {
                    status: 500,
                    message: "down".into(),
                });
            }
            Ok(self.logprobs.clone())
        }
    }

    fn entry(text: &str) -> ReviewEntry {
        ReviewEntry::human(text, "Widget", 5, Some(1), "u1", "A1")
    }

    #[test]
    fn test_perplexity_is_exp_of_negative_mean() {
        assert_eq!(perplexity(&[]), None);
        assert!((perplexity(&[0.0, 0.0]).unwrap() - 1.0).abs() < 1e-12);
        let score = perplexity(&[-1.0, -3.0]).unwrap();
        assert!((score - 2.0f64.exp()).abs() < 1e-9);
    }

    #[test]
    fn test_completion_logprobs_are_extracted() {
        let completion: ChatCompletion = serde_json::from_str(
            r#"{"choices": [{"logprobs": {"content": [
                {"token": "Hi", "logprob": -0.5, "top_logprobs": []},
                {"token": "!", "logprob": -1.5, "top_logprobs": []}
            ]}}]}"#,
        )
        .unwrap();
        assert_eq!(completion.into_logprobs(), vec![-0.5, -1.5]);

        let completion: ChatCompletion =
            serde_json::from_str(r#"{"choices": [{"logprobs": null}]}"#).unwrap();
        assert!(completion.into_logprobs().is_empty());
    }

    #[test]
    fn test_scoring_skips_blank_text_and_survives_failures() {
        let scorer = FixedScorer {
            logprobs: vec![-2.0],
            fail_on: Some("bad"),
            seen: RefCell::new(Vec::new()),
        };
        let mut limiter = RecordingLimiter::default();
        let rows = score_reviews(
            vec![
                (Source::Human, entry("good")),
                (Source::Human, entry("  ")),
                (Source::Ai, entry("bad")),
            ],
            &scorer,
            &mut limiter,
            &ScoringSettings::default(),
        )
        .unwrap();

        assert_eq!(rows.len(), 3);
        assert!((rows[0].perplexity.unwrap() - 2.0f64.exp()).abs() < 1e-9);
        assert_eq!(rows[1].perplexity, None);
        assert_eq!(rows[2].perplexity, None);
        assert_eq!(rows[2].source, Source::Ai);
        assert_eq!(*scorer.seen.borrow(), vec!["good", "bad"]);
        assert_eq!(limiter.acquired, 2);
    }

    #[test]
    fn test_summary_clips_and_counts() {
        let row = |source, perplexity| AnalyzedReview::new(entry("t"), source, perplexity);
        let rows = vec![
            row(Source::Human, Some(10.0)),
            row(Source::Human, Some(400.0)),
            row(Source::Human, Some(20.0)),
            row(Source::Human, None),
            row(Source::Ai, Some(4.0)),
            row(Source::Ai, Some(6.0)),
        ];
        let summary = summarize(&rows, SUMMARY_CLIP);

        assert_eq!(summary[0].source, Source::Human);
        assert_eq!(summary[0].scored, 3);
        assert_eq!(summary[0].unscored, 1);
        assert_eq!(summary[0].median, Some(20.0));
        assert!((summary[0].mean.unwrap() - 60.0).abs() < 1e-9);
        assert_eq!(summary[1].median, Some(5.0));
        assert_eq!(summary[1].mean, Some(5.0));
    }

    #[test]
    fn test_summary_of_missing_source_is_empty() {
        let summary = summarize(&[], SUMMARY_CLIP);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[1].scored, 0);
        assert_eq!(summary[1].mean, None);
        assert_eq!(summary[1].median, None);
    }

    #[test]
    fn test_analyzed_rows_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(ANALYZED_REVIEWS_FILE);
        let rows = vec![
            AnalyzedReview::new(entry("a"), Source::Human, Some(12.5)),
            AnalyzedReview::new(entry("b"), Source::Ai, None),
        ];
        write_analyzed(&path, &rows).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("text,product_title,rating,timestamp,user_id,asin,label,pair_id,source,perplexity"));
        assert!(contents.contains(",AI,"));
        let back: Vec<AnalyzedReview> = read_rows(&path).unwrap();
        assert_eq!(back, rows);
    }
}
