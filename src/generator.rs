use anyhow::Result;
use indicatif::ProgressIterator;
use log::{debug, info, warn};

use crate::generation::{GenerationError, GenerationRequest, TextGenerator};
use crate::prompt::{build_review_prompt, clean_generated_text};
use crate::rate_limit::{RateLimiter, RetryPolicy, call_with_retry};
use crate::structs::{PairedDataset, ReviewEntry};
use crate::utils::{progress_bar, truncate_chars};

pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-pro";

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub retry: RetryPolicy,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_GENERATION_MODEL.to_owned(),
            temperature: None,
            max_output_tokens: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl GenerationSettings {
    pub fn request_for(&self, real: &ReviewEntry) -> GenerationRequest {
        GenerationRequest {
            model: self.model.clone(),
            prompt: build_review_prompt(&real.product_title, real.rating, real.word_count()),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
    }
}

/// Generates one synthetic counterpart for `real`: a single paced request
/// (plus rate-limit retries) followed by cleaning. An output that cleans to
/// nothing counts as a failure.
pub fn generate_counterpart<G, L>(
    real: &ReviewEntry,
    generator: &G,
    limiter: &mut L,
    settings: &GenerationSettings,
) -> Result<String, GenerationError>
where
    G: TextGenerator + ?Sized,
    L: RateLimiter + ?Sized,
{
    let request = settings.request_for(real);
    let raw = call_with_retry(limiter, &settings.retry, || generator.generate(&request))?;
    let cleaned = clean_generated_text(&raw);
    if cleaned.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(cleaned)
}

/// Requests a counterpart for every matched review in order. A failure is
/// logged and the review moves to `failed`, so `real` and `synthetic` stay
/// index-aligned.
pub fn generate_pairs<G, L>(
    matches: Vec<ReviewEntry>,
    generator: &G,
    limiter: &mut L,
    settings: &GenerationSettings,
) -> Result<PairedDataset>
where
    G: TextGenerator + ?Sized,
    L: RateLimiter + ?Sized,
{
    info!("Generating AI reviews for {} matches", matches.len());
    let bar = progress_bar(matches.len(), "Generating")?;
    let mut dataset = PairedDataset::default();

    for real in matches.into_iter().progress_with(bar) {
        debug!("Generating for {}", truncate_chars(&real.product_title, 10));
        match generate_counterpart(&real, generator, limiter, settings) {
            Ok(text) => dataset.push_pair(real, text),
            Err(e) => {
                warn!(
                    "Generation failed for {} ({} stars): {e}",
                    real.asin, real.rating
                );
                dataset.failed.push(real);
            }
        }
    }

    info!(
        "Generated {} pairs, {} failures",
        dataset.len(),
        dataset.failed.len()
    );
    Ok(dataset)
}
