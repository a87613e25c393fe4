use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;
use mimalloc::MiMalloc;
use review_tools_rust::config::{
    DEFAULT_GENERATION_INTERVAL, DEFAULT_METADATA_PATH, DEFAULT_OUTPUT_BASE, DEFAULT_REVIEWS_PATH,
    GEMINI_API_KEY_VAR, api_key_from_env, init_environment, interval_from_secs,
    timestamped_output_dir,
};
use review_tools_rust::generation::{GEMINI_ENDPOINT, GeminiClient};
use review_tools_rust::rate_limit::{IntervalLimiter, RateLimiter, RetryPolicy, TokenBucket};
use review_tools_rust::{
    DEFAULT_GENERATION_MODEL, DEFAULT_TARGET, GenerationSettings, MalformedLines,
    ReviewDatasetBuilder,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(version, about = "Pair verified human reviews with generated ones")]
struct Cli {
    /// Review dump (.jsonl.gz)
    #[arg(long, env = "REVIEWS_PATH", default_value = DEFAULT_REVIEWS_PATH)]
    reviews: PathBuf,

    /// Product metadata dump (.jsonl.gz)
    #[arg(long, env = "METADATA_PATH", default_value = DEFAULT_METADATA_PATH)]
    metadata: PathBuf,

    /// Base directory; each run writes into a new collected-<timestamp> folder
    #[arg(long, env = "OUTPUT_DIR", default_value = DEFAULT_OUTPUT_BASE)]
    output_base: PathBuf,

    /// Number of human reviews to match
    #[arg(long, env = "TARGET", default_value_t = DEFAULT_TARGET)]
    target: usize,

    #[arg(long, env = "GENERATION_MODEL", default_value = DEFAULT_GENERATION_MODEL)]
    model: String,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long, env = "GEMINI_ENDPOINT", default_value = GEMINI_ENDPOINT)]
    endpoint: String,

    /// Seconds between generation requests
    #[arg(long, default_value_t = DEFAULT_GENERATION_INTERVAL.as_secs_f64())]
    interval: f64,

    /// Use a token bucket with this many requests per minute instead of a fixed interval
    #[arg(long)]
    requests_per_minute: Option<u32>,

    #[arg(long, default_value_t = 1)]
    burst: u32,

    /// Attempts per review when the service reports a rate limit
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    #[arg(long, value_enum, default_value_t = MalformedLines::Skip)]
    malformed_metadata: MalformedLines,

    #[arg(long, value_enum, default_value_t = MalformedLines::Abort)]
    malformed_reviews: MalformedLines,

    /// Retry the reviews in a failed_reviews.csv from an earlier run instead
    /// of matching the dumps
    #[arg(long)]
    resume: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_environment();
    let cli = Cli::parse();
    let api_key = api_key_from_env(GEMINI_API_KEY_VAR)?;

    let output_dir = timestamped_output_dir(&cli.output_base, chrono::Local::now());
    match &cli.resume {
        Some(failed) => info!("resume: {}", failed.display()),
        None => {
            info!("reviews: {}", cli.reviews.display());
            info!("metadata: {}", cli.metadata.display());
        }
    }
    info!("output_dir: {}", output_dir.display());

    let generator = GeminiClient::new(api_key)?.with_endpoint(cli.endpoint);
    let mut limiter: Box<dyn RateLimiter> = match cli.requests_per_minute {
        Some(per_minute) => Box::new(TokenBucket::new(per_minute, cli.burst)),
        None => Box::new(IntervalLimiter::new(interval_from_secs(cli.interval)?)),
    };

    let builder = ReviewDatasetBuilder {
        target: cli.target,
        metadata_policy: cli.malformed_metadata,
        review_policy: cli.malformed_reviews,
        generation: GenerationSettings {
            model: cli.model,
            temperature: cli.temperature,
            max_output_tokens: None,
            retry: RetryPolicy {
                max_attempts: cli.max_attempts.max(1),
                ..RetryPolicy::default()
            },
        },
    };
    let report = match &cli.resume {
        Some(failed) => builder.resume_dataset(failed, &output_dir, &generator, limiter.as_mut())?,
        None => builder.build_dataset(
            &cli.reviews,
            &cli.metadata,
            &output_dir,
            &generator,
            limiter.as_mut(),
        )?,
    };

    println!(
        "{} pairs written to {} ({} generations failed)",
        report.dataset.len(),
        output_dir.display(),
        report.dataset.failed.len()
    );
    if let Some(failed) = &report.files.failed {
        println!("Failed reviews saved to {}", failed.display());
    }
    Ok(())
}
