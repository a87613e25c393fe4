use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;
use review_tools_rust::config::{
    DEFAULT_SCORING_INTERVAL, GROQ_API_KEY_VAR, api_key_from_env, init_environment,
    interval_from_secs,
};
use review_tools_rust::perplexity::{
    ANALYZED_REVIEWS_FILE, DEFAULT_SCORING_MODEL, GROQ_ENDPOINT, GroqClient, SUMMARY_CLIP, ScoringSettings,
    Source, score_reviews, summarize, write_analyzed,
};
use review_tools_rust::rate_limit::{IntervalLimiter, RetryPolicy};
use review_tools_rust::{HUMAN_REVIEWS_FILE, SYNTHETIC_REVIEWS_FILE, read_entries};

#[derive(Parser, Debug)]
#[command(version, about = "Score human and generated reviews by perplexity")]
struct Cli {
    /// Folder written by collect-reviews
    dataset_dir: PathBuf,

    /// Defaults to analyzed_reviews.csv inside the dataset folder
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, env = "SCORING_MODEL", default_value = DEFAULT_SCORING_MODEL)]
    model: String,

    /// Seconds between scoring requests
    #[arg(long, default_value_t = DEFAULT_SCORING_INTERVAL.as_secs_f64())]
    interval: f64,

    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    #[arg(long, env = "GROQ_ENDPOINT", default_value = GROQ_ENDPOINT)]
    endpoint: String,
}

fn main() -> Result<()> {
    init_environment();
    let cli = Cli::parse();
    let api_key = api_key_from_env(GROQ_API_KEY_VAR)?;

    let human = read_entries(&cli.dataset_dir.join(HUMAN_REVIEWS_FILE))?;
    let synthetic = read_entries(&cli.dataset_dir.join(SYNTHETIC_REVIEWS_FILE))?;
    let reviews: Vec<_> = human
        .into_iter()
        .map(|entry| (Source::Human, entry))
        .chain(synthetic.into_iter().map(|entry| (Source::Ai, entry)))
        .collect();
    info!("Loaded {} total reviews", reviews.len());

    let scorer = GroqClient::new(api_key)?.with_endpoint(cli.endpoint);
    let mut limiter = IntervalLimiter::new(interval_from_secs(cli.interval)?);
    let settings = ScoringSettings {
        model: cli.model,
        retry: RetryPolicy {
            max_attempts: cli.max_attempts.max(1),
            ..RetryPolicy::default()
        },
    };
    let analyzed = score_reviews(reviews, &scorer, &mut limiter, &settings)?;

    let output = cli
        .output
        .unwrap_or_else(|| cli.dataset_dir.join(ANALYZED_REVIEWS_FILE));
    write_analyzed(&output, &analyzed)?;
    println!("Saved to {}", output.display());

    println!("{:<8} | {:>6} | {:>8} | {:>10} | {:>10}", "SOURCE", "SCORED", "UNSCORED", "MEAN", "MEDIAN");
    println!("{}", "-".repeat(54));
    for summary in summarize(&analyzed, SUMMARY_CLIP) {
        let fmt = |value: Option<f64>| value.map_or_else(|| "-".to_owned(), |v| format!("{v:.2}"));
        println!(
            "{:<8} | {:>6} | {:>8} | {:>10} | {:>10}",
            summary.source.to_string(),
            summary.scored,
            summary.unscored,
            fmt(summary.mean),
            fmt(summary.median)
        );
    }
    Ok(())
}
