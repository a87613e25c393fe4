use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use review_tools_rust::config::{GEMINI_API_KEY_VAR, api_key_from_env, init_environment};
use review_tools_rust::generation::{GeminiClient, GenerationRequest, ProbeStatus, TextGenerator};
use review_tools_rust::rate_limit::{IntervalLimiter, RateLimiter};

const DEFAULT_MODELS: [&str; 8] = [
    "gemini-3-pro",
    "gemini-3-flash",
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-1.5-flash",
];

#[derive(Parser, Debug)]
#[command(version, about = "Check which generation models the API key can use")]
struct Cli {
    /// Models to try; defaults to the known Gemini lineup
    models: Vec<String>,
}

fn details(status: ProbeStatus, result: &Result<String, impl std::fmt::Display>) -> String {
    match (status, result) {
        (_, Ok(text)) => {
            let preview: String = text.trim().chars().take(20).collect();
            format!("Response: {preview}...")
        }
        (ProbeStatus::QuotaHit, _) => "Limit is 0 or RPM limit.".to_owned(),
        (ProbeStatus::NotFound, _) => "Deprecated or typo.".to_owned(),
        (ProbeStatus::NoAccess, _) => "Key permissions issue.".to_owned(),
        (_, Err(e)) => e.to_string().chars().take(50).collect(),
    }
}

fn main() -> Result<()> {
    init_environment();
    let cli = Cli::parse();
    let client = GeminiClient::new(api_key_from_env(GEMINI_API_KEY_VAR)?)?;
    let models = if cli.models.is_empty() {
        DEFAULT_MODELS.iter().map(|m| (*m).to_owned()).collect()
    } else {
        cli.models
    };

    let mut limiter = IntervalLimiter::new(Duration::from_secs(1));
    println!("{:<25} | {:<15} | DETAILS", "MODEL NAME", "STATUS");
    println!("{}", "-".repeat(70));
    for model in models {
        limiter.acquire();
        let result = client.generate(&GenerationRequest::new(&model, "hi"));
        let status = ProbeStatus::classify(&result);
        println!(
            "{model:<25} | {:<15} | {}",
            status.as_str(),
            details(status, &result)
        );
    }
    Ok(())
}
