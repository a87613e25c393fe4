use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};

pub const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const GROQ_API_KEY_VAR: &str = "GROQ_API_KEY";

pub const DEFAULT_REVIEWS_PATH: &str = "data/raw/Electronics.jsonl.gz";
pub const DEFAULT_METADATA_PATH: &str = "data/raw/meta_Electronics.jsonl.gz";
pub const DEFAULT_OUTPUT_BASE: &str = "data/collected";

/// Pause between generation requests.
pub const DEFAULT_GENERATION_INTERVAL: Duration = Duration::from_millis(4010);
/// Pause between scoring requests.
pub const DEFAULT_SCORING_INTERVAL: Duration = Duration::from_millis(2100);

/// Loads `.env` from the working directory (if any) and starts logging.
pub fn init_environment() {
    let _ = dotenvy::dotenv();
    env_logger::init();
}

/// Reads a credential from the process environment.
pub fn api_key_from_env(var: &str) -> Result<String> {
    api_key_from(var, |name| std::env::var(name).ok())
}

pub(crate) fn api_key_from(var: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    match lookup(var) {
        Some(key) if !key.trim().is_empty() => Ok(key.trim().to_owned()),
        Some(_) => bail!("{var} is set but empty"),
        None => bail!("{var} is not set; export it or add it to a .env file"),
    }
}

/// Converts a `--interval` value given in seconds.
pub fn interval_from_secs(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .with_context(|| format!("invalid interval {secs}: expected a non-negative number of seconds"))
}

/// `collected-YYYYMMDD-HHMM` under `base`.
pub fn timestamped_output_dir(base: &Path, now: DateTime<Local>) -> PathBuf {
    base.join(format!("collected-{}", now.format("%Y%m%d-%H%M")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_missing_key_names_the_variable() {
        let err = api_key_from("GEMINI_API_KEY", |_| None).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_blank_key_is_rejected() {
        assert!(api_key_from("K", |_| Some("  ".into())).is_err());
    }

    #[test]
    fn test_key_is_trimmed() {
        let key = api_key_from("K", |_| Some(" abc123\n".into())).unwrap();
        assert_eq!(key, "abc123");
    }

    #[test]
    fn test_interval_must_be_representable() {
        assert_eq!(interval_from_secs(4.01).unwrap(), Duration::from_millis(4010));
        assert_eq!(interval_from_secs(0.0).unwrap(), Duration::ZERO);
        for bad in [f64::INFINITY, f64::NAN, -1.0, 1e30] {
            let err = interval_from_secs(bad).unwrap_err();
            assert!(err.to_string().contains("invalid interval"), "{bad}");
        }
    }

    #[test]
    fn test_output_dir_is_timestamped() {
        let now = Local.with_ymd_and_hms(2026, 2, 13, 19, 40, 5).unwrap();
        assert_eq!(
            timestamped_output_dir(Path::new("data/collected"), now),
            Path::new("data/collected/collected-20260213-1940")
        );
    }
}
