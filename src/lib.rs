pub mod config;
mod dataloader;
pub mod generation;
mod generator;
mod matcher;
mod metadata;
pub mod perplexity;
mod pipeline;
mod prompt;
pub mod rate_limit;
mod structs;
mod utils;
mod writer;
pub use dataloader::{DatasetLoader, JsonLines, MalformedLines, open_jsonl_gz, preview_records};
pub use generator::{
    DEFAULT_GENERATION_MODEL, GenerationSettings, generate_counterpart, generate_pairs,
};
pub use matcher::{Exclusion, MatchOutcome, MatchStats, match_reviews, match_reviews_from_path, qualify};
pub use metadata::MetadataIndex;
pub use pipeline::{BuildReport, DEFAULT_TARGET, ReviewDatasetBuilder};
pub use prompt::{build_review_prompt, clean_generated_text};
pub use structs::{Label, PairedDataset, RawReview, ReviewEntry, REVIEW_COLUMNS, SYNTHETIC_USER_ID};
pub use writer::{
    DatasetFiles, FAILED_REVIEWS_FILE, HUMAN_REVIEWS_FILE, SYNTHETIC_REVIEWS_FILE, read_entries,
    read_rows, write_dataset, write_entries, write_rows,
};
