use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use log::info;

use crate::dataloader::MalformedLines;
use crate::generation::TextGenerator;
use crate::generator::{GenerationSettings, generate_pairs};
use crate::matcher::{MatchStats, match_reviews_from_path};
use crate::metadata::MetadataIndex;
use crate::rate_limit::RateLimiter;
use crate::structs::{Label, PairedDataset};
use crate::writer::{DatasetFiles, read_entries, write_dataset};

pub const DEFAULT_TARGET: usize = 1000;

/// Builds the paired human/synthetic review dataset:
/// metadata index, review matching, paired generation, tables.
#[derive(Debug, Clone)]
pub struct ReviewDatasetBuilder {
    pub target: usize,
    pub metadata_policy: MalformedLines,
    pub review_policy: MalformedLines,
    pub generation: GenerationSettings,
}

impl Default for ReviewDatasetBuilder {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET,
            metadata_policy: MalformedLines::Skip,
            review_policy: MalformedLines::Abort,
            generation: GenerationSettings::default(),
        }
    }
}

/// What a run did. A resumed run indexes nothing and its `match_stats` only
/// carry the number of reviews taken from the failure file.
#[derive(Debug)]
pub struct BuildReport {
    pub products_indexed: usize,
    pub match_stats: MatchStats,
    pub dataset: PairedDataset,
    pub files: DatasetFiles,
}

impl ReviewDatasetBuilder {
    pub fn build_dataset<G, L>(
        &self,
        reviews_path: &Path,
        metadata_path: &Path,
        output_dir: &Path,
        generator: &G,
        limiter: &mut L,
    ) -> Result<BuildReport>
    where
        G: TextGenerator + ?Sized,
        L: RateLimiter + ?Sized,
    {
        let start = Instant::now();
        create_output_dir(output_dir)?;

        let index = MetadataIndex::load(metadata_path, self.metadata_policy)?;
        let matched =
            match_reviews_from_path(reviews_path, &index, self.target, self.review_policy)?;
        let dataset = generate_pairs(matched.entries, generator, limiter, &self.generation)?;
        let files = write_dataset(output_dir, &dataset)?;

        let duration = start.elapsed().as_secs_f32();
        info!("Processing completed in {duration:.2} seconds");
        Ok(BuildReport {
            products_indexed: index.len(),
            match_stats: matched.stats,
            dataset,
            files,
        })
    }

    /// Retries generation for the human reviews in a `failed_reviews.csv`
    /// left by an earlier run. Indexing and matching are skipped; the tables
    /// land in `output_dir` with pair ids numbered from 1 again.
    pub fn resume_dataset<G, L>(
        &self,
        failed_path: &Path,
        output_dir: &Path,
        generator: &G,
        limiter: &mut L,
    ) -> Result<BuildReport>
    where
        G: TextGenerator + ?Sized,
        L: RateLimiter + ?Sized,
    {
        let start = Instant::now();
        create_output_dir(output_dir)?;

        let mut pending = read_entries(failed_path)?;
        if let Some(pos) = pending.iter().position(|entry| entry.label != Label::Human) {
            bail!(
                "{} row {} is not a human review",
                failed_path.display(),
                pos + 1
            );
        }
        for entry in &mut pending {
            entry.pair_id = None;
        }
        info!(
            "Resuming {} reviews from {}",
            pending.len(),
            failed_path.display()
        );

        let match_stats = MatchStats {
            retained: pending.len(),
            ..MatchStats::default()
        };
        let dataset = generate_pairs(pending, generator, limiter, &self.generation)?;
        let files = write_dataset(output_dir, &dataset)?;

        let duration = start.elapsed().as_secs_f32();
        info!("Resume completed in {duration:.2} seconds");
        Ok(BuildReport {
            products_indexed: 0,
            match_stats,
            dataset,
            files,
        })
    }
}

// fail before any API call if the destination is unusable
fn create_output_dir(output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))
}
