use std::io::BufRead;
use std::path::Path;

use anyhow::Result;
use log::{debug, info};
use num_format::{Locale, ToFormattedString};

use crate::dataloader::{DatasetLoader, JsonLines, MalformedLines};
use crate::metadata::MetadataIndex;
use crate::structs::{RawReview, ReviewEntry};
use crate::utils::scan_spinner;

/// Why a review was not kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    UnknownProduct,
    Unverified,
    MissingText,
    InvalidRating,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchStats {
    pub lines_read: usize,
    pub malformed_skipped: usize,
    pub unknown_product: usize,
    pub unverified: usize,
    pub missing_text: usize,
    pub invalid_rating: usize,
    pub retained: usize,
}

impl MatchStats {
    fn record(&mut self, exclusion: Exclusion) {
        match exclusion {
            Exclusion::UnknownProduct => self.unknown_product += 1,
            Exclusion::Unverified => self.unverified += 1,
            Exclusion::MissingText => self.missing_text += 1,
            Exclusion::InvalidRating => self.invalid_rating += 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub entries: Vec<ReviewEntry>,
    pub stats: MatchStats,
}

/// Turns a parsed review into an output row if its product is indexed, the
/// purchase is verified and it has a body. The product title comes from the
/// index.
pub fn qualify(review: RawReview, index: &MetadataIndex) -> Result<ReviewEntry, Exclusion> {
    let asin = review.parent_asin.unwrap_or_default();
    let product_title = index.title(&asin).ok_or(Exclusion::UnknownProduct)?;
    if review.verified_purchase != Some(true) {
        return Err(Exclusion::Unverified);
    }
    let text = review
        .text
        .filter(|text| !text.trim().is_empty())
        .ok_or(Exclusion::MissingText)?;
    let rating = review.rating.ok_or(Exclusion::InvalidRating)?;

    Ok(ReviewEntry::human(
        text,
        product_title,
        rating,
        review.timestamp,
        review.user_id.unwrap_or_default(),
        asin,
    ))
}

pub fn match_reviews_from_path(
    path: &Path,
    index: &MetadataIndex,
    target: usize,
    policy: MalformedLines,
) -> Result<MatchOutcome> {
    info!("Processing reviews from {}", path.display());
    match_reviews(DatasetLoader::new(path).open()?, index, target, policy)
}

/// Scans reviews in file order and keeps the first `target` that qualify.
/// Nothing past the line holding the last kept review is read.
pub fn match_reviews<R: BufRead>(
    reader: R,
    index: &MetadataIndex,
    target: usize,
    policy: MalformedLines,
) -> Result<MatchOutcome> {
    let spinner = scan_spinner("Matching reviews")?;
    let mut outcome = MatchOutcome::default();
    let mut rows = JsonLines::<R, RawReview>::new(reader, policy);

    while outcome.entries.len() < target {
        let Some(row) = rows.next() else {
            break;
        };
        let (line, review) = row?;
        spinner.inc(1);
        match qualify(review, index) {
            Ok(entry) => outcome.entries.push(entry),
            Err(exclusion) => {
                debug!("Line {line} excluded: {exclusion:?}");
                outcome.stats.record(exclusion);
            }
        }
    }
    spinner.finish_and_clear();

    outcome.stats.lines_read = rows.lines_read();
    outcome.stats.malformed_skipped = rows.skipped();
    outcome.stats.retained = outcome.entries.len();
    info!(
        "{} matches found after {} lines",
        outcome.stats.retained.to_formatted_string(&Locale::en),
        outcome.stats.lines_read.to_formatted_string(&Locale::en),
    );
    if outcome.stats.retained < target {
        info!("Input exhausted before reaching target of {target}");
    }
    Ok(outcome)
}
