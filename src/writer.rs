use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::structs::{PairedDataset, REVIEW_COLUMNS, ReviewEntry};

pub const HUMAN_REVIEWS_FILE: &str = "human_reviews.csv";
pub const SYNTHETIC_REVIEWS_FILE: &str = "synthetic_reviews.csv";
pub const FAILED_REVIEWS_FILE: &str = "failed_reviews.csv";

/// Where [`write_dataset`] put its tables.
#[derive(Debug, Clone)]
pub struct DatasetFiles {
    pub human: PathBuf,
    pub synthetic: PathBuf,
    pub failed: Option<PathBuf>,
}

/// Writes `rows` under an explicit header so that an empty table still has
/// its columns.
pub fn write_rows<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    reader
        .deserialize()
        .enumerate()
        .map(|(idx, row)| {
            row.with_context(|| format!("failed to read row {} of {}", idx + 1, path.display()))
        })
        .collect()
}

pub fn write_entries(path: &Path, entries: &[ReviewEntry]) -> Result<()> {
    write_rows(path, &REVIEW_COLUMNS, entries)
}

pub fn read_entries(path: &Path) -> Result<Vec<ReviewEntry>> {
    read_rows(path)
}

/// Writes the human and synthetic tables, plus the failed reviews when there
/// are any, creating `output_dir` if needed.
pub fn write_dataset(output_dir: &Path, dataset: &PairedDataset) -> Result<DatasetFiles> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;

    let files = DatasetFiles {
        human: output_dir.join(HUMAN_REVIEWS_FILE),
        synthetic: output_dir.join(SYNTHETIC_REVIEWS_FILE),
        failed: (!dataset.failed.is_empty()).then(|| output_dir.join(FAILED_REVIEWS_FILE)),
    };
    write_entries(&files.human, &dataset.real)?;
    write_entries(&files.synthetic, &dataset.synthetic)?;
    if let Some(failed) = &files.failed {
        write_entries(failed, &dataset.failed)?;
    }

    info!("Files saved in {}", output_dir.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::Label;
    use tempfile::tempdir;

    fn dataset() -> PairedDataset {
        let mut dataset = PairedDataset::default();
        dataset.push_pair(
            ReviewEntry::human("Loved it, \"really\"\nloved it", "Widget, Deluxe", 5, Some(17), "u1", "A1"),
            "Works as described.".to_owned(),
        );
        dataset.push_pair(
            ReviewEntry::human("meh", "Gadget", 2, None, "u2", "B2"),
            "Not great.".to_owned(),
        );
        dataset
    }

    fn header(path: &Path) -> Vec<String> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader.headers().unwrap().iter().map(str::to_owned).collect()
    }

    #[test]
    fn test_round_trip_preserves_rows_and_columns() {
        let dir = tempdir().unwrap();
        let dataset = dataset();
        let files = write_dataset(dir.path(), &dataset).unwrap();

        let human = read_entries(&files.human).unwrap();
        let synthetic = read_entries(&files.synthetic).unwrap();
        assert_eq!(human, dataset.real);
        assert_eq!(synthetic, dataset.synthetic);
        assert_eq!(header(&files.human), REVIEW_COLUMNS);
        assert_eq!(header(&files.synthetic), REVIEW_COLUMNS);
        assert!(files.failed.is_none());
        assert!(!dir.path().join(FAILED_REVIEWS_FILE).exists());
    }

    #[test]
    fn test_labels_are_written_as_integers() {
        let dir = tempdir().unwrap();
        let files = write_dataset(dir.path(), &dataset()).unwrap();
        let mut reader = csv::Reader::from_path(&files.synthetic).unwrap();
        for record in reader.records() {
            let record = record.unwrap();
            assert_eq!(&record[6], "1");
            assert_eq!(&record[4], "AI_GENERATED");
        }
        let human = read_entries(&files.human).unwrap();
        assert!(human.iter().all(|e| e.label == Label::Human));
    }

    #[test]
    fn test_failed_reviews_are_written_separately() {
        let dir = tempdir().unwrap();
        let mut dataset = dataset();
        dataset
            .failed
            .push(ReviewEntry::human("retry me", "Gizmo", 4, Some(5), "u9", "C3"));
        let files = write_dataset(dir.path(), &dataset).unwrap();

        let failed = read_entries(files.failed.as_deref().unwrap()).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].asin, "C3");
        assert_eq!(failed[0].pair_id, None);
    }

    #[test]
    fn test_empty_tables_keep_their_header() {
        let dir = tempdir().unwrap();
        let files = write_dataset(&dir.path().join("nested/out"), &PairedDataset::default()).unwrap();
        assert_eq!(header(&files.human), REVIEW_COLUMNS);
        assert!(read_entries(&files.synthetic).unwrap().is_empty());
    }

    #[test]
    fn test_unwritable_output_directory_fails() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        File::create(&blocker).unwrap();
        let result = write_dataset(&blocker.join("out"), &dataset());
        assert!(result.is_err());
    }
}
