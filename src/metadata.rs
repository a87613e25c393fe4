use std::io::BufRead;
use std::path::Path;

use ahash::AHashMap;
use anyhow::Result;
use log::info;
use num_format::{Locale, ToFormattedString};

use crate::dataloader::{DatasetLoader, JsonLines, MalformedLines};
use crate::structs::MetadataRecord;
use crate::utils::scan_spinner;

/// Product id (`parent_asin`) to product title.
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    titles: AHashMap<String, String>,
}

impl MetadataIndex {
    pub fn load(path: &Path, policy: MalformedLines) -> Result<Self> {
        info!("Loading metadata from {}", path.display());
        Self::from_reader(DatasetLoader::new(path).open()?, policy)
    }

    /// Reads every record; ones without both a non-empty id and a non-empty
    /// title are ignored. A later record for the same id replaces the title.
    pub fn from_reader<R: BufRead>(reader: R, policy: MalformedLines) -> Result<Self> {
        let spinner = scan_spinner("Building title map")?;
        let mut index = Self::default();
        let mut rows = JsonLines::<R, MetadataRecord>::new(reader, policy);
        for row in rows.by_ref() {
            let (_, record) = row?;
            spinner.inc(1);
            if let (Some(asin), Some(title)) = (record.parent_asin, record.title) {
                index.insert(asin, title);
            }
        }
        spinner.finish_and_clear();

        info!(
            "Indexed {} products from {} lines ({} malformed lines skipped)",
            index.len().to_formatted_string(&Locale::en),
            rows.lines_read().to_formatted_string(&Locale::en),
            rows.skipped().to_formatted_string(&Locale::en),
        );
        Ok(index)
    }

    pub fn insert(&mut self, asin: impl Into<String>, title: impl Into<String>) {
        let (asin, title) = (asin.into(), title.into());
        if !asin.is_empty() && !title.is_empty() {
            self.titles.insert(asin, title);
        }
    }

    pub fn title(&self, asin: &str) -> Option<&str> {
        self.titles.get(asin).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}
