use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use flate2::read::MultiGzDecoder;
use log::debug;
use serde::de::DeserializeOwned;

/// What a reader does with a line that is not valid JSON for the expected
/// record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MalformedLines {
    /// Log the line number and keep reading.
    #[default]
    Skip,
    /// Stop the run with an error naming the line.
    Abort,
}

/// A gzip-compressed, line-delimited JSON dump on disk.
pub struct DatasetLoader {
    dataset_path: PathBuf,
}

impl DatasetLoader {
    pub fn new(dataset_path: impl Into<PathBuf>) -> Self {
        Self {
            dataset_path: dataset_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dataset_path
    }

    pub fn open(&self) -> Result<BufReader<MultiGzDecoder<File>>> {
        open_jsonl_gz(&self.dataset_path)
    }

    pub fn json_lines<T: DeserializeOwned>(
        &self,
        policy: MalformedLines,
    ) -> Result<JsonLines<BufReader<MultiGzDecoder<File>>, T>> {
        Ok(JsonLines::new(self.open()?, policy))
    }

    /// First `count` records, numbered from 1. Any malformed line is fatal.
    pub fn preview(&self, count: usize) -> Result<Vec<serde_json::Value>> {
        preview_records(self.open()?, count)
            .with_context(|| format!("failed to preview {}", self.dataset_path.display()))
    }
}

pub fn open_jsonl_gz(path: &Path) -> Result<BufReader<MultiGzDecoder<File>>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufReader::new(MultiGzDecoder::new(file)))
}

/// Iterator over `(line_number, record)` for a line-delimited JSON stream.
///
/// Blank lines are ignored. Read errors are always returned; parse errors
/// follow the [`MalformedLines`] policy. Line numbers are 1-based and count
/// every line pulled from the underlying reader.
pub struct JsonLines<R, T> {
    lines: Lines<R>,
    policy: MalformedLines,
    lines_read: usize,
    skipped: usize,
    _record: PhantomData<fn() -> T>,
}

impl<R: BufRead, T: DeserializeOwned> JsonLines<R, T> {
    pub fn new(reader: R, policy: MalformedLines) -> Self {
        Self {
            lines: reader.lines(),
            policy,
            lines_read: 0,
            skipped: 0,
            _record: PhantomData,
        }
    }

    pub fn lines_read(&self) -> usize {
        self.lines_read
    }

    /// Lines dropped under [`MalformedLines::Skip`].
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead, T: DeserializeOwned> Iterator for JsonLines<R, T> {
    type Item = Result<(usize, T)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(anyhow!(e).context(format!(
                        "failed to read line {}",
                        self.lines_read + 1
                    ))));
                }
            };
            self.lines_read += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(&line) {
                Ok(record) => return Some(Ok((self.lines_read, record))),
                Err(e) => match self.policy {
                    MalformedLines::Skip => {
                        debug!("Skipping malformed line {}: {e}", self.lines_read);
                        self.skipped += 1;
                    }
                    MalformedLines::Abort => {
                        return Some(Err(
                            anyhow!(e).context(format!("malformed JSON on line {}", self.lines_read))
                        ));
                    }
                },
            }
        }
    }
}

pub fn preview_records<R: BufRead>(reader: R, count: usize) -> Result<Vec<serde_json::Value>> {
    let mut records = Vec::with_capacity(count);
    let mut rows = JsonLines::<R, serde_json::Value>::new(reader, MalformedLines::Abort);
    while records.len() < count {
        let Some(row) = rows.next() else {
            break;
        };
        records.push(row?.1);
    }
    Ok(records)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use serde::Deserialize;
    use std::io::{Cursor, Write};
    use tempfile::tempdir;

    // 写出测试用的 .jsonl.gz 文件
    pub(crate) fn write_jsonl_gz(path: &Path, lines: &[&str]) {
        let file = File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        for line in lines {
            writeln!(encoder, "{line}").unwrap();
        }
        encoder.finish().unwrap();
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Row {
        id: u32,
    }

    #[test]
    fn test_skip_policy_drops_malformed_lines() {
        let input = "{\"id\": 1}\nnot json\n\n{\"id\": 3}\n";
        let mut rows = JsonLines::<_, Row>::new(Cursor::new(input), MalformedLines::Skip);
        let parsed: Vec<_> = rows.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(parsed, vec![(1, Row { id: 1 }), (4, Row { id: 3 })]);
        assert_eq!(rows.skipped(), 1);
        assert_eq!(rows.lines_read(), 4);
    }

    #[test]
    fn test_abort_policy_reports_line_number() {
        let input = "{\"id\": 1}\n{\"id\": \n";
        let mut rows = JsonLines::<_, Row>::new(Cursor::new(input), MalformedLines::Abort);
        assert!(rows.next().unwrap().is_ok());
        let err = rows.next().unwrap().unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn test_loader_reads_gzip_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.jsonl.gz");
        write_jsonl_gz(&path, &[r#"{"id": 10}"#, r#"{"id": 11}"#]);

        let loader = DatasetLoader::new(&path);
        let ids: Vec<u32> = loader
            .json_lines::<Row>(MalformedLines::Abort)
            .unwrap()
            .map(|r| r.unwrap().1.id)
            .collect();
        assert_eq!(ids, vec![10, 11]);
    }

    #[test]
    fn test_loader_reads_every_gzip_member() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.jsonl.gz");
        write_jsonl_gz(&path, &[r#"{"id": 1}"#]);
        let second = dir.path().join("second.jsonl.gz");
        write_jsonl_gz(&second, &[r#"{"id": 2}"#, r#"{"id": 3}"#]);
        // 两个 gzip 成员首尾相接
        let mut combined = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        combined.write_all(&std::fs::read(&second).unwrap()).unwrap();
        drop(combined);

        let ids: Vec<u32> = DatasetLoader::new(&path)
            .json_lines::<Row>(MalformedLines::Abort)
            .unwrap()
            .map(|r| r.unwrap().1.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let loader = DatasetLoader::new(dir.path().join("absent.jsonl.gz"));
        let err = loader.open().unwrap_err();
        assert_eq!(
            err.downcast_ref::<std::io::Error>().unwrap().kind(),
            std::io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_preview_stops_at_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.jsonl.gz");
        write_jsonl_gz(&path, &[r#"{"id": 1}"#, r#"{"id": 2}"#, r#"{"id": 3}"#]);

        let records = DatasetLoader::new(&path).preview(2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["id"], 2);

        let records = DatasetLoader::new(&path).preview(10).unwrap();
        assert_eq!(records.len(), 3);
    }
}
