use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::batch::FileType;

const UTF8_BOM: char = '\u{feff}';

/// A CSV file read into memory and checked before any batch call.
#[derive(Debug, Clone)]
pub struct CsvInput {
    pub path: PathBuf,
    /// File contents without a leading byte-order mark.
    pub data: String,
    pub file_type: FileType,
    pub headers: Vec<String>,
    pub row_count: u64,
}

impl CsvInput {
    pub fn load(path: &Path, file_type: Option<FileType>) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let text = String::from_utf8(bytes)
            .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
        let file_type = file_type.unwrap_or_else(|| infer_file_type(path));
        let input = Self::parse(path.to_path_buf(), text, file_type)?;
        debug!(
            path = %path.display(),
            file_type = file_type.as_str(),
            rows = input.row_count,
            columns = input.headers.len(),
            "loaded input file"
        );
        Ok(input)
    }

    pub fn parse(path: PathBuf, text: String, file_type: FileType) -> Result<Self> {
        let data = match text.strip_prefix(UTF8_BOM) {
            Some(rest) => rest.to_string(),
            None => text,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(file_type.delimiter())
            .flexible(true)
            .has_headers(true)
            .from_reader(data.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("failed to read header of {}", path.display()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            bail!("{} has no header row", path.display());
        }

        // Counts every record the reader yields, blank-field rows included,
        // so row numbers line up with `startRow` on the endpoint.
        let mut row_count = 0u64;
        let mut has_values = false;
        for record in reader.records() {
            let record = record.with_context(|| {
                format!("failed to parse {} after row {row_count}", path.display())
            })?;
            has_values |= record.iter().any(|field| !field.trim().is_empty());
            row_count += 1;
        }
        if !has_values {
            bail!("{} has a header but no data rows", path.display());
        }

        Ok(Self {
            path,
            data,
            file_type,
            headers,
            row_count,
        })
    }

    /// Resolves `--columns` against the header. An empty selection means every
    /// header column.
    pub fn select_columns(&self, requested: &[String]) -> Result<Vec<String>> {
        if requested.is_empty() {
            return Ok(self
                .headers
                .iter()
                .filter(|h| !h.is_empty())
                .cloned()
                .collect());
        }

        let missing: Vec<&str> = requested
            .iter()
            .map(String::as_str)
            .filter(|column| !self.headers.iter().any(|h| h == column))
            .collect();
        if !missing.is_empty() {
            bail!(
                "column(s) not in CSV header: {}\nAvailable: {}",
                missing.join(", "),
                self.headers.join(", ")
            );
        }
        Ok(requested.to_vec())
    }
}

pub fn infer_file_type(path: &Path) -> FileType {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("tsv") | Some("tab") => FileType::Tsv,
        _ => FileType::Csv,
    }
}
