use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::Document;

const UTF8_BOM: char = '\u{feff}';

/// Turns a CSV knowledge base into one [`Document`] per data row.
///
/// Each row is rendered as `column: value` lines in header order, with keys
/// and values trimmed. A UTF-8 byte-order mark on the first header is ignored.
pub struct CsvLoader {
    delimiter: u8,
}

impl CsvLoader {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn load_file(&self, path: &Path) -> Result<Vec<Document>> {
        let file = std::fs::File::open(path).map_err(|e| {
            Error::DataSource(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let documents = self.load_from_reader(file, &path.display().to_string())?;

        tracing::info!(
            source = %path.display(),
            rows = documents.len(),
            "Loaded knowledge base CSV"
        );
        Ok(documents)
    }

    /// Parse CSV content from any reader. `source` is recorded on every document.
    pub fn load_from_reader<R: Read>(&self, reader: R, source: &str) -> Result<Vec<Document>> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| Error::DataSource(format!("Failed to read CSV header from {}: {}", source, e)))?
            .iter()
            .map(|h| h.trim_start_matches(UTF8_BOM).trim().to_string())
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(Error::DataSource(format!("CSV has no header row: {}", source)));
        }

        let mut documents = Vec::new();
        for (row, record) in csv_reader.records().enumerate() {
            let record = record.map_err(|e| {
                Error::DataSource(format!("Malformed CSV row {} in {}: {}", row + 1, source, e))
            })?;

            let mut metadata = BTreeMap::new();
            let mut lines = Vec::with_capacity(headers.len());
            for (key, value) in headers.iter().zip(record.iter()) {
                let value = value.trim();
                lines.push(format!("{}: {}", key, value));
                metadata.insert(key.clone(), value.to_string());
            }

            documents.push(Document {
                text: lines.join("\n"),
                metadata,
                source: source.to_string(),
                row,
            });
        }

        Ok(documents)
    }
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self::new()
    }
}
