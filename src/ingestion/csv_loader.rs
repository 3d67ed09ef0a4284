//! CSV Loader - reads free-form CSV into a RawTable
//!
//! Tolerant by design: headers are trimmed, ragged rows are padded or
//! truncated to the header width, and unreadable records are skipped with a
//! warning rather than failing the whole file.

use crate::model::RawTable;
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::path::Path;
use tracing::{debug, warn};

/// Read a CSV file from disk into a RawTable
pub fn load_csv_path(path: &Path) -> Result<RawTable> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read CSV file {}", path.display()))?;
    let source_file = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    load_csv_text(&source_file, &text)
}

/// Parse CSV text into a RawTable. `source_file` is carried into provenance.
pub fn load_csv_text(source_file: &str, csv_text: &str) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers = rdr
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        match result {
            Ok(record) => {
                let row = (0..headers.len())
                    .map(|idx| record.get(idx).unwrap_or("").trim().to_string())
                    .collect();
                rows.push(row);
            }
            Err(e) => {
                skipped += 1;
                debug!("{}: skipping unreadable record: {}", source_file, e);
            }
        }
    }

    if skipped > 0 {
        warn!("{}: skipped {} unreadable record(s)", source_file, skipped);
    }
    debug!(
        "{}: loaded {} row(s), {} column(s)",
        source_file,
        rows.len(),
        headers.len()
    );

    Ok(RawTable {
        source_file: source_file.to_string(),
        headers,
        rows,
    })
}
