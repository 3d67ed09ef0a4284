//! Normalizer - applies the schema mapping and coerces raw tables into
//! canonical records
//!
//! Partial success is the designed behavior: rows that fail type coercion are
//! dropped and counted, never raised. The only hard failure is a raw table
//! where not a single required canonical field could be mapped - that table
//! is unusable and the caller must be told.

use crate::error::{QaError, Result};
use crate::model::{
    CanonicalTable, CropProductionRecord, NormalizeReport, RainfallRecord, RawTable, TableKind,
};
use crate::schema_mapper::{self, CanonicalField, SchemaMapping};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

const DEFAULT_UNIT: &str = "tonnes";

/// Normalize a raw table of the given kind into a canonical table.
///
/// Fails with `QaError::Schema` only when none of the kind's required fields
/// could be mapped from the raw headers.
pub fn normalize(raw: &RawTable, kind: TableKind) -> Result<CanonicalTable> {
    let mapping = schema_mapper::map_schema(raw, kind);
    if !mapping.has_any_required(kind) {
        return Err(QaError::Schema(format!(
            "{}: no column matches any required {} field (headers: {:?})",
            raw.source_file,
            kind.as_str(),
            raw.headers
        )));
    }

    let table = match kind {
        TableKind::Rainfall => normalize_rainfall(raw, &mapping),
        TableKind::CropProduction => normalize_production(raw, &mapping),
    };

    let report = table.report();
    info!(
        "{}: normalized {} of {} row(s) as {} ({} dropped)",
        report.source_file,
        report.rows_kept,
        report.rows_in,
        kind.as_str(),
        report.rows_dropped
    );
    if report.rows_dropped > 0 {
        warn!(
            "{}: dropped {} malformed row(s) during normalization",
            report.source_file, report.rows_dropped
        );
    }

    Ok(table)
}

/// Deterministic checksum of a raw row, carried into provenance snapshots
fn row_checksum(cells: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cells.join("|").as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn cell<'a>(row: &'a [String], mapping: &SchemaMapping, field: CanonicalField) -> Option<&'a str> {
    mapping
        .column(field)
        .and_then(|idx| row.get(idx))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

fn parse_non_negative(raw: &str) -> Option<f64> {
    let cleaned = raw.replace(',', "");
    match cleaned.parse::<f64>() {
        Ok(v) if v >= 0.0 && v.is_finite() => Some(v),
        _ => None,
    }
}

fn normalize_rainfall(raw: &RawTable, mapping: &SchemaMapping) -> CanonicalTable {
    let mut records: Vec<RainfallRecord> = Vec::new();
    // positions into `records`, for averaging duplicate (region, year) rows
    let mut seen: Vec<(String, i32, usize, usize)> = Vec::new();
    let mut dropped = 0usize;

    for row in &raw.rows {
        let region = match cell(row, mapping, CanonicalField::Region) {
            Some(v) => schema_mapper::canonical_region(v),
            None => {
                dropped += 1;
                continue;
            }
        };
        let year = match cell(row, mapping, CanonicalField::Year)
            .and_then(schema_mapper::parse_year)
        {
            Some(y) => y,
            None => {
                dropped += 1;
                continue;
            }
        };
        let rainfall_mm = match cell(row, mapping, CanonicalField::RainfallMm)
            .and_then(parse_non_negative)
        {
            Some(v) => v,
            None => {
                dropped += 1;
                continue;
            }
        };

        // One record per (region, year) per source file: duplicate readings
        // are averaged into the first record's slot.
        if let Some(entry) = seen
            .iter_mut()
            .find(|(r, y, _, _)| r == &region && *y == year)
        {
            let (_, _, pos, count) = entry;
            let rec = &mut records[*pos];
            rec.rainfall_mm =
                (rec.rainfall_mm * *count as f64 + rainfall_mm) / (*count as f64 + 1.0);
            *count += 1;
            debug!(
                "{}: averaged duplicate rainfall reading for ({}, {})",
                raw.source_file, region, year
            );
            continue;
        }

        seen.push((region.clone(), year, records.len(), 1));
        records.push(RainfallRecord {
            region,
            year,
            rainfall_mm,
            source_file: raw.source_file.clone(),
            row_id: row_checksum(row),
        });
    }

    let report = NormalizeReport {
        source_file: raw.source_file.clone(),
        rows_in: raw.rows.len(),
        rows_kept: records.len(),
        rows_dropped: dropped,
        dropped_columns: mapping.dropped_columns.clone(),
    };
    CanonicalTable::Rainfall { records, report }
}

fn normalize_production(raw: &RawTable, mapping: &SchemaMapping) -> CanonicalTable {
    let mut records = Vec::new();
    let mut dropped = 0usize;

    for row in &raw.rows {
        let region = match cell(row, mapping, CanonicalField::Region) {
            Some(v) => schema_mapper::canonical_region(v),
            None => {
                dropped += 1;
                continue;
            }
        };
        let crop = match cell(row, mapping, CanonicalField::Crop) {
            Some(v) => schema_mapper::canonical_crop(v),
            None => {
                dropped += 1;
                continue;
            }
        };
        let year = match cell(row, mapping, CanonicalField::Year)
            .and_then(schema_mapper::parse_year)
        {
            Some(y) => y,
            None => {
                dropped += 1;
                continue;
            }
        };
        let production = match cell(row, mapping, CanonicalField::Production)
            .and_then(parse_non_negative)
        {
            Some(v) => v,
            None => {
                dropped += 1;
                continue;
            }
        };
        let district = cell(row, mapping, CanonicalField::District)
            .map(|v| schema_mapper::canonical_region(v));
        let unit = cell(row, mapping, CanonicalField::Unit)
            .map(|v| v.to_lowercase())
            .unwrap_or_else(|| DEFAULT_UNIT.to_string());

        records.push(CropProductionRecord {
            region,
            district,
            crop,
            year,
            production,
            unit,
            source_file: raw.source_file.clone(),
            row_id: row_checksum(row),
        });
    }

    let report = NormalizeReport {
        source_file: raw.source_file.clone(),
        rows_in: raw.rows.len(),
        rows_kept: records.len(),
        rows_dropped: dropped,
        dropped_columns: mapping.dropped_columns.clone(),
    };
    CanonicalTable::Production { records, report }
}
