//! Schema Mapper - maps free-form CSV columns and values onto the canonical schema
//!
//! Heterogeneous open-data CSVs spell the same thing many ways
//! ("State_Name", "st_name", "STATE"). This module resolves raw column names
//! to canonical fields via an alias table plus Jaro-Winkler fuzzy matching,
//! and raw categorical values (state abbreviations, odd casing) to canonical
//! vocabulary. Mapping is deterministic: the same headers and values always
//! produce the same mapping. Unmapped columns are dropped with a warning;
//! unmapped values pass through title-cased so downstream filters degrade
//! gracefully instead of failing.

use crate::model::{RawTable, TableKind};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strsim::jaro_winkler;
use tracing::{debug, warn};

/// Minimum Jaro-Winkler similarity for a header to claim a canonical field
const ALIAS_THRESHOLD: f64 = 0.85;

/// Canonical fields of the two table kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CanonicalField {
    Region,
    District,
    Year,
    Crop,
    Production,
    Unit,
    RainfallMm,
}

impl CanonicalField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Region => "region",
            CanonicalField::District => "district",
            CanonicalField::Year => "year",
            CanonicalField::Crop => "crop",
            CanonicalField::Production => "production",
            CanonicalField::Unit => "unit",
            CanonicalField::RainfallMm => "rainfall_mm",
        }
    }

    /// Fields a table kind must map at least one of to be usable at all
    pub fn required_for(kind: TableKind) -> &'static [CanonicalField] {
        match kind {
            TableKind::Rainfall => &[
                CanonicalField::Region,
                CanonicalField::Year,
                CanonicalField::RainfallMm,
            ],
            TableKind::CropProduction => &[
                CanonicalField::Region,
                CanonicalField::Crop,
                CanonicalField::Year,
                CanonicalField::Production,
            ],
        }
    }

    fn candidates_for(kind: TableKind) -> &'static [CanonicalField] {
        match kind {
            TableKind::Rainfall => &[
                CanonicalField::Region,
                CanonicalField::District,
                CanonicalField::Year,
                CanonicalField::RainfallMm,
            ],
            TableKind::CropProduction => &[
                CanonicalField::Region,
                CanonicalField::District,
                CanonicalField::Year,
                CanonicalField::Crop,
                CanonicalField::Production,
                CanonicalField::Unit,
            ],
        }
    }
}

lazy_static! {
    /// Known spellings of each canonical field, lowercase with underscores
    static ref ALIASES: HashMap<CanonicalField, Vec<&'static str>> = {
        let mut m = HashMap::new();
        m.insert(
            CanonicalField::Region,
            vec!["state", "state_name", "st_name", "state_ut", "statecode", "region"],
        );
        m.insert(
            CanonicalField::District,
            vec!["district", "district_name", "dist_name", "districtcode"],
        );
        m.insert(
            CanonicalField::Year,
            vec!["year", "yr", "crop_year", "financial_year", "season_year"],
        );
        m.insert(
            CanonicalField::Crop,
            vec!["crop", "crop_name", "cropname", "cropcode"],
        );
        m.insert(
            CanonicalField::Production,
            vec![
                "production",
                "production_tonnes",
                "production_quantity",
                "production_in_tonnes",
                "production_in_qtls",
                "qty",
            ],
        );
        m.insert(
            CanonicalField::Unit,
            vec!["unit", "units", "production_unit"],
        );
        m.insert(
            CanonicalField::RainfallMm,
            vec![
                "rainfall",
                "rainfall_mm",
                "avg_annual_rainfall",
                "annual_rainfall",
                "rain_mm",
            ],
        );
        m
    };

    /// Common state abbreviations seen in the source catalogs
    static ref REGION_ABBREVIATIONS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("TN", "Tamil Nadu");
        m.insert("KA", "Karnataka");
        m.insert("KL", "Kerala");
        m.insert("AP", "Andhra Pradesh");
        m.insert("TS", "Telangana");
        m.insert("TG", "Telangana");
        m.insert("MH", "Maharashtra");
        m.insert("MP", "Madhya Pradesh");
        m.insert("UP", "Uttar Pradesh");
        m.insert("WB", "West Bengal");
        m.insert("RJ", "Rajasthan");
        m.insert("GJ", "Gujarat");
        m.insert("PB", "Punjab");
        m.insert("HR", "Haryana");
        m.insert("OD", "Odisha");
        m.insert("BR", "Bihar");
        m.insert("JH", "Jharkhand");
        m.insert("CG", "Chhattisgarh");
        m.insert("HP", "Himachal Pradesh");
        m.insert("UK", "Uttarakhand");
        m.insert("AS", "Assam");
        m
    };

    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref YEAR_PATTERN: Regex = Regex::new(r"(\d{4})").unwrap();
}

/// Result of mapping one raw table's headers: canonical field -> column index
#[derive(Debug, Clone, Default)]
pub struct SchemaMapping {
    pub columns: HashMap<CanonicalField, usize>,
    /// Raw headers that matched nothing and were dropped
    pub dropped_columns: Vec<String>,
}

impl SchemaMapping {
    pub fn column(&self, field: CanonicalField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn has_any_required(&self, kind: TableKind) -> bool {
        CanonicalField::required_for(kind)
            .iter()
            .any(|f| self.columns.contains_key(f))
    }
}

fn normalize_header(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    WHITESPACE.replace_all(&lowered, "_").to_string()
}

/// Best canonical field for one header, with its similarity score
fn best_alias(header: &str, kind: TableKind) -> Option<(CanonicalField, f64)> {
    let normalized = normalize_header(header);
    let mut best: Option<(CanonicalField, f64)> = None;
    for field in CanonicalField::candidates_for(kind) {
        for alias in &ALIASES[field] {
            if normalized == *alias {
                return Some((*field, 1.0));
            }
            let score = jaro_winkler(&normalized, alias);
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((*field, score));
            }
        }
    }
    best
}

/// Map a raw table's headers to canonical fields.
///
/// Headers are scanned in order; the first header to claim a canonical field
/// keeps it, which makes the mapping deterministic for a given header row.
/// If no header claims `year`, a fallback pass looks for a column whose
/// non-empty sample values all contain a 4-digit year.
pub fn map_schema(table: &RawTable, kind: TableKind) -> SchemaMapping {
    let mut mapping = SchemaMapping::default();

    for (idx, header) in table.headers.iter().enumerate() {
        match best_alias(header, kind) {
            Some((field, score)) if score >= ALIAS_THRESHOLD => {
                if mapping.columns.contains_key(&field) {
                    debug!(
                        "Column '{}' also matches {} (score {:.2}) but it is already mapped",
                        header,
                        field.as_str(),
                        score
                    );
                    mapping.dropped_columns.push(header.clone());
                } else {
                    debug!(
                        "Mapped column '{}' -> {} (score {:.2})",
                        header,
                        field.as_str(),
                        score
                    );
                    mapping.columns.insert(field, idx);
                }
            }
            _ => mapping.dropped_columns.push(header.clone()),
        }
    }

    if !mapping.columns.contains_key(&CanonicalField::Year) {
        if let Some(idx) = detect_year_column(table, &mapping) {
            debug!(
                "Year fallback: column '{}' looks like a year column",
                table.headers[idx]
            );
            mapping.dropped_columns.retain(|h| h != &table.headers[idx]);
            mapping.columns.insert(CanonicalField::Year, idx);
        }
    }

    if !mapping.dropped_columns.is_empty() {
        warn!(
            "{}: dropped {} unmapped column(s): {:?}",
            table.source_file,
            mapping.dropped_columns.len(),
            mapping.dropped_columns
        );
    }

    mapping
}

/// Find an unmapped column whose non-empty values all carry a 4-digit year
fn detect_year_column(table: &RawTable, mapping: &SchemaMapping) -> Option<usize> {
    let used: Vec<usize> = mapping.columns.values().copied().collect();
    for idx in 0..table.headers.len() {
        if used.contains(&idx) {
            continue;
        }
        let mut saw_value = false;
        let mut all_years = true;
        for row in table.rows.iter().take(50) {
            let cell = row.get(idx).map(|s| s.trim()).unwrap_or("");
            if cell.is_empty() {
                continue;
            }
            saw_value = true;
            if !YEAR_PATTERN.is_match(cell) {
                all_years = false;
                break;
            }
        }
        if saw_value && all_years {
            return Some(idx);
        }
    }
    None
}

/// Extract a year from a raw cell. Accepts plain years ("2019") and spans
/// like "2018-19" or "Jun-2019", taking the first 4-digit group.
pub fn parse_year(raw: &str) -> Option<i32> {
    YEAR_PATTERN
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
}

fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonicalize a region (state) value: expand known abbreviations, collapse
/// whitespace, title-case. Unknown values pass through (identity mapping) so
/// unmatched rows simply fail filters instead of breaking the load.
pub fn canonical_region(raw: &str) -> String {
    let trimmed = WHITESPACE.replace_all(raw.trim(), " ").to_string();
    let upper = trimmed.to_uppercase();
    if let Some(full) = REGION_ABBREVIATIONS.get(upper.as_str()) {
        return full.to_string();
    }
    title_case(&trimmed)
}

/// Canonicalize a crop name: collapse whitespace, title-case
pub fn canonical_crop(raw: &str) -> String {
    let trimmed = WHITESPACE.replace_all(raw.trim(), " ").to_string();
    title_case(&trimmed)
}
