//! Canonical Data Model - fixed-shape records shared by the normalizer and QA engine
//!
//! Raw CSV tables are loosely typed; everything downstream of the normalizer
//! works on these structs. Canonical tables are built once per load and are
//! read-only for the QA engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which of the two recognized table shapes a raw CSV holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableKind {
    Rainfall,
    CropProduction,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Rainfall => "rainfall",
            TableKind::CropProduction => "crop_production",
        }
    }
}

/// A raw table as read from a CSV file: trimmed headers plus string cells.
/// No typing has happened yet - that is the normalizer's job.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub source_file: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// One canonical rainfall observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RainfallRecord {
    /// Canonicalized region (state) name
    pub region: String,
    pub year: i32,
    /// Always >= 0 after normalization
    pub rainfall_mm: f64,
    pub source_file: String,
    /// Deterministic checksum of the raw row, for provenance permalinks
    pub row_id: String,
}

/// One canonical crop production observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropProductionRecord {
    pub region: String,
    pub district: Option<String>,
    /// Canonicalized crop name
    pub crop: String,
    pub year: i32,
    /// Always >= 0 after normalization
    pub production: f64,
    pub unit: String,
    pub source_file: String,
    pub row_id: String,
}

/// Counts reported by a normalization pass. Malformed rows are dropped and
/// counted rather than raised - partial success is the designed behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizeReport {
    pub source_file: String,
    pub rows_in: usize,
    pub rows_kept: usize,
    pub rows_dropped: usize,
    /// Raw column names that matched no canonical field
    pub dropped_columns: Vec<String>,
}

/// Output of one `normalize()` call: typed records of a single kind plus the
/// drop counts for that table.
#[derive(Debug, Clone)]
pub enum CanonicalTable {
    Rainfall {
        records: Vec<RainfallRecord>,
        report: NormalizeReport,
    },
    Production {
        records: Vec<CropProductionRecord>,
        report: NormalizeReport,
    },
}

impl CanonicalTable {
    pub fn report(&self) -> &NormalizeReport {
        match self {
            CanonicalTable::Rainfall { report, .. } => report,
            CanonicalTable::Production { report, .. } => report,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CanonicalTable::Rainfall { records, .. } => records.len(),
            CanonicalTable::Production { records, .. } => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The read-only store of all loaded canonical tables.
///
/// Built once at startup and passed by reference to the QA engine. There is
/// deliberately no module-level cache: the caller owns the store.
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    pub rainfall: Vec<RainfallRecord>,
    pub production: Vec<CropProductionRecord>,
    source_files: BTreeSet<String>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb a normalized table. Called during the load phase only; once the
    /// store is handed to the QA engine it is never mutated again.
    pub fn add(&mut self, table: CanonicalTable) {
        match table {
            CanonicalTable::Rainfall { records, report } => {
                self.source_files.insert(report.source_file);
                self.rainfall.extend(records);
            }
            CanonicalTable::Production { records, report } => {
                self.source_files.insert(report.source_file);
                self.production.extend(records);
            }
        }
    }

    pub fn source_files(&self) -> &BTreeSet<String> {
        &self.source_files
    }

    /// Distinct rainfall years, most recent first
    pub fn rainfall_years_desc(&self) -> Vec<i32> {
        let years: BTreeSet<i32> = self.rainfall.iter().map(|r| r.year).collect();
        years.into_iter().rev().collect()
    }

    /// Distinct production years, most recent first
    pub fn production_years_desc(&self) -> Vec<i32> {
        let years: BTreeSet<i32> = self.production.iter().map(|r| r.year).collect();
        years.into_iter().rev().collect()
    }
}
