//! Provenance - which source files, years, and rows backed a computed answer
//!
//! Every QA engine result carries exactly one `ProvenanceTrail`. The trail is
//! a value object built from the exact filtered row set a template used; it is
//! copied alongside the result and never mutated afterwards.

use crate::model::{CropProductionRecord, RainfallRecord};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;

/// Cap on row snapshots carried in a trail
pub const MAX_SAMPLE_ROWS: usize = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvenanceTrail {
    pub source_files: BTreeSet<String>,
    pub years_used: BTreeSet<i32>,
    /// Up to MAX_SAMPLE_ROWS record snapshots, in the order they were matched
    pub sample_rows: Vec<serde_json::Value>,
}

impl ProvenanceTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rainfall(&mut self, rec: &RainfallRecord) {
        self.source_files.insert(rec.source_file.clone());
        self.years_used.insert(rec.year);
        if self.sample_rows.len() < MAX_SAMPLE_ROWS {
            self.sample_rows.push(json!({
                "kind": "rainfall",
                "region": rec.region,
                "year": rec.year,
                "rainfall_mm": rec.rainfall_mm,
                "source_file": rec.source_file,
                "row_id": rec.row_id,
            }));
        }
    }

    pub fn add_production(&mut self, rec: &CropProductionRecord) {
        self.source_files.insert(rec.source_file.clone());
        self.years_used.insert(rec.year);
        if self.sample_rows.len() < MAX_SAMPLE_ROWS {
            self.sample_rows.push(json!({
                "kind": "production",
                "region": rec.region,
                "district": rec.district,
                "crop": rec.crop,
                "year": rec.year,
                "production": rec.production,
                "unit": rec.unit,
                "source_file": rec.source_file,
                "row_id": rec.row_id,
            }));
        }
    }

    pub fn from_rainfall<'a, I: IntoIterator<Item = &'a RainfallRecord>>(rows: I) -> Self {
        let mut trail = Self::new();
        for r in rows {
            trail.add_rainfall(r);
        }
        trail
    }

    pub fn from_production<'a, I: IntoIterator<Item = &'a CropProductionRecord>>(rows: I) -> Self {
        let mut trail = Self::new();
        for r in rows {
            trail.add_production(r);
        }
        trail
    }

    /// Union of two trails. The sample cap still applies; left rows win slots.
    pub fn merged(&self, other: &ProvenanceTrail) -> ProvenanceTrail {
        let mut out = self.clone();
        out.source_files
            .extend(other.source_files.iter().cloned());
        out.years_used.extend(other.years_used.iter());
        for row in &other.sample_rows {
            if out.sample_rows.len() >= MAX_SAMPLE_ROWS {
                break;
            }
            out.sample_rows.push(row.clone());
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.source_files.is_empty()
    }
}
