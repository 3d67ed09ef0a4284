//! Station Layout - melts wide per-station rainfall CSVs into long form
//!
//! Some rainfall catalogs ship one column per gauging station
//! (`actual_rainfall_in_<station>_in_mm`) with a period column instead of a
//! year. This module detects that layout, melts it to long form, maps station
//! names to regions via a substring table, and averages readings down to one
//! (region, year, rainfall_mm) row. The output is a plain RawTable so the
//! normal schema-mapping path applies to it unchanged.

use crate::model::RawTable;
use crate::schema_mapper::parse_year;
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Region assigned to stations that match no mapping entry
pub const UNKNOWN_REGION: &str = "Unknown";

const PERIOD_COLUMN_HINTS: &[&str] = &["month", "period", "peroid", "mon"];

/// Substring -> region lookup for station names
#[derive(Debug, Clone)]
pub struct StationMap {
    entries: Vec<(String, String)>,
}

impl Default for StationMap {
    fn default() -> Self {
        // Stations from the Karur district gauging network shipped with the
        // sample data; all map to Tamil Nadu.
        let tamil_nadu = [
            "karur",
            "aravakurichi",
            "paramathi",
            "anaipalyam",
            "kulithalai",
            "thogaimalai",
            "kadavur",
            "palaviduthi",
            "mayanur",
            "panchapatti",
        ];
        Self {
            entries: tamil_nadu
                .iter()
                .map(|s| (s.to_string(), "Tamil Nadu".to_string()))
                .collect(),
        }
    }
}

impl StationMap {
    /// Load an override map from a CSV with columns `station_substring,state`
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read station map {}", path.display()))?;
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());
        let mut entries = Vec::new();
        for result in rdr.records() {
            let record = result.context("Failed to read station map record")?;
            let substring = record.get(0).unwrap_or("").trim().to_lowercase();
            let region = record.get(1).unwrap_or("").trim().to_string();
            if !substring.is_empty() && !region.is_empty() {
                entries.push((substring, region));
            }
        }
        debug!("Loaded {} station mapping(s) from {}", entries.len(), path.display());
        Ok(Self { entries })
    }

    pub fn region_for(&self, station: &str) -> String {
        let lowered = station.to_lowercase();
        for (substring, region) in &self.entries {
            if lowered.contains(substring.as_str()) {
                return region.clone();
            }
        }
        UNKNOWN_REGION.to_string()
    }
}

fn is_station_column(header: &str) -> bool {
    let h = header.trim().to_lowercase();
    (h.contains("actual") && h.contains("rain")) || h.starts_with("actual_rainfall")
}

/// True when the table uses the wide per-station layout
pub fn is_station_layout(table: &RawTable) -> bool {
    table.headers.iter().any(|h| is_station_column(h))
}

fn station_name(header: &str) -> String {
    let mut name = header.trim().to_lowercase();
    for prefix in ["actual_rainfall_in_", "actual rainfall in "] {
        if let Some(rest) = name.strip_prefix(prefix) {
            name = rest.to_string();
            break;
        }
    }
    for suffix in ["_in_mm", " in mm"] {
        if let Some(rest) = name.strip_suffix(suffix) {
            name = rest.to_string();
            break;
        }
    }
    name.replace('_', " ").trim().to_string()
}

/// Index of the column to pull the year from: a period-named column first,
/// then any non-station column whose values contain a 4-digit year.
fn year_column(table: &RawTable, station_cols: &[usize]) -> Option<usize> {
    for hint in PERIOD_COLUMN_HINTS {
        for (idx, header) in table.headers.iter().enumerate() {
            if station_cols.contains(&idx) {
                continue;
            }
            if header.trim().to_lowercase() == *hint {
                return Some(idx);
            }
        }
    }
    for (idx, _) in table.headers.iter().enumerate() {
        if station_cols.contains(&idx) {
            continue;
        }
        let any_year = table
            .rows
            .iter()
            .any(|row| row.get(idx).and_then(|c| parse_year(c)).is_some());
        if any_year {
            return Some(idx);
        }
    }
    None
}

/// Melt a wide per-station table into a long (region, year, rainfall_mm)
/// RawTable, averaging all station readings per region and year.
pub fn melt_station_layout(table: &RawTable, stations: &StationMap) -> RawTable {
    let station_cols: Vec<usize> = table
        .headers
        .iter()
        .enumerate()
        .filter(|(_, h)| is_station_column(h))
        .map(|(idx, _)| idx)
        .collect();

    let year_col = year_column(table, &station_cols);
    if year_col.is_none() {
        warn!(
            "{}: station layout without a recognizable year column, all rows will lack a year",
            table.source_file
        );
    }

    // (region, year) -> readings
    let mut readings: BTreeMap<(String, i32), Vec<f64>> = BTreeMap::new();
    let mut unmapped_stations = 0usize;

    for row in &table.rows {
        let year = match year_col.and_then(|idx| row.get(idx)).and_then(|c| parse_year(c)) {
            Some(y) => y,
            None => continue,
        };
        for &col in &station_cols {
            let cell = row.get(col).map(|s| s.trim()).unwrap_or("");
            let value: f64 = match cell.parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            let station = station_name(&table.headers[col]);
            let region = stations.region_for(&station);
            if region == UNKNOWN_REGION {
                unmapped_stations += 1;
            }
            readings.entry((region, year)).or_default().push(value);
        }
    }

    if unmapped_stations > 0 {
        warn!(
            "{}: {} station reading(s) matched no region mapping",
            table.source_file, unmapped_stations
        );
    }

    let rows: Vec<Vec<String>> = readings
        .into_iter()
        .map(|((region, year), values)| {
            let avg = values.iter().sum::<f64>() / values.len() as f64;
            vec![region, year.to_string(), avg.to_string()]
        })
        .collect();

    debug!(
        "{}: melted {} station column(s) into {} (region, year) row(s)",
        table.source_file,
        station_cols.len(),
        rows.len()
    );

    RawTable {
        source_file: table.source_file.clone(),
        headers: vec![
            "state".to_string(),
            "year".to_string(),
            "rainfall_mm".to_string(),
        ],
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide_table() -> RawTable {
        RawTable {
            source_file: "stations.csv".to_string(),
            headers: vec![
                "Month".to_string(),
                "Actual_Rainfall_in_Karur_in_mm".to_string(),
                "Actual_Rainfall_in_Mayanur_in_mm".to_string(),
                "Actual_Rainfall_in_Somewhere_in_mm".to_string(),
            ],
            rows: vec![
                vec!["Jun-2019".into(), "100".into(), "200".into(), "50".into()],
                vec!["Jul-2019".into(), "300".into(), "400".into(), "70".into()],
            ],
        }
    }

    #[test]
    fn test_detects_station_layout() {
        assert!(is_station_layout(&wide_table()));
        let plain = RawTable {
            source_file: "r.csv".into(),
            headers: vec!["state".into(), "year".into(), "rainfall_mm".into()],
            rows: vec![],
        };
        assert!(!is_station_layout(&plain));
    }

    #[test]
    fn test_melt_averages_per_region_and_year() {
        let melted = melt_station_layout(&wide_table(), &StationMap::default());
        assert_eq!(melted.headers, vec!["state", "year", "rainfall_mm"]);
        // Karur + Mayanur map to Tamil Nadu: mean of 100,200,300,400 = 250
        let tn = melted
            .rows
            .iter()
            .find(|r| r[0] == "Tamil Nadu")
            .expect("Tamil Nadu row");
        assert_eq!(tn[1], "2019");
        assert_eq!(tn[2], "250");
        // Somewhere matches nothing and lands in Unknown
        let unknown = melted.rows.iter().find(|r| r[0] == UNKNOWN_REGION).unwrap();
        assert_eq!(unknown[2], "60");
    }

    #[test]
    fn test_rows_without_year_are_skipped() {
        let mut t = wide_table();
        t.rows.push(vec!["no year".into(), "999".into(), "999".into(), "999".into()]);
        let melted = melt_station_layout(&t, &StationMap::default());
        let tn = melted.rows.iter().find(|r| r[0] == "Tamil Nadu").unwrap();
        assert_eq!(tn[2], "250");
    }
}
