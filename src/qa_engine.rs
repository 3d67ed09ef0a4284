//! QA Engine - the four fixed question templates over the canonical tables
//!
//! Every template follows the same shape: validate inputs, filter the
//! canonical tables by the requested dimensions, aggregate, and attach a
//! provenance trail built from the exact row set the aggregate used. The
//! engine is stateless across calls and holds only a shared reference to the
//! read-only data store.

use crate::error::{QaError, Result};
use crate::generator::{self, CropStats, Statement};
use crate::model::{CropProductionRecord, DataStore, RainfallRecord};
use crate::provenance::ProvenanceTrail;
use crate::schema_mapper::{canonical_crop, canonical_region};
use crate::stats;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info};

/// Year window used by the policy-argument template, matching the span the
/// source catalogs cover well
pub const POLICY_YEAR_WINDOW: usize = 5;

/// Minimum overlapping (production, rainfall) years for a correlation
pub const MIN_CORRELATION_POINTS: usize = 3;

/// Which end of the district ranking to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Extreme {
    Max,
    Min,
}

impl Extreme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Extreme::Max => "max",
            Extreme::Min => "min",
        }
    }
}

impl FromStr for Extreme {
    type Err = QaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "max" | "highest" => Ok(Extreme::Max),
            "min" | "lowest" => Ok(Extreme::Min),
            other => Err(QaError::NoMatch(format!(
                "unknown extreme '{}', expected 'max' or 'min'",
                other
            ))),
        }
    }
}

/// One crop's summed production inside a window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropTotal {
    pub crop: String,
    pub total_production: f64,
}

/// Per-region half of a region comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionStats {
    pub region: String,
    pub mean_rainfall_mm: f64,
    /// Top crops by total production, descending, alphabetical tie-break
    pub top_crops: Vec<CropTotal>,
}

/// Template 1 result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionComparison {
    /// Years the aggregates cover, most recent first
    pub years_used: Vec<i32>,
    pub region_a: RegionStats,
    pub region_b: RegionStats,
    pub provenance: ProvenanceTrail,
}

/// Template 2 result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictExtreme {
    pub region: String,
    pub crop: String,
    pub extreme: Extreme,
    pub district: String,
    /// Production summed across all available years for that district
    pub total_production: f64,
    pub provenance: ProvenanceTrail,
}

/// One year in a trend sequence. A missing side is marked absent rather than
/// dropping the year from the sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendPoint {
    pub year: i32,
    pub production: Option<f64>,
    pub rainfall_mm: Option<f64>,
}

/// Template 3 result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendCorrelation {
    pub crop: String,
    pub region: String,
    /// Ordered by year ascending
    pub trend: Vec<TrendPoint>,
    /// Pearson r over the years present in both series, always in [-1, 1]
    pub correlation: f64,
    /// Years that entered the correlation
    pub correlation_years: Vec<i32>,
    /// Least-squares slope of yearly production, when at least 2 points exist
    pub trend_slope: Option<f64>,
    pub provenance: ProvenanceTrail,
}

/// Template 4 result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyArgument {
    pub region: String,
    pub crop_a: String,
    pub crop_b: String,
    pub years_used: Vec<i32>,
    /// 2-4 comparative statements, each with its own sub-provenance
    pub statements: Vec<Statement>,
    pub provenance: ProvenanceTrail,
}

/// The query engine. Stateless across calls; borrows the read-only store.
pub struct QaEngine<'a> {
    store: &'a DataStore,
}

impl<'a> QaEngine<'a> {
    pub fn new(store: &'a DataStore) -> Self {
        Self { store }
    }

    /// Template 1: mean rainfall and top-3 crops for two regions over the
    /// most recent `year_count` years present in the rainfall data.
    pub fn compare_regions(
        &self,
        region_a: &str,
        region_b: &str,
        year_count: usize,
    ) -> Result<RegionComparison> {
        if year_count == 0 {
            return Err(QaError::InsufficientData(
                "compare_regions: year_count must be at least 1".to_string(),
            ));
        }
        let region_a = canonical_region(region_a);
        let region_b = canonical_region(region_b);
        info!(
            "compare_regions: '{}' vs '{}' over {} year(s)",
            region_a, region_b, year_count
        );

        let years = self.store.rainfall_years_desc();
        if years.is_empty() {
            return Err(QaError::InsufficientData(
                "compare_regions: no rainfall data loaded".to_string(),
            ));
        }
        let window: Vec<i32> = years.into_iter().take(year_count).collect();
        debug!("compare_regions: year window {:?}", window);

        let (stats_a, trail_a) = self.region_stats(&region_a, &window)?;
        let (stats_b, trail_b) = self.region_stats(&region_b, &window)?;

        Ok(RegionComparison {
            years_used: window,
            region_a: stats_a,
            region_b: stats_b,
            provenance: trail_a.merged(&trail_b),
        })
    }

    fn region_stats(&self, region: &str, window: &[i32]) -> Result<(RegionStats, ProvenanceTrail)> {
        let rain_rows: Vec<&RainfallRecord> = self
            .store
            .rainfall
            .iter()
            .filter(|r| r.region == region && window.contains(&r.year))
            .collect();
        if rain_rows.is_empty() {
            return Err(QaError::InsufficientData(format!(
                "compare_regions: no rainfall rows for region '{}' in years {:?}",
                region, window
            )));
        }

        let prod_rows: Vec<&CropProductionRecord> = self
            .store
            .production
            .iter()
            .filter(|r| r.region == region && window.contains(&r.year))
            .collect();
        if prod_rows.is_empty() {
            return Err(QaError::InsufficientData(format!(
                "compare_regions: no production rows for region '{}' in years {:?}",
                region, window
            )));
        }

        let values: Vec<f64> = rain_rows.iter().map(|r| r.rainfall_mm).collect();
        let mean_rainfall_mm = stats::mean(&values).unwrap_or(0.0);

        let mut by_crop: BTreeMap<&str, f64> = BTreeMap::new();
        for row in &prod_rows {
            *by_crop.entry(row.crop.as_str()).or_insert(0.0) += row.production;
        }
        // descending by total, alphabetical on ties
        let totals: Vec<CropTotal> = by_crop
            .into_iter()
            .map(|(crop, total_production)| CropTotal {
                crop: crop.to_string(),
                total_production,
            })
            .sorted_by(|a, b| {
                b.total_production
                    .partial_cmp(&a.total_production)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.crop.cmp(&b.crop))
            })
            .take(3)
            .collect();

        let mut trail = ProvenanceTrail::from_rainfall(rain_rows.iter().copied());
        for row in &prod_rows {
            trail.add_production(row);
        }

        Ok((
            RegionStats {
                region: region.to_string(),
                mean_rainfall_mm,
                top_crops: totals,
            },
            trail,
        ))
    }

    /// Template 2: the district with the highest or lowest summed production
    /// for a (region, crop) pair, across all available years.
    pub fn district_extreme(
        &self,
        region: &str,
        crop: &str,
        extreme: Extreme,
    ) -> Result<DistrictExtreme> {
        let region = canonical_region(region);
        let crop = canonical_crop(crop);
        info!(
            "district_extreme: {} district for crop '{}' in '{}'",
            extreme.as_str(),
            crop,
            region
        );

        let rows: Vec<&CropProductionRecord> = self
            .store
            .production
            .iter()
            .filter(|r| r.region == region && r.crop == crop && r.district.is_some())
            .collect();
        if rows.is_empty() {
            return Err(QaError::NoMatch(format!(
                "district_extreme: no district-level production rows for crop '{}' in region '{}'",
                crop, region
            )));
        }

        let mut by_district: BTreeMap<&str, f64> = BTreeMap::new();
        for row in &rows {
            let district = row.district.as_deref().unwrap_or_default();
            *by_district.entry(district).or_insert(0.0) += row.production;
        }

        // iterating in ascending district order makes the alphabetical
        // tie-break fall out of strict comparison
        let mut best: Option<(&str, f64)> = None;
        for (district, total) in &by_district {
            let better = match best {
                None => true,
                Some((_, best_total)) => match extreme {
                    Extreme::Max => *total > best_total,
                    Extreme::Min => *total < best_total,
                },
            };
            if better {
                best = Some((*district, *total));
            }
        }
        let (district, total_production) = best.expect("non-empty district map");

        Ok(DistrictExtreme {
            region,
            crop,
            extreme,
            district: district.to_string(),
            total_production,
            provenance: ProvenanceTrail::from_production(rows.iter().copied()),
        })
    }

    /// Template 3: yearly (production, rainfall) trend for a crop in a region
    /// plus the Pearson correlation over the years both series cover.
    pub fn trend_correlation(
        &self,
        crop: &str,
        region: &str,
        year_span: usize,
    ) -> Result<TrendCorrelation> {
        if year_span == 0 {
            return Err(QaError::InsufficientData(
                "trend_correlation: year_span must be at least 1".to_string(),
            ));
        }
        let region = canonical_region(region);
        let crop = canonical_crop(crop);
        info!(
            "trend_correlation: crop '{}' in '{}' over {} year(s)",
            crop, region, year_span
        );

        let prod_rows: Vec<&CropProductionRecord> = self
            .store
            .production
            .iter()
            .filter(|r| r.region == region && r.crop == crop)
            .collect();
        let rain_rows: Vec<&RainfallRecord> = self
            .store
            .rainfall
            .iter()
            .filter(|r| r.region == region)
            .collect();

        let prod_by_year = yearly_production(&prod_rows);
        let rain_by_year = yearly_rainfall(&rain_rows);

        // window: most recent `year_span` years present in either series
        let mut all_years: Vec<i32> = prod_by_year
            .keys()
            .chain(rain_by_year.keys())
            .copied()
            .collect::<std::collections::BTreeSet<i32>>()
            .into_iter()
            .rev()
            .take(year_span)
            .collect();
        all_years.reverse();

        let trend: Vec<TrendPoint> = all_years
            .iter()
            .map(|year| TrendPoint {
                year: *year,
                production: prod_by_year.get(year).copied(),
                rainfall_mm: rain_by_year.get(year).copied(),
            })
            .collect();

        let overlap: Vec<i32> = all_years
            .iter()
            .filter(|y| prod_by_year.contains_key(*y) && rain_by_year.contains_key(*y))
            .copied()
            .collect();
        if overlap.len() < MIN_CORRELATION_POINTS {
            return Err(QaError::InsufficientData(format!(
                "trend_correlation: only {} overlapping year(s) for crop '{}' and rainfall in \
                 region '{}', need at least {}",
                overlap.len(),
                crop,
                region,
                MIN_CORRELATION_POINTS
            )));
        }

        let xs: Vec<f64> = overlap.iter().map(|y| prod_by_year[y]).collect();
        let ys: Vec<f64> = overlap.iter().map(|y| rain_by_year[y]).collect();
        let correlation = stats::pearson(&xs, &ys).ok_or_else(|| {
            QaError::InsufficientData(format!(
                "trend_correlation: correlation undefined for crop '{}' in region '{}' \
                 (a series has zero variance)",
                crop, region
            ))
        })?;

        let slope_years: Vec<f64> = all_years
            .iter()
            .filter(|y| prod_by_year.contains_key(*y))
            .map(|y| *y as f64)
            .collect();
        let slope_values: Vec<f64> = all_years
            .iter()
            .filter_map(|y| prod_by_year.get(y).copied())
            .collect();
        let trend_slope = stats::ols_slope(&slope_years, &slope_values);

        let window = &all_years;
        let mut trail = ProvenanceTrail::from_production(
            prod_rows.iter().copied().filter(|r| window.contains(&r.year)),
        );
        for row in rain_rows.iter().filter(|r| window.contains(&r.year)) {
            trail.add_rainfall(row);
        }

        Ok(TrendCorrelation {
            crop,
            region,
            trend,
            correlation,
            correlation_years: overlap,
            trend_slope,
            provenance: trail,
        })
    }

    /// Template 4: comparative policy statements for two crops in a region,
    /// over the most recent production years.
    pub fn policy_argument(
        &self,
        crop_a: &str,
        crop_b: &str,
        region: &str,
    ) -> Result<PolicyArgument> {
        let region = canonical_region(region);
        let crop_a = canonical_crop(crop_a);
        let crop_b = canonical_crop(crop_b);
        info!(
            "policy_argument: '{}' vs '{}' in '{}'",
            crop_a, crop_b, region
        );

        let window: Vec<i32> = self
            .store
            .production_years_desc()
            .into_iter()
            .take(POLICY_YEAR_WINDOW)
            .collect();
        if window.is_empty() {
            return Err(QaError::NoMatch(format!(
                "policy_argument: no production data loaded for region '{}'",
                region
            )));
        }

        let rain_rows: Vec<&RainfallRecord> = self
            .store
            .rainfall
            .iter()
            .filter(|r| r.region == region && window.contains(&r.year))
            .collect();
        let rain_by_year = yearly_rainfall(&rain_rows);
        let drought_years = drought_years(&rain_by_year);
        if !drought_years.is_empty() {
            debug!(
                "policy_argument: drought year(s) in window: {:?}",
                drought_years
            );
        }

        let stats_a = self.crop_stats(&crop_a, &region, &window, &rain_by_year, &drought_years)?;
        let stats_b = self.crop_stats(&crop_b, &region, &window, &rain_by_year, &drought_years)?;
        let rain_trail = if rain_rows.is_empty() {
            None
        } else {
            Some(ProvenanceTrail::from_rainfall(rain_rows.iter().copied()))
        };

        let statements = generator::generate(&stats_a, &stats_b, rain_trail.as_ref());
        let mut provenance = stats_a.provenance.merged(&stats_b.provenance);
        if let Some(rain) = &rain_trail {
            provenance = provenance.merged(rain);
        }

        Ok(PolicyArgument {
            region,
            crop_a,
            crop_b,
            years_used: window,
            statements,
            provenance,
        })
    }

    fn crop_stats(
        &self,
        crop: &str,
        region: &str,
        window: &[i32],
        rain_by_year: &BTreeMap<i32, f64>,
        drought_years: &[i32],
    ) -> Result<CropStats> {
        let rows: Vec<&CropProductionRecord> = self
            .store
            .production
            .iter()
            .filter(|r| r.region == region && r.crop == crop && window.contains(&r.year))
            .collect();
        if rows.is_empty() {
            return Err(QaError::NoMatch(format!(
                "policy_argument: crop '{}' has no production rows in region '{}' for years {:?}",
                crop, region, window
            )));
        }

        let by_year = yearly_production(&rows);
        let yearly: Vec<(i32, f64)> = by_year.iter().map(|(y, v)| (*y, *v)).collect();
        let totals: Vec<f64> = yearly.iter().map(|(_, v)| *v).collect();
        let years_f: Vec<f64> = yearly.iter().map(|(y, _)| *y as f64).collect();

        let overlap: Vec<i32> = by_year
            .keys()
            .filter(|y| rain_by_year.contains_key(*y))
            .copied()
            .collect();
        let rain_correlation = if overlap.len() >= 2 {
            let xs: Vec<f64> = overlap.iter().map(|y| by_year[y]).collect();
            let ys: Vec<f64> = overlap.iter().map(|y| rain_by_year[y]).collect();
            stats::pearson(&xs, &ys).map(|r| (r, overlap.len()))
        } else {
            None
        };

        let drought_totals: Vec<f64> = drought_years
            .iter()
            .filter_map(|y| by_year.get(y).copied())
            .collect();
        let drought_drop = if drought_totals.is_empty() {
            None
        } else {
            let mean_all = stats::mean(&totals).unwrap_or(0.0);
            let mean_drought = stats::mean(&drought_totals).unwrap_or(0.0);
            Some((mean_all - mean_drought) / mean_all.max(1.0))
        };

        Ok(CropStats {
            crop: crop.to_string(),
            region: region.to_string(),
            total_production: totals.iter().sum(),
            yearly,
            trend_slope: stats::ols_slope(&years_f, &totals),
            variance: stats::variance(&totals),
            rain_correlation,
            drought_drop,
            provenance: ProvenanceTrail::from_production(rows.iter().copied()),
        })
    }
}

fn yearly_production(rows: &[&CropProductionRecord]) -> BTreeMap<i32, f64> {
    let mut by_year = BTreeMap::new();
    for row in rows {
        *by_year.entry(row.year).or_insert(0.0) += row.production;
    }
    by_year
}

/// Mean rainfall per year (multiple source files can cover the same year)
fn yearly_rainfall(rows: &[&RainfallRecord]) -> BTreeMap<i32, f64> {
    let mut sums: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
    for row in rows {
        let entry = sums.entry(row.year).or_insert((0.0, 0));
        entry.0 += row.rainfall_mm;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(y, (sum, n))| (y, sum / n as f64))
        .collect()
}

/// Years whose rainfall sits below mean - max(0.1 * mean, std_dev)
fn drought_years(rain_by_year: &BTreeMap<i32, f64>) -> Vec<i32> {
    let values: Vec<f64> = rain_by_year.values().copied().collect();
    let mean = match stats::mean(&values) {
        Some(m) => m,
        None => return Vec::new(),
    };
    let spread = stats::std_dev(&values).unwrap_or(0.0).max(0.1 * mean);
    let threshold = mean - spread;
    rain_by_year
        .iter()
        .filter(|(_, mm)| **mm < threshold)
        .map(|(y, _)| *y)
        .collect()
}
