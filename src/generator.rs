//! Argument Generator - renders comparative crop statistics into short
//! policy statements
//!
//! Rule-based text assembly, no free-form generation: a fixed lookup table
//! maps each comparison outcome to a sentence template, and numeric
//! formatting is kept separate from phrase selection. Every statement carries
//! the sub-provenance that backs it - the rows behind the two crops being
//! compared, not the whole dataset.

use crate::provenance::ProvenanceTrail;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-crop aggregates computed by the QA engine's policy template
#[derive(Debug, Clone)]
pub struct CropStats {
    pub crop: String,
    pub region: String,
    pub total_production: f64,
    /// (year, summed production), ascending by year
    pub yearly: Vec<(i32, f64)>,
    pub trend_slope: Option<f64>,
    /// Variance of the yearly totals; None with fewer than 2 years
    pub variance: Option<f64>,
    /// (Pearson r against regional rainfall, overlapping years)
    pub rain_correlation: Option<(f64, usize)>,
    /// Relative production drop in drought years; None when no drought year
    /// falls inside the window
    pub drought_drop: Option<f64>,
    pub provenance: ProvenanceTrail,
}

/// One generated statement with the provenance that backs it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub text: String,
    pub provenance: ProvenanceTrail,
}

/// Which comparison a statement expresses. Each variant keys one sentence
/// template below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOutcome {
    ProductionHigher,
    ProductionComparable,
    TrendSteadier,
    TrendRising,
    RainfallDependenceLower,
    DroughtMoreResilient,
    CoverageLimited,
}

/// Fixed sentence templates. Placeholders are filled by `render`.
fn template(outcome: ComparisonOutcome) -> &'static str {
    match outcome {
        ComparisonOutcome::ProductionHigher => {
            "{winner} out-produced {loser} in {region}: {winner_value} vs {loser_value} tonnes \
             over the assessed years."
        }
        ComparisonOutcome::ProductionComparable => {
            "{winner} and {loser} recorded comparable total production in {region} \
             ({winner_value} vs {loser_value} tonnes)."
        }
        ComparisonOutcome::TrendSteadier => {
            "{winner} shows the steadier year-over-year output in {region} \
             (variance {winner_value} vs {loser_value} for {loser})."
        }
        ComparisonOutcome::TrendRising => {
            "{winner} has the stronger production trend in {region}: slope {winner_value} vs \
             {loser_value} tonnes/year for {loser}."
        }
        ComparisonOutcome::RainfallDependenceLower => {
            "{winner} appears less rainfall-dependent in {region}: correlation with annual \
             rainfall {winner_value} vs {loser_value} for {loser}; lower correlation suggests \
             more resilience to dry years."
        }
        ComparisonOutcome::DroughtMoreResilient => {
            "In drought years, {winner} held up better in {region}: relative production drop \
             {winner_value} vs {loser_value} for {loser}."
        }
        ComparisonOutcome::CoverageLimited => {
            "Data coverage for {winner} and {loser} in {region} is too thin to compare \
             year-over-year stability; totals above rest on {winner_value} and {loser_value} \
             year(s) respectively."
        }
    }
}

fn format_quantity(value: f64) -> String {
    format!("{:.2}", value)
}

fn format_correlation(value: f64) -> String {
    format!("{:+.2}", value)
}

fn format_percent(fraction: f64) -> String {
    format!("{:.0}%", fraction * 100.0)
}

struct Rendered<'a> {
    winner: &'a CropStats,
    loser: &'a CropStats,
    winner_value: String,
    loser_value: String,
}

fn render(outcome: ComparisonOutcome, r: &Rendered<'_>) -> String {
    template(outcome)
        .replace("{winner}", &r.winner.crop)
        .replace("{loser}", &r.loser.crop)
        .replace("{region}", &r.winner.region)
        .replace("{winner_value}", &r.winner_value)
        .replace("{loser_value}", &r.loser_value)
}

fn pair_provenance(a: &CropStats, b: &CropStats) -> ProvenanceTrail {
    a.provenance.merged(&b.provenance)
}

/// Generate 2-4 comparative statements for two crops in the same region.
///
/// `rain` is the provenance of the rainfall rows behind the
/// correlation/drought comparisons, merged into those statements only.
pub fn generate(a: &CropStats, b: &CropStats, rain: Option<&ProvenanceTrail>) -> Vec<Statement> {
    let mut statements = Vec::new();

    // 1. Total production - always comparable once both crops have rows
    let (winner, loser) = if a.total_production >= b.total_production {
        (a, b)
    } else {
        (b, a)
    };
    let outcome = if (a.total_production - b.total_production).abs() < f64::EPSILON {
        ComparisonOutcome::ProductionComparable
    } else {
        ComparisonOutcome::ProductionHigher
    };
    statements.push(Statement {
        text: render(
            outcome,
            &Rendered {
                winner,
                loser,
                winner_value: format_quantity(winner.total_production),
                loser_value: format_quantity(loser.total_production),
            },
        ),
        provenance: pair_provenance(a, b),
    });

    // 2. Stability - a missing variance counts as less steady; when neither
    // side has one, fall back to slopes, then to a coverage note
    match (a.variance, b.variance) {
        (Some(va), Some(vb)) => {
            let (winner, loser, wv, lv) = if va <= vb { (a, b, va, vb) } else { (b, a, vb, va) };
            statements.push(Statement {
                text: render(
                    ComparisonOutcome::TrendSteadier,
                    &Rendered {
                        winner,
                        loser,
                        winner_value: format_quantity(wv),
                        loser_value: format_quantity(lv),
                    },
                ),
                provenance: pair_provenance(a, b),
            });
        }
        (Some(va), None) | (None, Some(va)) => {
            let (winner, loser) = if a.variance.is_some() { (a, b) } else { (b, a) };
            statements.push(Statement {
                text: render(
                    ComparisonOutcome::TrendSteadier,
                    &Rendered {
                        winner,
                        loser,
                        winner_value: format_quantity(va),
                        loser_value: "n/a (single year)".to_string(),
                    },
                ),
                provenance: pair_provenance(a, b),
            });
        }
        (None, None) => match (a.trend_slope, b.trend_slope) {
            (Some(sa), Some(sb)) => {
                let (winner, loser, wv, lv) =
                    if sa >= sb { (a, b, sa, sb) } else { (b, a, sb, sa) };
                statements.push(Statement {
                    text: render(
                        ComparisonOutcome::TrendRising,
                        &Rendered {
                            winner,
                            loser,
                            winner_value: format_quantity(wv),
                            loser_value: format_quantity(lv),
                        },
                    ),
                    provenance: pair_provenance(a, b),
                });
            }
            _ => {
                debug!("generator: neither crop has enough years for a stability comparison");
                statements.push(Statement {
                    text: render(
                        ComparisonOutcome::CoverageLimited,
                        &Rendered {
                            winner: a,
                            loser: b,
                            winner_value: a.yearly.len().to_string(),
                            loser_value: b.yearly.len().to_string(),
                        },
                    ),
                    provenance: pair_provenance(a, b),
                });
            }
        },
    }

    // 3. Rainfall dependence - only when both correlations are defined
    if let (Some((ra, _)), Some((rb, _))) = (a.rain_correlation, b.rain_correlation) {
        let (winner, loser, wv, lv) = if ra.abs() <= rb.abs() {
            (a, b, ra, rb)
        } else {
            (b, a, rb, ra)
        };
        let mut provenance = pair_provenance(a, b);
        if let Some(rain) = rain {
            provenance = provenance.merged(rain);
        }
        statements.push(Statement {
            text: render(
                ComparisonOutcome::RainfallDependenceLower,
                &Rendered {
                    winner,
                    loser,
                    winner_value: format_correlation(wv),
                    loser_value: format_correlation(lv),
                },
            ),
            provenance,
        });
    }

    // 4. Drought resilience - only when the window actually had drought years
    if let (Some(da), Some(db)) = (a.drought_drop, b.drought_drop) {
        if statements.len() < 4 {
            let (winner, loser, wv, lv) = if da <= db { (a, b, da, db) } else { (b, a, db, da) };
            let mut provenance = pair_provenance(a, b);
            if let Some(rain) = rain {
                provenance = provenance.merged(rain);
            }
            statements.push(Statement {
                text: render(
                    ComparisonOutcome::DroughtMoreResilient,
                    &Rendered {
                        winner,
                        loser,
                        winner_value: format_percent(wv),
                        loser_value: format_percent(lv),
                    },
                ),
                provenance,
            });
        }
    }

    statements.truncate(4);
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(crop: &str, total: f64, yearly: &[(i32, f64)]) -> CropStats {
        let mut provenance = ProvenanceTrail::new();
        provenance.source_files.insert("production.csv".to_string());
        for (year, _) in yearly {
            provenance.years_used.insert(*year);
        }
        let values: Vec<f64> = yearly.iter().map(|(_, v)| *v).collect();
        let years: Vec<f64> = yearly.iter().map(|(y, _)| *y as f64).collect();
        CropStats {
            crop: crop.to_string(),
            region: "Tamil Nadu".to_string(),
            total_production: total,
            yearly: yearly.to_vec(),
            trend_slope: crate::stats::ols_slope(&years, &values),
            variance: crate::stats::variance(&values),
            rain_correlation: None,
            drought_drop: None,
            provenance,
        }
    }

    #[test]
    fn test_statement_count_stays_in_band() {
        let a = stats("Rice", 300.0, &[(2019, 100.0), (2020, 80.0), (2021, 120.0)]);
        let b = stats("Millet", 270.0, &[(2019, 90.0), (2020, 90.0), (2021, 90.0)]);
        let out = generate(&a, &b, None);
        assert!(out.len() >= 2 && out.len() <= 4);
    }

    #[test]
    fn test_production_winner_named_first() {
        let a = stats("Rice", 300.0, &[(2020, 300.0)]);
        let b = stats("Millet", 500.0, &[(2020, 500.0)]);
        let out = generate(&a, &b, None);
        assert!(out[0].text.starts_with("Millet out-produced Rice"));
        assert!(out[0].text.contains("500.00"));
    }

    #[test]
    fn test_steadier_crop_wins_stability_statement() {
        let a = stats("Rice", 300.0, &[(2019, 10.0), (2020, 280.0), (2021, 10.0)]);
        let b = stats("Millet", 270.0, &[(2019, 90.0), (2020, 90.0), (2021, 90.0)]);
        let out = generate(&a, &b, None);
        let stability = out
            .iter()
            .find(|s| s.text.contains("steadier"))
            .expect("stability statement");
        assert!(stability.text.starts_with("Millet"));
    }

    #[test]
    fn test_single_year_crops_get_coverage_note() {
        let a = stats("Rice", 300.0, &[(2020, 300.0)]);
        let b = stats("Millet", 200.0, &[(2020, 200.0)]);
        let out = generate(&a, &b, None);
        assert_eq!(out.len(), 2);
        assert!(out[1].text.contains("too thin"));
    }

    #[test]
    fn test_drought_statement_only_with_drought_data() {
        let mut a = stats("Rice", 300.0, &[(2019, 100.0), (2020, 80.0), (2021, 120.0)]);
        let mut b = stats("Millet", 270.0, &[(2019, 90.0), (2020, 88.0), (2021, 92.0)]);
        let without = generate(&a, &b, None);
        assert!(!without.iter().any(|s| s.text.contains("drought")));

        a.drought_drop = Some(0.4);
        b.drought_drop = Some(0.05);
        let with = generate(&a, &b, None);
        let drought = with
            .iter()
            .find(|s| s.text.contains("drought"))
            .expect("drought statement");
        assert!(drought.text.starts_with("In drought years, Millet"));
    }

    #[test]
    fn test_rainfall_statement_carries_rain_provenance() {
        let mut a = stats("Rice", 300.0, &[(2019, 100.0), (2020, 80.0), (2021, 120.0)]);
        let mut b = stats("Millet", 270.0, &[(2019, 90.0), (2020, 88.0), (2021, 92.0)]);
        a.rain_correlation = Some((0.9, 3));
        b.rain_correlation = Some((0.2, 3));
        let mut rain = ProvenanceTrail::new();
        rain.source_files.insert("rainfall.csv".to_string());
        let out = generate(&a, &b, Some(&rain));
        let corr = out
            .iter()
            .find(|s| s.text.contains("rainfall-dependent"))
            .expect("correlation statement");
        assert!(corr.text.starts_with("Millet"));
        assert!(corr.provenance.source_files.contains("rainfall.csv"));
        // the production statement does not pull in rainfall provenance
        assert!(!out[0].provenance.source_files.contains("rainfall.csv"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = stats("Rice", 300.0, &[(2019, 100.0), (2020, 80.0), (2021, 120.0)]);
        let b = stats("Millet", 270.0, &[(2019, 90.0), (2020, 90.0), (2021, 90.0)]);
        let first = generate(&a, &b, None);
        let second = generate(&a, &b, None);
        let texts_a: Vec<&str> = first.iter().map(|s| s.text.as_str()).collect();
        let texts_b: Vec<&str> = second.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts_a, texts_b);
    }
}
