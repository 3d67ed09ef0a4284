// Import from library crate
use samarth_qa::generator::Statement;
use samarth_qa::ingestion::{self, StationMap};
use samarth_qa::model::{DataStore, TableKind};
use samarth_qa::normalizer;
use samarth_qa::qa_engine::{Extreme, QaEngine};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

#[derive(Parser)]
#[command(name = "samarth")]
#[command(about = "Agriculture & climate QA engine over open-data CSVs")]
#[command(version)]
struct Args {
    /// Crop production CSV file(s)
    #[arg(short, long, global = true)]
    production: Vec<PathBuf>,

    /// Rainfall CSV file(s) (long or wide per-station layout)
    #[arg(short, long, global = true)]
    rainfall: Vec<PathBuf>,

    /// Optional station -> state mapping CSV for wide rainfall layouts
    #[arg(long, global = true)]
    station_map: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize the given CSVs and report mappings and dropped-row counts
    LoadCheck,
    /// Compare mean rainfall and top crops between two regions
    Compare {
        /// First region (state) name
        region_a: String,
        /// Second region (state) name
        region_b: String,
        /// How many recent years to cover (default: 3)
        #[arg(short, long, default_value_t = 3)]
        years: usize,
    },
    /// Find the district with extreme production for a crop in a region
    District {
        region: String,
        crop: String,
        /// "max" or "min" (default: max)
        #[arg(short, long, default_value = "max")]
        extreme: String,
    },
    /// Production/rainfall trend and correlation for a crop in a region
    Trend {
        crop: String,
        region: String,
        /// Year span to cover (default: 10)
        #[arg(short, long, default_value_t = 10)]
        years: usize,
    },
    /// Generate comparative policy statements for two crops in a region
    Policy {
        crop_a: String,
        crop_b: String,
        region: String,
    },
    /// Run all four templates against built-in fixture data
    Smoke,
}

fn load_store(args: &Args) -> Result<DataStore> {
    let stations = match &args.station_map {
        Some(path) => StationMap::from_csv_path(path)?,
        None => StationMap::default(),
    };

    let mut store = DataStore::new();
    for path in &args.production {
        let raw = ingestion::load_csv_path(path)?;
        let table = normalizer::normalize(&raw, TableKind::CropProduction)?;
        info!(
            "{}: {} production row(s) loaded",
            raw.source_file,
            table.len()
        );
        store.add(table);
    }
    for path in &args.rainfall {
        let mut raw = ingestion::load_csv_path(path)?;
        if ingestion::is_station_layout(&raw) {
            info!("{}: wide per-station layout detected, melting", raw.source_file);
            raw = ingestion::melt_station_layout(&raw, &stations);
        }
        let table = normalizer::normalize(&raw, TableKind::Rainfall)?;
        info!("{}: {} rainfall row(s) loaded", raw.source_file, table.len());
        store.add(table);
    }
    Ok(store)
}

fn print_statements(statements: &[Statement]) {
    for (idx, statement) in statements.iter().enumerate() {
        println!("{}. {}", idx + 1, statement.text);
        println!(
            "   sources: {:?}, years: {:?}",
            statement.provenance.source_files, statement.provenance.years_used
        );
    }
}

fn run_load_check(args: &Args) -> Result<()> {
    let stations = match &args.station_map {
        Some(path) => StationMap::from_csv_path(path)?,
        None => StationMap::default(),
    };
    for (paths, kind) in [
        (&args.production, TableKind::CropProduction),
        (&args.rainfall, TableKind::Rainfall),
    ] {
        for path in paths {
            let mut raw = ingestion::load_csv_path(path)?;
            if kind == TableKind::Rainfall && ingestion::is_station_layout(&raw) {
                raw = ingestion::melt_station_layout(&raw, &stations);
            }
            let table = normalizer::normalize(&raw, kind)?;
            let report = table.report();
            println!(
                "{} ({}): kept {}/{} row(s), dropped {} row(s), unmapped columns: {:?}",
                report.source_file,
                kind.as_str(),
                report.rows_kept,
                report.rows_in,
                report.rows_dropped,
                report.dropped_columns
            );
        }
    }
    Ok(())
}

const SMOKE_PRODUCTION: &str = "\
State_Name,District_Name,Crop_Year,Crop,Production
Tamil Nadu,Karur,2017,Rice,950
Tamil Nadu,Karur,2018,Rice,1020
Tamil Nadu,Karur,2019,Rice,400
Tamil Nadu,Karur,2020,Rice,1100
Tamil Nadu,Karur,2021,Rice,1180
Tamil Nadu,Salem,2020,Rice,300
Tamil Nadu,Karur,2017,Millet,410
Tamil Nadu,Karur,2018,Millet,415
Tamil Nadu,Karur,2019,Millet,400
Tamil Nadu,Karur,2020,Millet,420
Tamil Nadu,Karur,2021,Millet,425
Karnataka,Mysuru,2020,Ragi,640
Karnataka,Mysuru,2021,Ragi,660
Karnataka,Mysuru,2021,Rice,510
";

const SMOKE_RAINFALL: &str = "\
state,year,rainfall_mm
Tamil Nadu,2017,910
Tamil Nadu,2018,905
Tamil Nadu,2019,430
Tamil Nadu,2020,890
Tamil Nadu,2021,920
Karnataka,2020,780
Karnataka,2021,800
";

fn run_smoke() -> Result<()> {
    let mut store = DataStore::new();
    let raw = ingestion::load_csv_text("smoke_production.csv", SMOKE_PRODUCTION)?;
    store.add(normalizer::normalize(&raw, TableKind::CropProduction)?);
    let raw = ingestion::load_csv_text("smoke_rainfall.csv", SMOKE_RAINFALL)?;
    store.add(normalizer::normalize(&raw, TableKind::Rainfall)?);

    let engine = QaEngine::new(&store);

    println!("=== compare_regions(Tamil Nadu, Karnataka, 2) ===");
    let comparison = engine.compare_regions("Tamil Nadu", "Karnataka", 2)?;
    println!("{}", serde_json::to_string_pretty(&comparison)?);

    println!("\n=== district_extreme(Tamil Nadu, Rice, max) ===");
    let extreme = engine.district_extreme("Tamil Nadu", "Rice", Extreme::Max)?;
    println!("{}", serde_json::to_string_pretty(&extreme)?);

    println!("\n=== trend_correlation(Rice, Tamil Nadu, 10) ===");
    let trend = engine.trend_correlation("Rice", "Tamil Nadu", 10)?;
    println!("{}", serde_json::to_string_pretty(&trend)?);

    println!("\n=== policy_argument(Rice, Millet, Tamil Nadu) ===");
    let policy = engine.policy_argument("Rice", "Millet", "Tamil Nadu")?;
    print_statements(&policy.statements);

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    match &args.command {
        Commands::LoadCheck => run_load_check(&args),
        Commands::Smoke => run_smoke(),
        Commands::Compare {
            region_a,
            region_b,
            years,
        } => {
            let store = load_store(&args)?;
            let engine = QaEngine::new(&store);
            let result = engine.compare_regions(region_a, region_b, *years)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Commands::District {
            region,
            crop,
            extreme,
        } => {
            let store = load_store(&args)?;
            let engine = QaEngine::new(&store);
            let result = engine.district_extreme(region, crop, Extreme::from_str(extreme)?)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Commands::Trend {
            crop,
            region,
            years,
        } => {
            let store = load_store(&args)?;
            let engine = QaEngine::new(&store);
            let result = engine.trend_correlation(crop, region, *years)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Commands::Policy {
            crop_a,
            crop_b,
            region,
        } => {
            let store = load_store(&args)?;
            let engine = QaEngine::new(&store);
            let result = engine.policy_argument(crop_a, crop_b, region)?;
            println!("region: {}", result.region);
            println!("years:  {:?}", result.years_used);
            print_statements(&result.statements);
            Ok(())
        }
    }
}
