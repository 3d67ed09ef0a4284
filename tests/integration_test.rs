use samarth_qa::error::QaError;
use samarth_qa::ingestion::{self, StationMap};
use samarth_qa::model::{DataStore, TableKind};
use samarth_qa::normalizer;
use samarth_qa::qa_engine::{Extreme, QaEngine};
use std::fs;
use std::path::PathBuf;

/// Write the CSV fixtures the pipeline is exercised against
fn create_fixture_files(dir: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(dir)?;

    // production table with messy headers, an unmapped column, a malformed
    // row and an abbreviated state
    fs::write(
        dir.join("production.csv"),
        "State_Name,District_Name,Crop_Year,Crop,Production,Remarks\n\
         Tamil Nadu,Karur,2018,RICE,900,ok\n\
         TN,Karur,2019,Rice,400,ok\n\
         Tamil Nadu,Karur,2020,Rice,1000,ok\n\
         Tamil Nadu,Karur,2021,Rice,1100,ok\n\
         Tamil Nadu,Salem,2021,Rice,250,ok\n\
         Tamil Nadu,Karur,2018,Millet,300,ok\n\
         Tamil Nadu,Karur,2019,Millet,290,ok\n\
         Tamil Nadu,Karur,2020,Millet,310,ok\n\
         Tamil Nadu,Karur,2021,Millet,305,ok\n\
         Tamil Nadu,Karur,bad-year,Rice,50,malformed\n\
         Karnataka,Mysuru,2020,Ragi,600,ok\n\
         Karnataka,Mysuru,2021,Ragi,620,ok\n",
    )?;

    // long-layout rainfall table
    fs::write(
        dir.join("rainfall.csv"),
        "state,year,rainfall_mm\n\
         tamil nadu,2018,900\n\
         Tamil Nadu,2019,420\n\
         Tamil Nadu,2020,880\n\
         Tamil Nadu,2021,910\n\
         Karnataka,2020,760\n\
         Karnataka,2021,790\n",
    )?;

    // wide per-station rainfall table covering an extra year
    fs::write(
        dir.join("stations.csv"),
        "Month,Actual_Rainfall_in_Karur_in_mm,Actual_Rainfall_in_Mayanur_in_mm\n\
         Jun-2017,120,140\n\
         Jul-2017,180,200\n",
    )?;

    Ok(())
}

fn load_store(dir: &PathBuf) -> Result<DataStore, Box<dyn std::error::Error>> {
    let mut store = DataStore::new();

    let raw = ingestion::load_csv_path(&dir.join("production.csv"))?;
    store.add(normalizer::normalize(&raw, TableKind::CropProduction)?);

    let raw = ingestion::load_csv_path(&dir.join("rainfall.csv"))?;
    store.add(normalizer::normalize(&raw, TableKind::Rainfall)?);

    let raw = ingestion::load_csv_path(&dir.join("stations.csv"))?;
    assert!(ingestion::is_station_layout(&raw));
    let melted = ingestion::melt_station_layout(&raw, &StationMap::default());
    store.add(normalizer::normalize(&melted, TableKind::Rainfall)?);

    Ok(store)
}

#[test]
fn test_end_to_end_pipeline() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join("samarth_qa_integration");
    create_fixture_files(&dir)?;
    let store = load_store(&dir)?;

    // one malformed production row dropped, the rest normalized
    assert_eq!(store.production.len(), 11);
    // 6 long rows + 1 melted (Tamil Nadu, 2017) row
    assert_eq!(store.rainfall.len(), 7);
    assert_eq!(store.source_files().len(), 3);

    let engine = QaEngine::new(&store);

    // template 1: window is the 2 most recent rainfall years
    let comparison = engine.compare_regions("TN", "Karnataka", 2)?;
    assert_eq!(comparison.years_used, vec![2021, 2020]);
    assert_eq!(comparison.region_a.region, "Tamil Nadu");
    assert!((comparison.region_a.mean_rainfall_mm - 895.0).abs() < 1e-9);
    assert_eq!(comparison.region_a.top_crops[0].crop, "Rice");
    // Rice 2020+2021: 1000 + 1100 + 250
    assert_eq!(comparison.region_a.top_crops[0].total_production, 2350.0);
    for file in &comparison.provenance.source_files {
        assert!(store.source_files().contains(file));
    }
    assert!(comparison
        .provenance
        .years_used
        .iter()
        .all(|y| comparison.years_used.contains(y)));

    // template 2: Karur out-produces Salem on Rice
    let max = engine.district_extreme("Tamil Nadu", "Rice", Extreme::Max)?;
    assert_eq!(max.district, "Karur");
    let min = engine.district_extreme("Tamil Nadu", "Rice", Extreme::Min)?;
    assert_eq!(min.district, "Salem");
    assert_ne!(max.district, min.district);

    // template 3: four overlapping years, correlation defined and bounded
    let trend = engine.trend_correlation("Rice", "Tamil Nadu", 10)?;
    assert!((-1.0..=1.0).contains(&trend.correlation));
    assert_eq!(trend.correlation_years, vec![2018, 2019, 2020, 2021]);
    // 2017 comes from the melted station file: rainfall only
    let p2017 = trend.trend.iter().find(|p| p.year == 2017).unwrap();
    assert_eq!(p2017.production, None);
    assert!(p2017.rainfall_mm.is_some());
    // low-rain 2019 lines up with the production dip, correlation is positive
    assert!(trend.correlation > 0.5);

    // template 4: statements with per-statement provenance
    let policy = engine.policy_argument("Rice", "Millet", "Tamil Nadu")?;
    assert!(policy.statements.len() >= 2 && policy.statements.len() <= 4);
    assert!(policy.statements[0].text.contains("Rice"));
    for statement in &policy.statements {
        assert!(!statement.provenance.source_files.is_empty());
        for file in &statement.provenance.source_files {
            assert!(store.source_files().contains(file));
        }
    }

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn test_missing_region_fails_with_insufficient_data() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join("samarth_qa_missing_region");
    fs::create_dir_all(&dir)?;
    fs::write(
        dir.join("rainfall.csv"),
        "state,year,rainfall_mm\nTamil Nadu,2020,500\nTamil Nadu,2021,600\n",
    )?;
    fs::write(
        dir.join("production.csv"),
        "state,crop,year,production\nTamil Nadu,Rice,2021,100\n",
    )?;

    let mut store = DataStore::new();
    let raw = ingestion::load_csv_path(&dir.join("rainfall.csv"))?;
    store.add(normalizer::normalize(&raw, TableKind::Rainfall)?);
    let raw = ingestion::load_csv_path(&dir.join("production.csv"))?;
    store.add(normalizer::normalize(&raw, TableKind::CropProduction)?);

    let engine = QaEngine::new(&store);
    let err = engine.compare_regions("Tamil Nadu", "Karnataka", 2).unwrap_err();
    assert!(matches!(err, QaError::InsufficientData(_)));

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn test_unusable_table_fails_with_schema_error() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join("samarth_qa_schema_error");
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("junk.csv"), "foo,bar,baz\n1,2,3\n")?;

    let raw = ingestion::load_csv_path(&dir.join("junk.csv"))?;
    let err = normalizer::normalize(&raw, TableKind::Rainfall).unwrap_err();
    assert!(matches!(err, QaError::Schema(_)));

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn test_normalization_idempotent_across_loads() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join("samarth_qa_idempotence");
    fs::create_dir_all(&dir)?;
    let path = dir.join("rainfall.csv");
    fs::write(
        &path,
        "state,year,rainfall_mm\nTN,2020,500\nKA,2021,700\n",
    )?;

    let a = normalizer::normalize(&ingestion::load_csv_path(&path)?, TableKind::Rainfall)?;
    let b = normalizer::normalize(&ingestion::load_csv_path(&path)?, TableKind::Rainfall)?;
    match (a, b) {
        (
            samarth_qa::model::CanonicalTable::Rainfall { records: ra, .. },
            samarth_qa::model::CanonicalTable::Rainfall { records: rb, .. },
        ) => {
            assert_eq!(ra.len(), rb.len());
            for (x, y) in ra.iter().zip(rb.iter()) {
                assert_eq!(x.region, y.region);
                assert_eq!(x.row_id, y.row_id);
            }
            assert_eq!(ra[0].region, "Tamil Nadu");
            assert_eq!(ra[1].region, "Karnataka");
        }
        _ => panic!("expected rainfall tables"),
    }

    fs::remove_dir_all(&dir).ok();
    Ok(())
}
