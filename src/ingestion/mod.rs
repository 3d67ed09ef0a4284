//! Ingestion - turns CSV files into raw tables ready for normalization

pub mod csv_loader;
pub mod station_layout;

pub use csv_loader::{load_csv_path, load_csv_text};
pub use station_layout::{is_station_layout, melt_station_layout, StationMap};
