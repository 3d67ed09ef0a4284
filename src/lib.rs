pub mod error;
pub mod generator;
pub mod ingestion;
pub mod model;
pub mod normalizer;
pub mod provenance;
pub mod qa_engine;
pub mod schema_mapper;
pub mod stats;

pub use error::{QaError, Result};
pub use model::{DataStore, TableKind};
pub use qa_engine::QaEngine;
