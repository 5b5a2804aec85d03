mod db;
mod error;
mod importer;
mod records;
mod schema;

pub use db::Database;
pub use error::{Error, Result};
pub use importer::{ImportSummary, import_experiment};
pub use records::{ConversationRecord, ExperimentRecord, MessageRecord};
pub use schema::SCHEMA_VERSION;

/// Filename of the relational store inside an experiment directory
pub const STORE_FILENAME: &str = "experiments.sqlite";
