/// Record store
///
/// SQLite persistence for releases (with their sync marks), instances, modules and
/// variables. Every mark transition is a single upsert; multi-record writes use a
/// transaction only when more than one record is written.

// Connection setup and schema
pub mod database;

// Release records and sync marks
pub mod releases;

// Instance records and maintenance aliases
pub mod instances;

// Module records
pub mod modules;

// Variable records
pub mod variables;

pub use database::Store;
pub use releases::{ReleaseQuery, ReleaseSort, MarkedRelease};
