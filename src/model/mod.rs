/// Record types
///
/// Releases, their sync marks, instances and the module / variable records that
/// workflow tasks attach to instances.

// Core record definitions
pub mod types;

// Re-export commonly used types
pub use types::{
    DeleteInfo, Instance, InstanceParameter, MaintenanceProcedure, Module, ParameterDescription, ParsedInfo,
    Release, SyncMarks, Variable,
};
