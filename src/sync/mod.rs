/// Release lifecycle and reconciliation
///
/// Everything that keeps the record store, the process engine and the permission
/// service consistent lives here:
/// - The release creation / deletion saga and its mark state machine
/// - The sweeper that retries stale marks
/// - The orphan garbage collector
/// - Instance identity resolution across maintenance aliases
/// - The background ticker driving sweeps and cleanups

// Saga controller owning the serialization lock
pub mod controller;

// Instance, maintenance, module and variable operations
pub mod instances;

// Retry of stale marked releases
pub mod sweeper;

// Orphan garbage collection
pub mod cleanup;

// Canonical instance lookup by id or maintenance alias
pub mod resolver;

// Periodic sweep + cleanup job
pub mod scheduler;

pub use controller::SyncController;
pub use instances::CreateInstance;
pub use resolver::InstanceResolver;
pub use scheduler::SyncScheduler;
pub use sweeper::SweepReport;
