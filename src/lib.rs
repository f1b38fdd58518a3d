/// relsync: release lifecycle saga and reconciliation engine
///
/// Keeps workflow releases consistent across a SQLite record store, a Camunda
/// process engine and an external permission service, none of which can be
/// updated atomically together.

// Core configuration and setup
pub mod config;

// Error taxonomy shared by every layer
pub mod error;

// Records: releases, sync marks, instances, modules, variables
pub mod model;

// Workflow definition parsing and deployment binding
pub mod bpmn;

// SQLite record store
pub mod store;

// Process engine adapter
pub mod engine;

// Permission adapter
pub mod permissions;

// User notifications
pub mod notify;

// Shared helpers for the remote adapters
mod http;

// Saga, sweeper, garbage collector, resolver and ticker
pub mod sync;

// HTTP API layer
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use error::{Error, Result};
pub use model::{Instance, Module, Release, SyncMarks, Variable};
pub use server::start_server;
pub use sync::{SyncController, SyncScheduler};
