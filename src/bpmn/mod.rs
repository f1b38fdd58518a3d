/// Workflow definition handling
///
/// Pure transforms over BPMN 2.0 XML, independent of any remote call:
/// - Deterministic deployment key derivation from a release id
/// - Extraction of start parameters and maintenance procedures
/// - Binding a definition to its deployment key before shipping it to the engine

// Start parameter / maintenance procedure extraction
pub mod parse;

// Rewrite of process ids and maintenance message names
pub mod bind;

pub use bind::{bind_release, MaintenanceBinding};
pub use parse::parse_release_info;

use crate::error::{Error, Result};

const DEPLOYMENT_KEY_PREFIX: &str = "release_";

/// Engine deployment key of a release
///
/// Camunda process keys must be NCNames, so the id gets a letter prefix and its
/// hyphens become underscores. Release ids never contain underscores (see
/// [`validate_release_id`]), which keeps the mapping injective.
pub fn deployment_key(release_id: &str) -> String {
    format!("{}{}", DEPLOYMENT_KEY_PREFIX, release_id.replace('-', "_"))
}

/// Release-scoped message name a maintenance procedure listens on once deployed
pub fn maintenance_event_id(deployment_key: &str, public_event_id: &str) -> String {
    format!("{}_maintenance_{}", deployment_key, public_event_id)
}

/// Release ids are restricted to ASCII alphanumerics and '-'
pub fn validate_release_id(release_id: &str) -> Result<()> {
    if release_id.is_empty() {
        return Err(Error::InvalidInput("release id must not be empty".to_string()));
    }
    if !release_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(Error::InvalidInput(format!(
            "release id {:?} may only contain ASCII letters, digits and '-'",
            release_id
        )));
    }
    Ok(())
}

pub(crate) fn xml_error(err: impl std::fmt::Display) -> Error {
    Error::InvalidDefinition(format!("malformed xml: {}", err))
}
