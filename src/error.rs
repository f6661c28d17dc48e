//! Error types for the simulator.

use thiserror::Error;

/// Result type alias using SimError.
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors that can occur while building or persisting a simulation.
///
/// Operations on a constructed engine never fail; only malformed
/// configuration, config file I/O and report writing are reported.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Invalid configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Report error: {0}")]
    Report(#[from] csv::Error),
}

impl SimError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        SimError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

///Rejects zero sizes, every byte size in the model must be positive
pub fn ensure_positive(field: &'static str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(SimError::invalid(field, "must be greater than 0"));
    }
    Ok(())
}
