//! Error types for the FTTB pipeline.
//!
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::meter::{MeterFailReason, MeterId};

/// Result type alias for pipeline lifecycle operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised while loading or validating a [`crate::PipelineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The config file is not valid JSON for the config schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is outside what the pipeline can encode.
    #[error("Invalid configuration for {field}: {message}")]
    Invalid {
        /// Dotted path of the offending field.
        field: String,
        message: String,
    },
}

impl ConfigError {
    /// Creates an invalid configuration error.
    pub fn invalid(field: impl Into<String>, message: impl ToString) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.to_string(),
        }
    }
}

/// Errors returned by the lifecycle coordinator.
///
/// Meter failures under the default policy and flow installation failures
/// are logged, not returned; these variants cover misuse of the lifecycle
/// and the opt-in abort policy.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The requested transition is not allowed from the current state.
    #[error("Cannot {event} while {state}")]
    InvalidTransition {
        event: &'static str,
        state: &'static str,
    },

    /// The meter failed and the abort policy is in effect.
    #[error("Meter {meter_id} could not be created: {reason}")]
    MeterFailed {
        meter_id: MeterId,
        reason: MeterFailReason,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    pub(crate) fn invalid_transition(event: &'static str, state: &'static str) -> Self {
        Self::InvalidTransition { event, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_invalid_config_display() {
        let err = ConfigError::invalid("ports.nni", "must differ from ports.uni");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for ports.nni: must differ from ports.uni"
        );
    }

    #[test]
    fn test_transition_display() {
        let err = PipelineError::invalid_transition("deactivate", "idle");
        assert_eq!(err.to_string(), "Cannot deactivate while idle");
    }

    #[test]
    fn test_meter_failed_display() {
        let err = PipelineError::MeterFailed {
            meter_id: MeterId::new(2),
            reason: MeterFailReason::OutOfMeters,
        };
        assert_eq!(err.to_string(), "Meter 0x2 could not be created: out of meters");
    }

    #[test]
    fn test_config_error_converts() {
        let err: PipelineError = ConfigError::invalid("app_name", "empty").into();
        assert!(matches!(err, PipelineError::Config(ConfigError::Invalid { .. })));
    }
}
