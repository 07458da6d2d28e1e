//! Glitch controller errors

use std::fmt;

use crate::settings::ConfigError;
use crate::surface::{ParameterName, SurfaceId};

/// Errors raised by the snapshot and the scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum GlitchError {
    /// A tracked surface does not expose one of the glitch parameters
    MissingParameter {
        surface: SurfaceId,
        parameter: ParameterName,
    },
    /// A tracked surface is no longer valid
    SurfaceUnavailable { surface: SurfaceId },
    /// The configuration failed validation
    InvalidConfig(ConfigError),
    /// `start()` was called outside a tokio runtime
    NoRuntime,
}

impl fmt::Display for GlitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlitchError::MissingParameter { surface, parameter } => {
                write!(f, "{} has no '{}' parameter", surface, parameter)
            }
            GlitchError::SurfaceUnavailable { surface } => write!(f, "{} is no longer available", surface),
            GlitchError::InvalidConfig(e) => write!(f, "Invalid glitch config: {}", e),
            GlitchError::NoRuntime => write!(f, "No tokio runtime available to run the glitch scheduler"),
        }
    }
}

impl std::error::Error for GlitchError {}

impl From<ConfigError> for GlitchError {
    fn from(e: ConfigError) -> Self {
        GlitchError::InvalidConfig(e)
    }
}
