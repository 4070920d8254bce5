//! Configuration errors.

use thiserror::Error;

/// Config load or validation error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A parameter is out of range or inconsistent with another
    #[error("Invalid config: {0}")]
    InvalidValue(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),
}
