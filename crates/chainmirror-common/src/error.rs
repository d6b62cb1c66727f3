//! Error types shared across chainmirror crates

use thiserror::Error;

/// Result type alias for configuration and parsing operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised while assembling configuration or parsing operator input
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl CommonError {
    pub fn config(msg: impl Into<String>) -> Self {
        CommonError::Config(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        CommonError::Parse(msg.into())
    }
}
