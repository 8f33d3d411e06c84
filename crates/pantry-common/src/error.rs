//! Error types shared across pantry crates

use thiserror::Error;

/// Result type alias for shared pantry operations
pub type Result<T> = std::result::Result<T, PantryError>;

/// Configuration errors shared by pantry binaries
#[derive(Error, Debug)]
pub enum PantryError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidSetting { key: String, value: String },
}

impl PantryError {
    pub fn config(message: impl Into<String>) -> Self {
        PantryError::Config(message.into())
    }
}
