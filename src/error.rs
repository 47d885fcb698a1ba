//! Error types for Quotagate.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Quotagate operations.
#[derive(Error, Debug)]
pub enum QuotagateError {
    /// Duration text that does not match `<digits><unit>`
    #[error("Invalid duration format: {input:?}. Expected format like \"30s\", \"5m\", \"2h\", \"1d\", \"1w\", \"1y\"")]
    InvalidDuration { input: String },

    /// Well-formed duration with a unit letter we do not know
    #[error("Unknown duration unit {unit:?} in {input:?}")]
    UnknownDurationUnit { input: String, unit: char },

    /// A duration that resolves to zero milliseconds used as a window
    #[error("Duration {duration:?} is too short to be used as a window")]
    EmptyWindow { duration: String },

    /// Key prefix containing the scoped key separator
    #[error("Invalid key prefix {prefix:?}: a prefix must not contain ':'")]
    InvalidPrefix { prefix: String },

    /// Strategy name missing from the registry
    #[error("Unknown strategy: {name}. Available strategies: {}", available.join(", "))]
    UnknownStrategy { name: String, available: Vec<String> },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuotagateError {
    /// Whether this error stems from invalid configuration rather than a
    /// failing backend.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            QuotagateError::InvalidDuration { .. }
                | QuotagateError::UnknownDurationUnit { .. }
                | QuotagateError::EmptyWindow { .. }
                | QuotagateError::InvalidPrefix { .. }
                | QuotagateError::UnknownStrategy { .. }
                | QuotagateError::Config(_)
        )
    }
}

/// Result type alias for Quotagate operations.
pub type Result<T> = std::result::Result<T, QuotagateError>;
