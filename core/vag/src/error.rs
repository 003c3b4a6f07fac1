//! Error types for VAG stream conversion.

use thiserror::Error;

/// Result type alias for VAG operations.
pub type VagResult<T> = Result<T, VagError>;

/// Errors that can occur while decoding or encoding a VAG stream.
#[derive(Debug, Error)]
pub enum VagError {
    /// The stream did not start with `VAGp` or `VAGi`.
    #[error("bad VAG magic: expected \"VAGp\" or \"VAGi\"")]
    BadMagic,

    /// The writer was constructed with an invalid configuration.
    #[error("invalid writer config: {message}")]
    InvalidWriterConfig {
        /// Description of which parameter was invalid.
        message: String,
    },

    /// `append`/`finalize` was called after `finalize` already ran.
    #[error("writer used after finalize")]
    WriteAfterFinalize,

    /// An I/O error occurred reading or writing the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VagError {
    /// Create a new invalid writer config error.
    pub fn config(message: impl Into<String>) -> Self {
        VagError::InvalidWriterConfig {
            message: message.into(),
        }
    }
}
