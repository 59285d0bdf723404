//! Error types for the pedis disassembler.
//!
//! Only the outer layers (loading an image, reading configuration, writing
//! the report) can fail. Control-flow scanning and rendering never abort;
//! their anomalies are reported as [`crate::analysis::scan::ScanWarning`]s.

use thiserror::Error;

use crate::io::error::IoError;

/// Main error type for pedis operations.
#[derive(Debug, Error)]
pub enum PedisError {
    /// The input is not a PE image we know how to read
    #[error("Invalid image format: {0}")]
    InvalidFormat(String),

    /// Malformed PE structures reported by the object parser
    #[error("Malformed PE image: {0}")]
    Malformed(#[from] object::read::Error),

    /// Sections declare more memory than the configured limit
    #[error("Sections need {found} bytes of memory, above the {limit} byte limit")]
    ImageTooLarge { limit: u64, found: u64 },

    /// Machine type other than i386 / AMD64
    #[error("Unsupported machine type: {0:#06x}")]
    UnsupportedMachine(u16),

    /// Bounded file access errors
    #[error(transparent)]
    Input(#[from] IoError),

    /// Errors writing the report
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type alias for pedis operations
pub type Result<T> = std::result::Result<T, PedisError>;
