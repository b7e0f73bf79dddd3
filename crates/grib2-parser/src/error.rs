//! Error types for GRIB2 parsing.

use thiserror::Error;

/// Result type for GRIB2 parser operations.
pub type Grib2Result<T> = Result<T, Grib2Error>;

/// Errors raised while scanning, parsing or unpacking GRIB2 messages.
#[derive(Error, Debug)]
pub enum Grib2Error {
    /// The byte stream is not a GRIB2 edition 2 message.
    #[error("invalid GRIB2 format: {0}")]
    InvalidFormat(String),

    /// A section is missing, truncated or internally inconsistent.
    #[error("invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    /// Data values could not be decoded.
    #[error("unpacking error: {0}")]
    UnpackingError(String),

    /// The message uses a template this reader does not handle.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
