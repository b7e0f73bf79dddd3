//! Error types for reading wgrib2 NetCDF output.

use std::path::PathBuf;

use thiserror::Error;

pub type NetCdfResult<T> = Result<T, NetCdfError>;

#[derive(Error, Debug)]
pub enum NetCdfError {
    #[error("failed to open NetCDF {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    /// A data or coordinate variable could not be read.
    #[error("failed to read {variable}: {reason}")]
    Read { variable: String, reason: String },

    /// Values and dimensions disagree.
    #[error("invalid layout: {0}")]
    Layout(String),
}
