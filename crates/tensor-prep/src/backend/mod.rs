//! Decoding backends.
//!
//! A [`Backend`] opens one GRIB2 file and returns a [`DatasetHandle`] that
//! answers lookups for the rest of the run. Everything above this module works
//! against the two traits only.

mod external;
mod in_process;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::catalog::{BackendKind, LevelSelection, LookupKey};
use crate::config::PrepConfig;
use crate::field::RawField;

pub use external::{ExternalBackend, ExtractionRequest, ExtractionTool, Wgrib2Tool};
pub use in_process::{InProcessBackend, InProcessDataset};

/// Failures inside a backend. The extractor attaches the canonical variable.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("decode failed: {0}")]
    Decode(String),

    #[error("extraction tool failed: {0}")]
    Execution(String),

    #[error("lookup key {0} is not understood by this backend")]
    UnsupportedKey(String),

    #[error("unsupported grid layout: {0}")]
    Grid(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// A decoding mechanism, chosen once per run.
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Open `path` and return a handle that serves every lookup of the run.
    fn decode(&self, path: &Path) -> BackendResult<Box<dyn DatasetHandle>>;
}

/// A decoded dataset.
pub trait DatasetHandle: Send {
    /// All fields matching `key` at the selected level(s).
    ///
    /// Returns an empty vector when nothing matches. Each field carries its
    /// own axis labels, declared grid and pressure metadata.
    fn read(&mut self, key: &LookupKey, levels: &LevelSelection) -> BackendResult<Vec<RawField>>;

    /// Reference time of the dataset, when the backend can tell.
    fn reference_time(&self) -> Option<DateTime<Utc>>;
}

/// Build the backend selected by `config`.
pub fn from_config(config: &PrepConfig) -> Box<dyn Backend> {
    match config.backend {
        BackendKind::InProcess => Box::new(InProcessBackend::new()),
        BackendKind::External => Box::new(ExternalBackend::new(
            Arc::new(Wgrib2Tool::new(&config.wgrib2_path)),
            config.scratch_dir.clone(),
        )),
    }
}
