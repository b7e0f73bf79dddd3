//! Error types for tensor preparation.
//!
//! Every error is fatal for the run. Each variant names the component that
//! raised it and, where one applies, the canonical variable.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for tensor preparation.
pub type PrepResult<T> = Result<T, PrepError>;

/// The pipeline stage an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Catalog,
    Backend,
    Extractor,
    Normalizer,
    Assembler,
    Pipeline,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::Catalog => "catalog",
            Component::Backend => "backend",
            Component::Extractor => "extractor",
            Component::Normalizer => "normalizer",
            Component::Assembler => "assembler",
            Component::Pipeline => "pipeline",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PrepError {
    /// No decoded field matched the variable's lookup key.
    #[error("[{component}] variable '{variable}' not found (key {key}, levels {levels})")]
    VariableNotFound {
        component: Component,
        variable: String,
        key: String,
        levels: String,
    },

    /// The number of returned levels differs from the number declared.
    #[error("[{component}] variable '{variable}': expected {expected} level(s), found {found}")]
    LevelCountMismatch {
        component: Component,
        variable: String,
        expected: usize,
        found: usize,
    },

    /// Level metadata does not match the declared pressure levels.
    #[error("[{component}] variable '{variable}': levels {found:?} do not match declared {expected:?}")]
    LevelMismatch {
        component: Component,
        variable: String,
        expected: Vec<f64>,
        found: Vec<f64>,
    },

    /// Spatial shape or declared geometry differs from the configured grid.
    #[error("[{component}] variable '{variable}': unsupported grid: {reason}")]
    UnsupportedGridResolution {
        component: Component,
        variable: String,
        reason: String,
    },

    /// An assembled tensor does not have its declared shape.
    #[error("[{component}] tensor '{tensor}': expected shape {expected:?}, found {found:?}")]
    ShapeMismatch {
        component: Component,
        tensor: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// The decoder or external tool failed.
    #[error("[{component}] {backend} backend failed for '{variable}': {reason}")]
    BackendExecution {
        component: Component,
        backend: String,
        variable: String,
        reason: String,
    },

    /// Invalid or incomplete configuration.
    #[error("[{component}] configuration error: {message}")]
    Config {
        component: Component,
        message: String,
    },

    /// Filesystem failure.
    #[error("[{component}] I/O error on {}: {source}", path.display())]
    Io {
        component: Component,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PrepError {
    pub fn component(&self) -> Component {
        match self {
            PrepError::VariableNotFound { component, .. }
            | PrepError::LevelCountMismatch { component, .. }
            | PrepError::LevelMismatch { component, .. }
            | PrepError::UnsupportedGridResolution { component, .. }
            | PrepError::ShapeMismatch { component, .. }
            | PrepError::BackendExecution { component, .. }
            | PrepError::Config { component, .. }
            | PrepError::Io { component, .. } => *component,
        }
    }

    /// Canonical variable the error concerns, if any.
    pub fn variable(&self) -> Option<&str> {
        match self {
            PrepError::VariableNotFound { variable, .. }
            | PrepError::LevelCountMismatch { variable, .. }
            | PrepError::LevelMismatch { variable, .. }
            | PrepError::UnsupportedGridResolution { variable, .. }
            | PrepError::BackendExecution { variable, .. } => Some(variable),
            _ => None,
        }
    }

    pub(crate) fn config(component: Component, message: impl Into<String>) -> Self {
        PrepError::Config {
            component,
            message: message.into(),
        }
    }

    pub(crate) fn io(component: Component, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PrepError::Io {
            component,
            path: path.into(),
            source,
        }
    }
}
