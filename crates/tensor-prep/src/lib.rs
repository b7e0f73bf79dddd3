//! GDAS analysis tensor preparation.
//!
//! Turns one GDAS 0.25 degree GRIB2 analysis file into two fixed-shape `f32`
//! tensors:
//!
//! - `input_surface.npy`: `[4, lat, lon]` holding `msl, u10, v10, t2m`
//! - `input_upper.npy`: `[5, levels, lat, lon]` holding `z, q, t, u, v`
//!
//! Latitude runs north to south, longitude eastwards from 0 and pressure from
//! 1000 hPa upwards. Fields are decoded either in-process or with `wgrib2`
//! (see [`backend`]); both yield the same canonical fields.
//!
//! # Example
//!
//! ```ignore
//! use tensor_prep::{parse_analysis_time, Pipeline, PrepConfig};
//!
//! let config = PrepConfig {
//!     analysis_time: Some(parse_analysis_time("2024011512")?),
//!     output_dir: "out".into(),
//!     ..PrepConfig::default()
//! };
//! let summary = Pipeline::new(config)?.run("gdas.t12z.pgrb2.0p25.f000".as_ref())?;
//! ```

pub mod assembler;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extractor;
pub mod field;
pub mod normalizer;
pub mod pipeline;

pub use assembler::{assemble, load_npy, persist, OutputTensor};
pub use backend::{Backend, BackendError, DatasetHandle};
pub use catalog::{
    lookup, validate_catalog, BackendKind, Catalog, LevelSelection, LevelType, LookupKey,
    PressureLevels, TensorKind, TensorSpec, VariableSpec, STANDARD_GRAVITY,
};
pub use config::{parse_analysis_time, PrepConfig};
pub use error::{Component, PrepError, PrepResult};
pub use extractor::extract;
pub use field::{AxisKind, CanonicalField, DeclaredGrid, GridGeometry, RawField};
pub use normalizer::normalize;
pub use pipeline::{Pipeline, RunSummary};
