//! Extraction through an external tool (`wgrib2`) writing NetCDF.
//!
//! Each lookup runs the tool once, producing one NetCDF file in a run-scoped
//! scratch directory. The file is read into memory and deleted before the
//! lookup returns.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ndarray::{ArrayD, IxDyn};
use netcdf_parser::{NetCdfAxis, NetCdfField};
use tempfile::TempDir;
use tracing::{debug, warn};

use super::{Backend, BackendError, BackendResult, DatasetHandle};
use crate::catalog::{BackendKind, LevelSelection, LookupKey};
use crate::field::{AxisKind, DeclaredGrid, RawField};

/// One invocation of the extraction tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub input: PathBuf,
    pub variable_match: String,
    pub level_match: String,
    /// Set for pressure selections so levels are folded into one variable.
    pub pressure_level_count: Option<usize>,
    pub output: PathBuf,
}

impl ExtractionRequest {
    /// `wgrib2 [-nc_nlev N] <input> -match <var> -match <level> -netcdf <output>`
    pub fn wgrib2_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(n) = self.pressure_level_count {
            args.push("-nc_nlev".into());
            args.push(n.to_string().into());
        }
        args.push(self.input.clone().into());
        args.push("-match".into());
        args.push(self.variable_match.clone().into());
        args.push("-match".into());
        args.push(self.level_match.clone().into());
        args.push("-netcdf".into());
        args.push(self.output.clone().into());
        args
    }
}

/// Something that turns an [`ExtractionRequest`] into a NetCDF file.
///
/// Producing no file, or a file without the requested variable, means
/// nothing matched.
pub trait ExtractionTool: Send + Sync {
    fn name(&self) -> &str;

    fn extract(&self, request: &ExtractionRequest) -> BackendResult<()>;
}

/// The `wgrib2` executable.
#[derive(Debug, Clone)]
pub struct Wgrib2Tool {
    program: PathBuf,
}

impl Wgrib2Tool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ExtractionTool for Wgrib2Tool {
    fn name(&self) -> &str {
        "wgrib2"
    }

    fn extract(&self, request: &ExtractionRequest) -> BackendResult<()> {
        let output = Command::new(&self.program)
            .args(request.wgrib2_args())
            .output()
            .map_err(|e| {
                BackendError::Execution(format!(
                    "failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(BackendError::Execution(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!(
            variable_match = %request.variable_match,
            level_match = %request.level_match,
            records = String::from_utf8_lossy(&output.stdout).lines().count(),
            "wgrib2 finished"
        );
        Ok(())
    }
}

/// Backend delegating decoding to an [`ExtractionTool`].
#[derive(Clone)]
pub struct ExternalBackend {
    tool: Arc<dyn ExtractionTool>,
    /// Parent of the per-run scratch directory; the system temp dir if unset.
    scratch_root: Option<PathBuf>,
}

impl ExternalBackend {
    pub fn new(tool: Arc<dyn ExtractionTool>, scratch_root: Option<PathBuf>) -> Self {
        Self { tool, scratch_root }
    }
}

impl Backend for ExternalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::External
    }

    fn decode(&self, path: &Path) -> BackendResult<Box<dyn DatasetHandle>> {
        if !path.is_file() {
            return Err(BackendError::Decode(format!(
                "input file {} does not exist",
                path.display()
            )));
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("gdas-prep-");
        let scratch = match &self.scratch_root {
            Some(root) => fs::create_dir_all(root).and_then(|_| builder.tempdir_in(root)),
            None => builder.tempdir(),
        }
        .map_err(|e| BackendError::Decode(format!("failed to create scratch directory: {}", e)))?;

        debug!(scratch = %scratch.path().display(), tool = self.tool.name(), "Created scratch directory");

        Ok(Box::new(ExternalDataset {
            input: path.to_path_buf(),
            tool: self.tool.clone(),
            scratch,
            extractions: 0,
        }))
    }
}

/// A GRIB2 file plus the scratch directory its extractions go to. Dropping
/// it removes the directory.
pub struct ExternalDataset {
    input: PathBuf,
    tool: Arc<dyn ExtractionTool>,
    scratch: TempDir,
    extractions: usize,
}

/// Deletes an intermediate file when the lookup finishes, whatever the outcome.
struct ScratchFile(PathBuf);

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = fs::remove_file(&self.0) {
                warn!(path = %self.0.display(), error = %e, "Failed to remove intermediate file");
            }
        }
    }
}

impl DatasetHandle for ExternalDataset {
    fn read(&mut self, key: &LookupKey, levels: &LevelSelection) -> BackendResult<Vec<RawField>> {
        let (variable_match, level_match, netcdf_name) = match key {
            LookupKey::Wgrib2 {
                variable_match,
                level_match,
                netcdf_name,
            } => (variable_match, level_match, netcdf_name),
            other => return Err(BackendError::UnsupportedKey(other.to_string())),
        };

        self.extractions += 1;
        let output = self
            .scratch
            .path()
            .join(format!("{:02}_{}.nc", self.extractions, netcdf_name));
        let guard = ScratchFile(output.clone());

        let request = ExtractionRequest {
            input: self.input.clone(),
            variable_match: variable_match.clone(),
            level_match: level_match.clone(),
            pressure_level_count: match levels {
                LevelSelection::Pressure(p) => Some(p.len()),
                LevelSelection::Single(_) => None,
            },
            output: output.clone(),
        };
        self.tool.extract(&request)?;

        if !guard.0.exists() {
            debug!(%variable_match, %level_match, "Extraction produced no file");
            return Ok(Vec::new());
        }

        let field = netcdf_parser::read_field(&output, netcdf_name)
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        match field {
            Some(field) => Ok(vec![to_raw_field(field)?]),
            None => Ok(Vec::new()),
        }
    }

    fn reference_time(&self) -> Option<DateTime<Utc>> {
        None
    }
}

fn axis_kind(name: &str) -> Option<AxisKind> {
    match name.to_lowercase().as_str() {
        "latitude" | "lat" => Some(AxisKind::Latitude),
        "longitude" | "lon" => Some(AxisKind::Longitude),
        "lev" | "level" | "plev" | "isobaric" | "pressure" => Some(AxisKind::Level),
        _ => None,
    }
}

fn first_last(axis: &NetCdfAxis) -> BackendResult<(f64, f64)> {
    match axis.values.as_deref() {
        Some([first, .., last]) => Ok((*first, *last)),
        Some([only]) => Ok((*only, *only)),
        _ => Err(BackendError::Grid(format!(
            "axis '{}' has no coordinate values",
            axis.name
        ))),
    }
}

/// Pressure coordinate in hPa. wgrib2 writes Pa for `-nc_nlev` output.
fn pressure_hpa(axis: &NetCdfAxis) -> BackendResult<Vec<f64>> {
    let values = axis.values.clone().ok_or_else(|| {
        BackendError::Grid(format!("level axis '{}' has no coordinate values", axis.name))
    })?;
    let in_pa = match axis.units.as_deref().map(str::trim) {
        Some("Pa") => true,
        Some("hPa") | Some("mb") | Some("millibar") => false,
        _ => values.iter().any(|v| *v > 1100.0),
    };
    Ok(if in_pa {
        values.into_iter().map(|v| v / 100.0).collect()
    } else {
        values
    })
}

/// Label the axes of a NetCDF variable, dropping length-1 axes such as time.
fn to_raw_field(field: NetCdfField) -> BackendResult<RawField> {
    let mut axes = Vec::new();
    let mut shape = Vec::new();
    let mut latitude = None;
    let mut longitude = None;
    let mut levels = None;

    for axis in &field.axes {
        match axis_kind(&axis.name) {
            Some(kind) => {
                match kind {
                    AxisKind::Latitude => latitude = Some(first_last(axis)?),
                    AxisKind::Longitude => longitude = Some(first_last(axis)?),
                    AxisKind::Level => levels = Some(pressure_hpa(axis)?),
                }
                axes.push(kind);
                shape.push(axis.len);
            }
            None if axis.len == 1 => {}
            None => {
                return Err(BackendError::Grid(format!(
                    "{}: unexpected dimension '{}' of length {}",
                    field.name, axis.name, axis.len
                )))
            }
        }
    }

    let (first_latitude, last_latitude) = latitude
        .ok_or_else(|| BackendError::Grid(format!("{} has no latitude axis", field.name)))?;
    let (first_longitude, last_longitude) = longitude
        .ok_or_else(|| BackendError::Grid(format!("{} has no longitude axis", field.name)))?;

    // Squeezed axes have length 1, so the row-major buffer keeps its layout.
    let values = ArrayD::from_shape_vec(IxDyn(&shape), field.values)
        .map_err(|e| BackendError::Grid(format!("{}: {}", field.name, e)))?;

    Ok(RawField {
        source: field.name,
        values,
        axes,
        grid: DeclaredGrid {
            first_latitude,
            last_latitude,
            first_longitude,
            last_longitude,
        },
        levels,
        converted: false,
    })
}
