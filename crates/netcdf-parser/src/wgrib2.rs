//! Reader for the NetCDF files written by `wgrib2 -netcdf`.
//!
//! wgrib2 writes one variable per matched parameter, named
//! `{PARAM}_{level}` for single surfaces (e.g. `TMP_2maboveground`) or plain
//! `{PARAM}` when `-nc_nlev` folds pressure levels into a `lev` dimension.
//! Data dimensions are `(time, [lev,] latitude, longitude)` with latitude
//! ascending from the south pole.

use std::path::Path;

use tracing::debug;

use crate::error::{NetCdfError, NetCdfResult};
use crate::native::{get_str_attr, read_coordinate, read_unpacked_f32, silence_hdf5_errors};

/// One dimension of a data variable, with its coordinate values when the file
/// has a coordinate variable of the same name.
#[derive(Debug, Clone)]
pub struct NetCdfAxis {
    pub name: String,
    pub len: usize,
    pub values: Option<Vec<f64>>,
    pub units: Option<String>,
}

/// A data variable read in full.
#[derive(Debug, Clone)]
pub struct NetCdfField {
    pub name: String,
    pub units: Option<String>,
    /// Axes in storage order.
    pub axes: Vec<NetCdfAxis>,
    /// Row-major values matching `axes`, fill values replaced with NaN.
    pub values: Vec<f32>,
}

impl NetCdfField {
    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(|a| a.len).collect()
    }

    pub fn axis(&self, name: &str) -> Option<&NetCdfAxis> {
        self.axes.iter().find(|a| a.name == name)
    }
}

/// Read `variable` from a wgrib2 NetCDF file.
///
/// Returns `Ok(None)` if the file exists but holds no such variable, which is
/// what wgrib2 produces when its match expressions select nothing.
pub fn read_field<P: AsRef<Path>>(path: P, variable: &str) -> NetCdfResult<Option<NetCdfField>> {
    silence_hdf5_errors();

    let path = path.as_ref();
    let nc_file = netcdf::open(path).map_err(|e| NetCdfError::Open {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let var = match nc_file.variable(variable) {
        Some(var) => var,
        None => {
            debug!(path = %path.display(), variable, "Variable not present");
            return Ok(None);
        }
    };

    let mut axes = Vec::new();
    for dim in var.dimensions() {
        let name = dim.name();
        let (values, units) = match nc_file.variable(&name) {
            Some(coord) if coord.dimensions().len() == 1 => {
                (Some(read_coordinate(&coord)?), get_str_attr(&coord, "units"))
            }
            _ => (None, None),
        };
        axes.push(NetCdfAxis {
            name,
            len: dim.len(),
            values,
            units,
        });
    }

    let values = read_unpacked_f32(&var)?;
    let expected: usize = axes.iter().map(|a| a.len).product();
    if values.len() != expected {
        return Err(NetCdfError::Layout(format!(
            "{} has {} values but its dimensions hold {}",
            variable,
            values.len(),
            expected
        )));
    }

    debug!(
        path = %path.display(),
        variable,
        shape = ?axes.iter().map(|a| a.len).collect::<Vec<_>>(),
        "Read NetCDF variable"
    );

    Ok(Some(NetCdfField {
        name: variable.to_string(),
        units: get_str_attr(&var, "units"),
        axes,
        values,
    }))
}
