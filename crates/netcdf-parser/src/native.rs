//! Low-level helpers around the native netcdf library.
//!
//! The netcdf crate wraps libnetcdf/HDF5, which needs a file path rather than
//! an in-memory buffer. Everything here works on an opened `netcdf::File`.

use std::sync::Once;

use crate::error::{NetCdfError, NetCdfResult};

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints verbose error messages to stderr even when errors
/// are handled gracefully by the Rust code (e.g., when checking for optional
/// attributes that don't exist). This creates confusing log spam like:
///
/// ```text
/// HDF5-DIAG: Error detected in HDF5 (1.10.8) thread 3:
///   #003: ../../../src/H5Adense.c line 397 in H5A__dense_open(): can't locate attribute in name index
/// ```
///
/// Safe to call multiple times; only the first call has an effect.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and we're passing null pointers
        // to disable error output, which is a documented valid use.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Read every value of a variable as `f32`, applying `scale_factor`,
/// `add_offset` and mapping `_FillValue` / `missing_value` to NaN.
pub(crate) fn read_unpacked_f32(var: &netcdf::Variable) -> NetCdfResult<Vec<f32>> {
    let raw: Vec<f64> = var.get_values(..).map_err(|e| NetCdfError::Read {
        variable: var.name(),
        reason: e.to_string(),
    })?;

    let scale_factor = get_f64_attr(var, "scale_factor").unwrap_or(1.0);
    let add_offset = get_f64_attr(var, "add_offset").unwrap_or(0.0);
    let fill_values: Vec<f64> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|name| get_f64_attr(var, name))
        .collect();

    Ok(raw
        .into_iter()
        .map(|val| {
            if val.is_nan() || fill_values.iter().any(|fill| is_fill(val, *fill)) {
                f32::NAN
            } else {
                (val * scale_factor + add_offset) as f32
            }
        })
        .collect())
}

/// Read a 1-D coordinate variable as `f64`, without any unpacking.
pub(crate) fn read_coordinate(var: &netcdf::Variable) -> NetCdfResult<Vec<f64>> {
    var.get_values(..).map_err(|e| NetCdfError::Read {
        variable: format!("coordinate {}", var.name()),
        reason: e.to_string(),
    })
}

fn is_fill(value: f64, fill: f64) -> bool {
    // wgrib2 writes 9.999e20 as a float, so compare relatively.
    value == fill || ((value - fill).abs() <= fill.abs() * 1e-6)
}

/// Check if a variable has an attribute with the given name.
/// This avoids HDF5 error spam when checking for optional attributes.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

/// Helper to get f64 attribute.
pub(crate) fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}

/// Helper to get a string attribute.
pub(crate) fn get_str_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}
