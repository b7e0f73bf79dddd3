//! Normalization into canonical orientation.
//!
//! Every decision here is taken from metadata carried by the field itself:
//! axis labels, the declared first/last coordinates and per-level pressures.
//! A field that is already canonical passes through unchanged.

use ndarray::{Axis, Ix3, IxDyn};
use tracing::debug;

use crate::catalog::VariableSpec;
use crate::error::{Component, PrepError, PrepResult};
use crate::field::{AxisKind, CanonicalField, DeclaredGrid, GridGeometry, RawField};

const COORD_TOLERANCE: f64 = 1e-3;

/// Bring `raw` into `(level, latitude, longitude)` order with latitude north
/// to south, longitude eastwards from 0 and pressure descending, then apply
/// the variable's unit conversion unless it has already been applied.
pub fn normalize(raw: RawField, spec: &VariableSpec, grid: &GridGeometry) -> PrepResult<CanonicalField> {
    let RawField {
        values,
        mut axes,
        grid: mut declared,
        levels: raw_levels,
        converted,
        ..
    } = raw;

    check_axes(&axes, values.ndim(), spec)?;

    let order = &spec.axis_order;
    let target = |kind: AxisKind| order.iter().position(|a| *a == kind);
    let (Some(lev_ax), Some(lat_ax), Some(lon_ax)) = (
        target(AxisKind::Level),
        target(AxisKind::Latitude),
        target(AxisKind::Longitude),
    ) else {
        return Err(grid_error(spec, format!("axis order {:?} is not level/lat/lon", order)));
    };

    let mut values = values;
    if !axes.contains(&AxisKind::Level) {
        values = values.insert_axis(Axis(0));
        axes.insert(0, AxisKind::Level);
    }

    let permutation: Vec<usize> = order
        .iter()
        .filter_map(|kind| axes.iter().position(|a| a == kind))
        .collect();
    let mut values = values
        .permuted_axes(IxDyn(&permutation))
        .into_dimensionality::<Ix3>()
        .map_err(|e| grid_error(spec, e.to_string()))?;

    let shape = values.shape();
    let (nlev, nlat, nlon) = (shape[lev_ax], shape[lat_ax], shape[lon_ax]);
    if (nlat, nlon) != (grid.nlat, grid.nlon) {
        return Err(grid_error(
            spec,
            format!(
                "spatial shape {}x{} does not match configured {}x{}",
                nlat, nlon, grid.nlat, grid.nlon
            ),
        ));
    }
    if nlev != spec.level_count() {
        return Err(PrepError::LevelCountMismatch {
            component: Component::Normalizer,
            variable: spec.name.to_string(),
            expected: spec.level_count(),
            found: nlev,
        });
    }
    check_extent(&declared, grid, spec)?;

    let flip_lat = declared.latitude_ascending();
    if flip_lat {
        values.invert_axis(Axis(lat_ax));
        declared.flip_latitude();
    }
    let flip_lon = declared.longitude_descending();
    if flip_lon {
        values.invert_axis(Axis(lon_ax));
        declared.flip_longitude();
    }

    let mut flip_levels = false;
    let levels = match spec.declared_pressures() {
        Some(expected) => {
            let found = raw_levels.unwrap_or_default();
            if found.len() != nlev {
                return Err(level_mismatch(spec, expected, found));
            }
            let levels = if is_strictly(&found, |a, b| a < b) {
                flip_levels = true;
                values.invert_axis(Axis(lev_ax));
                found.into_iter().rev().collect()
            } else if is_strictly(&found, |a, b| a > b) {
                found
            } else {
                let indices = expected
                    .iter()
                    .map(|p| found.iter().position(|f| f == p))
                    .collect::<Option<Vec<usize>>>();
                match indices {
                    Some(indices) => {
                        values = values.select(Axis(lev_ax), &indices);
                        indices.iter().map(|i| found[*i]).collect()
                    }
                    None => return Err(level_mismatch(spec, expected, found)),
                }
            };
            if levels != expected {
                return Err(level_mismatch(spec, expected, levels));
            }
            Some(levels)
        }
        None => None,
    };

    if !converted && spec.conversion_factor != 1.0 {
        let factor = spec.conversion_factor;
        values.mapv_inplace(|v| (v as f64 * factor) as f32);
    }

    debug!(
        variable = spec.name,
        shape = ?values.dim(),
        flip_lat,
        flip_lon,
        flip_levels,
        factor = spec.conversion_factor,
        already_converted = converted,
        "Normalized field"
    );

    Ok(CanonicalField {
        name: spec.name.to_string(),
        values: values.as_standard_layout().into_owned(),
        levels,
        grid: declared,
        converted: true,
    })
}

fn check_axes(axes: &[AxisKind], ndim: usize, spec: &VariableSpec) -> PrepResult<()> {
    let count = |kind| axes.iter().filter(|a| **a == kind).count();
    if axes.len() != ndim
        || count(AxisKind::Latitude) != 1
        || count(AxisKind::Longitude) != 1
        || count(AxisKind::Level) > 1
    {
        return Err(grid_error(
            spec,
            format!("axes {:?} do not describe a {}-D lat/lon field", axes, ndim),
        ));
    }
    Ok(())
}

/// The declared corners must be the configured global grid in some orientation.
fn check_extent(declared: &DeclaredGrid, grid: &GridGeometry, spec: &VariableSpec) -> PrepResult<()> {
    let close = |a: f64, b: f64| (a - b).abs() < COORD_TOLERANCE;
    let lon = |v: f64| v.rem_euclid(360.0);

    let lat_ok = (close(declared.first_latitude, 90.0) && close(declared.last_latitude, -90.0))
        || (close(declared.first_latitude, -90.0) && close(declared.last_latitude, 90.0));

    let (first, last) = (lon(declared.first_longitude), lon(declared.last_longitude));
    let east = grid.last_longitude();
    let lon_ok = (close(first, 0.0) && close(last, east)) || (close(first, east) && close(last, 0.0));

    if !lat_ok || !lon_ok {
        return Err(grid_error(
            spec,
            format!(
                "declared extent lat {}..{} lon {}..{} is not the global {} degree grid",
                declared.first_latitude,
                declared.last_latitude,
                declared.first_longitude,
                declared.last_longitude,
                grid.resolution
            ),
        ));
    }
    Ok(())
}

fn is_strictly(values: &[f64], cmp: impl Fn(f64, f64) -> bool) -> bool {
    values.len() > 1 && values.windows(2).all(|w| cmp(w[0], w[1]))
}

fn grid_error(spec: &VariableSpec, reason: String) -> PrepError {
    PrepError::UnsupportedGridResolution {
        component: Component::Normalizer,
        variable: spec.name.to_string(),
        reason,
    }
}

fn level_mismatch(spec: &VariableSpec, expected: Vec<f64>, found: Vec<f64>) -> PrepError {
    PrepError::LevelMismatch {
        component: Component::Normalizer,
        variable: spec.name.to_string(),
        expected,
        found,
    }
}
