//! Grid geometry and the field types passed between pipeline stages.

use ndarray::{Array3, ArrayD};
use serde::{Deserialize, Serialize};

use crate::error::{Component, PrepError, PrepResult};

/// Semantic label of one array axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisKind {
    Level,
    Latitude,
    Longitude,
}

/// Canonical axis order of every normalized field.
pub const CANONICAL_AXES: [AxisKind; 3] = [AxisKind::Level, AxisKind::Latitude, AxisKind::Longitude];

/// A global regular latitude/longitude grid: 90N..90S, 0E..(360 - resolution)E.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub nlat: usize,
    pub nlon: usize,
    /// Grid spacing in degrees, equal in both directions.
    pub resolution: f64,
}

impl Default for GridGeometry {
    fn default() -> Self {
        Self::global_quarter_degree()
    }
}

impl GridGeometry {
    /// The 0.25 degree GDAS grid: 721 x 1440.
    pub fn global_quarter_degree() -> Self {
        Self {
            nlat: 721,
            nlon: 1440,
            resolution: 0.25,
        }
    }

    /// A global grid at `resolution` degrees, which must divide 180 evenly.
    pub fn global(resolution: f64) -> PrepResult<Self> {
        let rows = 180.0 / resolution;
        if !(resolution > 0.0) || (rows - rows.round()).abs() > 1e-9 {
            return Err(PrepError::config(
                Component::Pipeline,
                format!("grid resolution {} does not divide 180 degrees", resolution),
            ));
        }
        let rows = rows.round() as usize;
        Ok(Self {
            nlat: rows + 1,
            nlon: rows * 2,
            resolution,
        })
    }

    pub fn last_longitude(&self) -> f64 {
        360.0 - self.resolution
    }

    /// Latitudes of canonical rows, north to south.
    pub fn latitudes(&self) -> Vec<f64> {
        (0..self.nlat)
            .map(|i| 90.0 - i as f64 * self.resolution)
            .collect()
    }

    pub fn longitudes(&self) -> Vec<f64> {
        (0..self.nlon).map(|j| j as f64 * self.resolution).collect()
    }

    /// The declared extent of a canonically oriented field on this grid.
    pub fn canonical_extent(&self) -> DeclaredGrid {
        DeclaredGrid {
            first_latitude: 90.0,
            last_latitude: -90.0,
            first_longitude: 0.0,
            last_longitude: self.last_longitude(),
        }
    }
}

/// First and last coordinate of each horizontal axis, in storage order.
///
/// This is what a backend declares about its field; direction is derived from
/// it rather than assumed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeclaredGrid {
    pub first_latitude: f64,
    pub last_latitude: f64,
    pub first_longitude: f64,
    pub last_longitude: f64,
}

impl DeclaredGrid {
    pub fn latitude_ascending(&self) -> bool {
        self.first_latitude < self.last_latitude
    }

    pub fn longitude_descending(&self) -> bool {
        self.first_longitude > self.last_longitude
    }

    pub(crate) fn flip_latitude(&mut self) {
        std::mem::swap(&mut self.first_latitude, &mut self.last_latitude);
    }

    pub(crate) fn flip_longitude(&mut self) {
        std::mem::swap(&mut self.first_longitude, &mut self.last_longitude);
    }
}

/// A decoded grid as a backend returns it. Nothing about its orientation is
/// assumed; `axes` labels every dimension of `values`.
#[derive(Debug, Clone)]
pub struct RawField {
    /// Backend-side identifier (e.g. `gh@isobaricInhPa` or `HGT`).
    pub source: String,
    pub values: ArrayD<f32>,
    pub axes: Vec<AxisKind>,
    pub grid: DeclaredGrid,
    /// Pressure in hPa of each entry along the level axis (or of this 2-D
    /// field), in storage order. `None` for non-pressure surfaces.
    pub levels: Option<Vec<f64>>,
    /// Unit conversion has already been applied.
    pub converted: bool,
}

impl RawField {
    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn axis_index(&self, kind: AxisKind) -> Option<usize> {
        self.axes.iter().position(|a| *a == kind)
    }
}

/// A field in canonical orientation: `(level, latitude, longitude)`, latitude
/// north to south, longitude eastwards from 0, pressure descending.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalField {
    pub name: String,
    pub values: Array3<f32>,
    /// Pressure levels in hPa for multi-level fields.
    pub levels: Option<Vec<f64>>,
    pub grid: DeclaredGrid,
    pub converted: bool,
}

impl CanonicalField {
    pub fn shape(&self) -> [usize; 3] {
        let (l, y, x) = self.values.dim();
        [l, y, x]
    }

    /// View this field as raw input again, e.g. to check normalization is
    /// idempotent.
    pub fn into_raw(self) -> RawField {
        RawField {
            source: self.name,
            values: self.values.into_dyn(),
            axes: CANONICAL_AXES.to_vec(),
            grid: self.grid,
            levels: self.levels,
            converted: self.converted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_degree_grid() {
        let grid = GridGeometry::global_quarter_degree();
        assert_eq!((grid.nlat, grid.nlon), (721, 1440));
        assert_eq!(grid.last_longitude(), 359.75);
        assert_eq!(GridGeometry::global(0.25).unwrap(), grid);
    }

    #[test]
    fn test_coarse_grid() {
        let grid = GridGeometry::global(5.0).unwrap();
        assert_eq!((grid.nlat, grid.nlon), (37, 72));
        assert_eq!(grid.latitudes()[36], -90.0);
        assert_eq!(grid.longitudes()[71], 355.0);
    }

    #[test]
    fn test_uneven_resolution_rejected() {
        assert!(GridGeometry::global(0.7).is_err());
        assert!(GridGeometry::global(0.0).is_err());
        assert!(GridGeometry::global(-1.0).is_err());
    }

    #[test]
    fn test_declared_direction() {
        let mut grid = GridGeometry::global(1.0).unwrap().canonical_extent();
        assert!(!grid.latitude_ascending());
        assert!(!grid.longitude_descending());

        grid.flip_latitude();
        grid.flip_longitude();
        assert!(grid.latitude_ascending());
        assert!(grid.longitude_descending());
    }
}
