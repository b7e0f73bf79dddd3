//! Test data generators for synthetic GDAS-like fields.
//!
//! Every variable is a smooth, deterministic function of pressure, latitude
//! and longitude. Values differ along each axis, so a flipped or transposed
//! array is detectable by sampling a single point.

/// The nine fields a GDAS preprocessing run extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntheticVariable {
    Prmsl,
    U10,
    V10,
    T2m,
    Hgt,
    Spfh,
    Tmp,
    Ugrd,
    Vgrd,
}

impl SyntheticVariable {
    pub const SURFACE: [SyntheticVariable; 4] = [
        SyntheticVariable::Prmsl,
        SyntheticVariable::U10,
        SyntheticVariable::V10,
        SyntheticVariable::T2m,
    ];

    pub const UPPER: [SyntheticVariable; 5] = [
        SyntheticVariable::Hgt,
        SyntheticVariable::Spfh,
        SyntheticVariable::Tmp,
        SyntheticVariable::Ugrd,
        SyntheticVariable::Vgrd,
    ];

    /// GRIB2 (category, number) within discipline 0.
    pub fn parameter(self) -> (u8, u8) {
        match self {
            SyntheticVariable::Prmsl => (3, 1),
            SyntheticVariable::U10 | SyntheticVariable::Ugrd => (2, 2),
            SyntheticVariable::V10 | SyntheticVariable::Vgrd => (2, 3),
            SyntheticVariable::T2m | SyntheticVariable::Tmp => (0, 0),
            SyntheticVariable::Hgt => (3, 5),
            SyntheticVariable::Spfh => (1, 0),
        }
    }

    /// Fixed surface (type, scaled value) for single-level fields.
    pub fn surface(self) -> Option<(u8, u32)> {
        match self {
            SyntheticVariable::Prmsl => Some((101, 0)),
            SyntheticVariable::U10 | SyntheticVariable::V10 => Some((103, 10)),
            SyntheticVariable::T2m => Some((103, 2)),
            _ => None,
        }
    }

    pub fn is_upper(self) -> bool {
        self.surface().is_none()
    }

    /// Variable name in `wgrib2 -netcdf` output.
    pub fn wgrib2_name(self) -> &'static str {
        match self {
            SyntheticVariable::Prmsl => "PRMSL_meansealevel",
            SyntheticVariable::U10 => "UGRD_10maboveground",
            SyntheticVariable::V10 => "VGRD_10maboveground",
            SyntheticVariable::T2m => "TMP_2maboveground",
            SyntheticVariable::Hgt => "HGT",
            SyntheticVariable::Spfh => "SPFH",
            SyntheticVariable::Tmp => "TMP",
            SyntheticVariable::Ugrd => "UGRD",
            SyntheticVariable::Vgrd => "VGRD",
        }
    }

    /// Field value in GRIB2 units (geopotential height in gpm).
    ///
    /// `pressure_hpa` is ignored for single-level fields.
    pub fn value(self, pressure_hpa: f64, lat: f64, lon: f64) -> f32 {
        let north = lat + 90.0;
        let p = pressure_hpa;
        let v = match self {
            SyntheticVariable::Prmsl => 100_000.0 + 15.0 * north + 2.0 * lon,
            SyntheticVariable::U10 => 5.0 + 0.05 * north + 0.01 * lon,
            SyntheticVariable::V10 => -3.0 + 0.04 * lat + 0.005 * lon,
            SyntheticVariable::T2m => 250.0 + 0.3 * north + 0.01 * lon,
            SyntheticVariable::Hgt => {
                44_330.0 * (1.0 - (p / 1013.25).powf(0.1903)) + 0.5 * lat + 0.1 * lon
            }
            SyntheticVariable::Spfh => 0.01 * (p / 1000.0) + 1e-5 * north + 1e-6 * lon,
            SyntheticVariable::Tmp => 200.0 + 0.08 * p + 0.1 * north + 0.01 * lon,
            SyntheticVariable::Ugrd => 10.0 + 0.02 * (1000.0 - p) + 0.05 * lat + 0.01 * lon,
            SyntheticVariable::Vgrd => -5.0 + 0.01 * (1000.0 - p) + 0.03 * lat + 0.02 * lon,
        };
        v as f32
    }

    /// Row-major field on the given latitude and longitude axes.
    pub fn field(self, pressure_hpa: f64, lats: &[f64], lons: &[f64]) -> Vec<f32> {
        let mut data = Vec::with_capacity(lats.len() * lons.len());
        for &lat in lats {
            for &lon in lons {
                data.push(self.value(pressure_hpa, lat, lon));
            }
        }
        data
    }
}

/// Creates a grid with a constant value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Creates a grid where each cell is `col * 1000 + row`, row-major.
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid[1], 1000.0);
/// assert_eq!(grid[10], 1.0);
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}
