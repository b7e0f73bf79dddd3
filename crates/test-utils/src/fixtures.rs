//! Common test fixtures for GDAS preprocessing tests.

/// Global regular latitude/longitude grids.
pub mod grid {
    /// GDAS 0.25 degree analysis grid.
    pub const GDAS_0P25: GridSpec = GridSpec {
        nlat: 721,
        nlon: 1440,
        resolution: 0.25,
    };

    /// Coarse 5 degree grid, small enough to build whole datasets in tests.
    pub const COARSE_5DEG: GridSpec = GridSpec {
        nlat: 37,
        nlon: 72,
        resolution: 5.0,
    };

    /// A global grid spanning 90N..90S and 0E..(360 - resolution)E.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct GridSpec {
        pub nlat: usize,
        pub nlon: usize,
        pub resolution: f64,
    }

    impl GridSpec {
        /// Returns the total number of grid points.
        pub fn size(&self) -> usize {
            self.nlat * self.nlon
        }

        /// Latitudes from the north pole southwards.
        pub fn latitudes_north_to_south(&self) -> Vec<f64> {
            (0..self.nlat)
                .map(|i| 90.0 - i as f64 * self.resolution)
                .collect()
        }

        /// Latitudes from the south pole northwards, as wgrib2 writes them.
        pub fn latitudes_south_to_north(&self) -> Vec<f64> {
            let mut lats = self.latitudes_north_to_south();
            lats.reverse();
            lats
        }

        /// Longitudes eastwards from the prime meridian.
        pub fn longitudes(&self) -> Vec<f64> {
            (0..self.nlon)
                .map(|j| j as f64 * self.resolution)
                .collect()
        }

        /// Resolution in microdegrees, as GRIB2 encodes it.
        pub fn resolution_microdegrees(&self) -> u32 {
            (self.resolution * 1e6).round() as u32
        }
    }
}

/// Common analysis times.
pub mod time {
    /// Analysis time used across tests, in `YYYYMMDDHH` form.
    pub const ANALYSIS_TIME: &str = "2024011512";

    /// Components of [`ANALYSIS_TIME`].
    pub const ANALYSIS_YMDH: (u16, u8, u8, u8) = (2024, 1, 15, 12);

    /// GDAS cycles.
    pub const GDAS_CYCLES: [&str; 4] = ["00", "06", "12", "18"];
}

/// Pressure level sets, hPa, in the order GDAS files store them
/// (lowest pressure first).
pub mod levels {
    pub const LEVELS_13_FILE_ORDER: [u32; 13] =
        [50, 100, 150, 200, 250, 300, 400, 500, 600, 700, 850, 925, 1000];

    pub const LEVELS_37_FILE_ORDER: [u32; 37] = [
        1, 2, 3, 5, 7, 10, 20, 30, 50, 70, 100, 125, 150, 175, 200, 225, 250, 300, 350, 400, 450,
        500, 550, 600, 650, 700, 750, 775, 800, 825, 850, 875, 900, 925, 950, 975, 1000,
    ];
}
