//! Complete synthetic GDAS analysis files.
//!
//! [`SyntheticGdas`] writes a multi-message GRIB2 file holding the four
//! surface fields and the five upper-air fields on every requested pressure
//! level, in the message order NCEP uses (pressure ascending per parameter).

use std::path::Path;

use crate::fixtures::grid::{GridSpec, COARSE_5DEG};
use crate::fixtures::levels::LEVELS_13_FILE_ORDER;
use crate::fixtures::time::ANALYSIS_YMDH;
use crate::generators::SyntheticVariable;
use crate::grib2_builder::{concat_messages, Grib2Builder};

#[derive(Debug, Clone)]
pub struct SyntheticGdas {
    pub grid: GridSpec,
    /// Pressure levels in hPa, in file order.
    pub levels: Vec<u32>,
    pub reference_time: (u16, u8, u8, u8),
    /// Variables left out of the file.
    pub omit: Vec<SyntheticVariable>,
    /// Levels written twice for every upper-air variable.
    pub duplicate_levels: Vec<u32>,
}

impl Default for SyntheticGdas {
    fn default() -> Self {
        Self {
            grid: COARSE_5DEG,
            levels: LEVELS_13_FILE_ORDER.to_vec(),
            reference_time: ANALYSIS_YMDH,
            omit: Vec::new(),
            duplicate_levels: Vec::new(),
        }
    }
}

impl SyntheticGdas {
    pub fn with_levels(mut self, levels: &[u32]) -> Self {
        self.levels = levels.to_vec();
        self
    }

    pub fn without(mut self, variable: SyntheticVariable) -> Self {
        self.omit.push(variable);
        self
    }

    pub fn with_duplicate_level(mut self, level: u32) -> Self {
        self.duplicate_levels.push(level);
        self
    }

    /// One message builder per field, in file order.
    pub fn builders(&self) -> Vec<Grib2Builder> {
        let lats = self.grid.latitudes_north_to_south();
        let lons = self.grid.longitudes();
        let (y, m, d, h) = self.reference_time;
        let base = Grib2Builder::new_gfs()
            .with_global_grid(&self.grid)
            .with_reference_time(y, m, d, h);

        let mut builders = Vec::new();
        for var in SyntheticVariable::SURFACE {
            if self.omit.contains(&var) {
                continue;
            }
            let (category, number) = var.parameter();
            let (level_type, level_value) = var.surface().unwrap_or((1, 0));
            builders.push(
                base.clone()
                    .with_parameter(category, number)
                    .with_level(level_type, level_value)
                    .with_data(var.field(0.0, &lats, &lons)),
            );
        }

        for var in SyntheticVariable::UPPER {
            if self.omit.contains(&var) {
                continue;
            }
            let (category, number) = var.parameter();
            for &level in &self.levels {
                let copies = if self.duplicate_levels.contains(&level) { 2 } else { 1 };
                for _ in 0..copies {
                    builders.push(
                        base.clone()
                            .with_parameter(category, number)
                            .with_pressure_level(level)
                            .with_data(var.field(level as f64, &lats, &lons)),
                    );
                }
            }
        }

        builders
    }

    pub fn grib2_bytes(&self) -> Vec<u8> {
        concat_messages(&self.builders())
    }

    pub fn write_grib2(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.grib2_bytes())
    }

    /// Expected value of a field at canonical indices (level index into the
    /// 1000 -> 50 ordering, latitude index from north, longitude index from 0E).
    pub fn expected(&self, var: SyntheticVariable, pressure_hpa: u32, ilat: usize, ilon: usize) -> f32 {
        let lat = 90.0 - ilat as f64 * self.grid.resolution;
        let lon = ilon as f64 * self.grid.resolution;
        var.value(pressure_hpa as f64, lat, lon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_count() {
        let gdas = SyntheticGdas::default();
        assert_eq!(gdas.builders().len(), 4 + 5 * 13);

        let gdas = SyntheticGdas::default()
            .without(SyntheticVariable::Spfh)
            .with_duplicate_level(500);
        assert_eq!(gdas.builders().len(), 4 + 4 * 14);
    }

    #[test]
    fn test_grib2_bytes_are_concatenated_messages() {
        let bytes = SyntheticGdas::default().grib2_bytes();
        let markers = bytes.windows(4).filter(|w| *w == b"GRIB").count();
        assert!(markers >= 69);
        assert_eq!(&bytes[bytes.len() - 4..], b"7777");
    }
}
