//! Resolved configuration for one preparation run.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog::{BackendKind, PressureLevels};
use crate::error::{Component, PrepError, PrepResult};
use crate::field::GridGeometry;

/// Everything the core needs; no argument parsing happens below this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepConfig {
    /// Analysis time of the GDAS cycle (00, 06, 12 or 18 UTC).
    pub analysis_time: Option<DateTime<Utc>>,

    /// 13 or 37 pressure levels.
    pub pressure_levels: PressureLevels,

    pub backend: BackendKind,

    /// Directory receiving `input_surface.npy` and `input_upper.npy`.
    pub output_dir: PathBuf,

    /// Parent of the per-run scratch directory (system temp dir if unset).
    pub scratch_dir: Option<PathBuf>,

    /// The `wgrib2` executable, for the external backend.
    pub wgrib2_path: PathBuf,

    pub grid: GridGeometry,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            analysis_time: None,
            pressure_levels: PressureLevels::L13,
            backend: BackendKind::External,
            output_dir: PathBuf::from("."),
            scratch_dir: None,
            wgrib2_path: PathBuf::from("wgrib2"),
            grid: GridGeometry::global_quarter_degree(),
        }
    }
}

impl PrepConfig {
    /// Load configuration from `GDAS_PREP_*` environment variables.
    ///
    /// Unset variables keep their defaults; unparsable ones are logged and
    /// ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GDAS_PREP_ANALYSIS_TIME") {
            match parse_analysis_time(&val) {
                Ok(time) => config.analysis_time = Some(time),
                Err(e) => warn!(value = %val, error = %e, "Ignoring GDAS_PREP_ANALYSIS_TIME"),
            }
        }

        if let Ok(val) = std::env::var("GDAS_PREP_LEVELS") {
            match val.parse() {
                Ok(levels) => config.pressure_levels = levels,
                Err(e) => warn!(value = %val, error = %e, "Ignoring GDAS_PREP_LEVELS"),
            }
        }

        if let Ok(val) = std::env::var("GDAS_PREP_BACKEND") {
            match val.parse() {
                Ok(backend) => config.backend = backend,
                Err(e) => warn!(value = %val, error = %e, "Ignoring GDAS_PREP_BACKEND"),
            }
        }

        if let Ok(val) = std::env::var("GDAS_PREP_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("GDAS_PREP_SCRATCH_DIR") {
            config.scratch_dir = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("GDAS_PREP_WGRIB2") {
            config.wgrib2_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("GDAS_PREP_GRID_RESOLUTION") {
            match val.parse::<f64>().map_err(|e| e.to_string()).and_then(|res| {
                GridGeometry::global(res).map_err(|e| e.to_string())
            }) {
                Ok(grid) => config.grid = grid,
                Err(e) => warn!(value = %val, error = %e, "Ignoring GDAS_PREP_GRID_RESOLUTION"),
            }
        }

        config
    }

    pub fn with_analysis_time(mut self, time: DateTime<Utc>) -> Self {
        self.analysis_time = Some(time);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> PrepResult<()> {
        let time = self.analysis_time.ok_or_else(|| {
            PrepError::config(Component::Pipeline, "analysis time is required")
        })?;

        if time.hour() % 6 != 0 || time.minute() != 0 || time.second() != 0 {
            return Err(PrepError::config(
                Component::Pipeline,
                format!("analysis time {} is not a 00/06/12/18 UTC cycle", time.format("%Y%m%d%H")),
            ));
        }

        if self.grid.nlat < 2 || self.grid.nlon < 1 || !(self.grid.resolution > 0.0) {
            return Err(PrepError::config(
                Component::Pipeline,
                format!("invalid grid geometry {:?}", self.grid),
            ));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(PrepError::config(Component::Pipeline, "output directory is empty"));
        }

        Ok(())
    }
}

/// Parse a `YYYYMMDDHH` analysis timestamp.
pub fn parse_analysis_time(value: &str) -> PrepResult<DateTime<Utc>> {
    let value = value.trim();
    if value.len() != 10 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PrepError::config(
            Component::Pipeline,
            format!("analysis time '{}' is not in YYYYMMDDHH form", value),
        ));
    }

    NaiveDateTime::parse_from_str(&format!("{}0000", value), "%Y%m%d%H%M%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            PrepError::config(
                Component::Pipeline,
                format!("invalid analysis time '{}': {}", value, e),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn test_parse_analysis_time() {
        let time = parse_analysis_time("2024011512").unwrap();
        assert_eq!((time.year(), time.month(), time.day(), time.hour()), (2024, 1, 15, 12));

        assert!(parse_analysis_time("20240115").is_err());
        assert!(parse_analysis_time("2024013212").is_err());
        assert!(parse_analysis_time("2024-01-15").is_err());
    }

    // The only test touching GDAS_PREP_* so parallel tests never observe it.
    #[test]
    fn test_from_env_overrides_and_ignores_invalid() {
        let vars = [
            ("GDAS_PREP_ANALYSIS_TIME", "2024011506"),
            ("GDAS_PREP_LEVELS", "37"),
            ("GDAS_PREP_BACKEND", "grib-api"),
            ("GDAS_PREP_OUTPUT_DIR", "/tmp/tensors"),
            ("GDAS_PREP_SCRATCH_DIR", "/tmp/scratch"),
            ("GDAS_PREP_WGRIB2", "/opt/wgrib2/bin/wgrib2"),
            ("GDAS_PREP_GRID_RESOLUTION", "0"),
        ];
        for (name, value) in vars {
            std::env::set_var(name, value);
        }
        let config = PrepConfig::from_env();
        for (name, _) in vars {
            std::env::remove_var(name);
        }

        assert_eq!(config.analysis_time, Some(parse_analysis_time("2024011506").unwrap()));
        assert_eq!(config.pressure_levels, PressureLevels::L37);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/tensors"));
        assert_eq!(config.scratch_dir, Some(PathBuf::from("/tmp/scratch")));
        assert_eq!(config.wgrib2_path, PathBuf::from("/opt/wgrib2/bin/wgrib2"));
        // Unknown backend and a zero resolution fall back to defaults.
        assert_eq!(config.backend, BackendKind::External);
        assert_eq!(config.grid, GridGeometry::global_quarter_degree());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_time() {
        let err = PrepConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("analysis time is required"));
    }

    #[test]
    fn test_validate_cycle_hour() {
        let config = PrepConfig::default()
            .with_analysis_time(Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap());
        assert!(config.validate().is_ok());

        let config = PrepConfig::default()
            .with_analysis_time(Utc.with_ymd_and_hms(2024, 1, 15, 3, 0, 0).unwrap());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = PrepConfig::default();
        assert_eq!(config.pressure_levels, PressureLevels::L13);
        assert_eq!(config.backend, BackendKind::External);
        assert_eq!((config.grid.nlat, config.grid.nlon), (721, 1440));
    }

    #[test]
    fn test_serde_round_trip_uses_level_count() {
        let config = PrepConfig {
            pressure_levels: PressureLevels::L37,
            backend: BackendKind::InProcess,
            ..PrepConfig::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["pressure_levels"], 37);
        assert_eq!(json["backend"], "in-process");

        let back: PrepConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.pressure_levels, PressureLevels::L37);
    }
}
