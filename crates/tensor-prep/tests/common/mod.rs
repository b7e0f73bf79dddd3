//! Shared helpers for tensor-prep integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use grib2_parser::{Grib2Message, Grib2Reader, Grib2Tables};
use tensor_prep::backend::{
    BackendResult, ExternalBackend, ExtractionRequest, ExtractionTool, InProcessBackend,
};
use tensor_prep::catalog::wgrib2_variable_name;
use tensor_prep::{Backend, BackendError, BackendKind, GridGeometry, PrepConfig, PressureLevels};
use test_utils::{write_wgrib2_netcdf, SyntheticGdas, Wgrib2Variable};

/// Stands in for `wgrib2 -netcdf`: selects messages from the input GRIB2 by
/// their inventory line and writes them in wgrib2's NetCDF layout (latitude
/// south to north, levels in file order, pressure in Pa).
#[derive(Default)]
pub struct FakeWgrib2 {
    pub requests: Mutex<Vec<ExtractionRequest>>,
}

impl FakeWgrib2 {
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// `:PARAM:level:` as in a wgrib2 inventory.
fn inventory(message: &Grib2Message) -> String {
    format!(":{}:{}:", message.parameter(), message.level())
}

/// Substring match supporting one `(a|b|c)` alternation group.
fn level_matches(line: &str, pattern: &str) -> bool {
    match (pattern.find('('), pattern.find(')')) {
        (Some(open), Some(close)) if open < close => {
            let (prefix, suffix) = (&pattern[..open], &pattern[close + 1..]);
            pattern[open + 1..close]
                .split('|')
                .any(|alt| line.contains(&format!("{}{}{}", prefix, alt, suffix)))
        }
        _ => line.contains(pattern),
    }
}

impl ExtractionTool for FakeWgrib2 {
    fn name(&self) -> &str {
        "fake-wgrib2"
    }

    fn extract(&self, request: &ExtractionRequest) -> BackendResult<()> {
        self.requests.lock().unwrap().push(request.clone());

        let mut reader = Grib2Reader::open(&request.input, Arc::new(Grib2Tables::gfs()))
            .map_err(|e| BackendError::Execution(e.to_string()))?;
        let messages = reader
            .messages()
            .map_err(|e| BackendError::Execution(e.to_string()))?;

        let matched: Vec<&Grib2Message> = messages
            .iter()
            .filter(|m| {
                let line = inventory(m);
                line.contains(&request.variable_match) && level_matches(&line, &request.level_match)
            })
            .collect();

        let Some(first) = matched.first() else {
            return Ok(());
        };

        let gd = &first.grid_definition;
        let (nlat, nlon) = (gd.num_points_latitude as usize, gd.num_points_longitude as usize);
        let latitudes: Vec<f64> = (0..nlat)
            .rev()
            .map(|i| gd.first_latitude() - i as f64 * gd.latitude_increment())
            .collect();
        let longitudes: Vec<f64> = (0..nlon)
            .map(|j| gd.first_longitude() + j as f64 * gd.longitude_increment())
            .collect();

        let mut values = Vec::with_capacity(matched.len() * nlat * nlon);
        for message in &matched {
            let data = message
                .unpack_data()
                .map_err(|e| BackendError::Execution(e.to_string()))?;
            for row in data.chunks(nlon).rev() {
                values.extend_from_slice(row);
            }
        }

        let (name, levels) = match request.pressure_level_count {
            Some(_) => (
                wgrib2_variable_name(&first.parameter(), None),
                Some(matched.iter().map(|m| m.level_value() * 100.0).collect::<Vec<f64>>()),
            ),
            None => (wgrib2_variable_name(&first.parameter(), Some(&first.level())), None),
        };

        write_wgrib2_netcdf(
            &request.output,
            &[Wgrib2Variable {
                name: &name,
                levels: levels.as_deref().map(|l| (l, "Pa")),
                latitudes: &latitudes,
                longitudes: &longitudes,
                values: &values,
            }],
        )
        .map_err(|e| BackendError::Execution(e.to_string()))
    }
}

/// The 5 degree grid every synthetic dataset uses.
pub fn coarse_grid() -> GridGeometry {
    GridGeometry::global(5.0).unwrap()
}

pub fn config(output_dir: &Path, levels: PressureLevels, backend: BackendKind) -> PrepConfig {
    PrepConfig {
        analysis_time: Some(tensor_prep::parse_analysis_time(test_utils::time::ANALYSIS_TIME).unwrap()),
        pressure_levels: levels,
        backend,
        output_dir: output_dir.to_path_buf(),
        scratch_dir: None,
        wgrib2_path: PathBuf::from("wgrib2"),
        grid: coarse_grid(),
    }
}

pub fn write_gdas(dir: &Path, gdas: &SyntheticGdas) -> PathBuf {
    let path = dir.join("gdas.t12z.pgrb2.0p25.f000");
    gdas.write_grib2(&path).unwrap();
    path
}

pub fn backend(kind: BackendKind) -> Box<dyn Backend> {
    match kind {
        BackendKind::InProcess => Box::new(InProcessBackend::new()),
        BackendKind::External => Box::new(ExternalBackend::new(Arc::new(FakeWgrib2::default()), None)),
    }
}

/// Whether a real `wgrib2` is on the PATH.
pub fn wgrib2_available() -> bool {
    std::process::Command::new("wgrib2")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_matches() {
        assert!(level_matches(":HGT:500 mb:", ":(1000|500) mb:"));
        assert!(!level_matches(":HGT:50 mb:", ":(1000|500) mb:"));
        assert!(level_matches(":TMP:2 m above ground:", ":2 m above ground:"));
    }
}
