//! Grid catalog: the fixed table of variables that make up the two output
//! tensors, and how each backend finds them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Component, PrepError, PrepResult};
use crate::field::{AxisKind, GridGeometry, CANONICAL_AXES};

/// Standard gravity (m s^-2), converts geopotential height to geopotential.
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Canonical surface variables in tensor order.
pub const SURFACE_VARIABLES: [&str; 4] = ["msl", "u10", "v10", "t2m"];

/// Canonical upper-air variables in tensor order.
pub const UPPER_VARIABLES: [&str; 5] = ["z", "q", "t", "u", "v"];

const LEVELS_13: [u32; 13] = [1000, 925, 850, 700, 600, 500, 400, 300, 250, 200, 150, 100, 50];

const LEVELS_37: [u32; 37] = [
    1000, 975, 950, 925, 900, 875, 850, 825, 800, 775, 750, 700, 650, 600, 550, 500, 450, 400,
    350, 300, 250, 225, 200, 175, 150, 125, 100, 70, 50, 30, 20, 10, 7, 5, 3, 2, 1,
];

/// Which decoding mechanism resolves lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Decode the whole GRIB2 file in-process.
    InProcess,
    /// Run `wgrib2` once per variable and read its NetCDF output.
    External,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::InProcess, BackendKind::External];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::InProcess => "in-process",
            BackendKind::External => "external",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in-process" | "inprocess" | "pygrib" | "grib2" => Ok(BackendKind::InProcess),
            "external" | "wgrib2" => Ok(BackendKind::External),
            other => Err(PrepError::config(
                Component::Catalog,
                format!("unknown backend '{}' (expected wgrib2 or pygrib)", other),
            )),
        }
    }
}

/// Supported pressure level sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum PressureLevels {
    L13,
    L37,
}

impl PressureLevels {
    /// Levels in hPa, in output order (highest pressure first).
    pub fn levels(&self) -> &'static [u32] {
        match self {
            PressureLevels::L13 => &LEVELS_13,
            PressureLevels::L37 => &LEVELS_37,
        }
    }

    pub fn count(&self) -> usize {
        self.levels().len()
    }
}

impl TryFrom<u32> for PressureLevels {
    type Error = PrepError;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            13 => Ok(PressureLevels::L13),
            37 => Ok(PressureLevels::L37),
            other => Err(PrepError::config(
                Component::Catalog,
                format!("unsupported pressure level count {} (expected 13 or 37)", other),
            )),
        }
    }
}

impl From<PressureLevels> for u32 {
    fn from(levels: PressureLevels) -> u32 {
        levels.count() as u32
    }
}

impl FromStr for PressureLevels {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u32 = s.trim().parse().map_err(|_| {
            PrepError::config(Component::Catalog, format!("invalid level count '{}'", s))
        })?;
        PressureLevels::try_from(n)
    }
}

/// Vertical coordinate of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelType {
    MeanSea,
    HeightAboveGround,
    Isobaric,
}

/// Which level(s) of a variable to read.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelSelection {
    /// One surface; value in the surface's native unit (m, or 0 for MSL).
    Single(f64),
    /// Pressure levels in hPa, in declared output order.
    Pressure(Vec<u32>),
}

impl LevelSelection {
    pub fn count(&self) -> usize {
        match self {
            LevelSelection::Single(_) => 1,
            LevelSelection::Pressure(levels) => levels.len(),
        }
    }

    pub fn is_multi_level(&self) -> bool {
        matches!(self, LevelSelection::Pressure(_))
    }

    /// Whether a field at `value` (hPa for pressure) is selected.
    pub fn contains(&self, value: f64) -> bool {
        match self {
            LevelSelection::Single(v) => (v - value).abs() < 1e-6,
            LevelSelection::Pressure(levels) => {
                levels.iter().any(|p| (*p as f64 - value).abs() < 1e-6)
            }
        }
    }
}

impl fmt::Display for LevelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelSelection::Single(v) => write!(f, "{}", v),
            LevelSelection::Pressure(levels) => {
                let joined: Vec<String> = levels.iter().map(|p| p.to_string()).collect();
                write!(f, "[{}] hPa", joined.join(","))
            }
        }
    }
}

/// Backend-specific lookup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    /// In-process selection by eccodes names.
    Grib {
        short_name: &'static str,
        type_of_level: &'static str,
    },
    /// `wgrib2 -match <variable_match> -match <level_match>`, producing
    /// `netcdf_name` in the output file.
    Wgrib2 {
        variable_match: String,
        level_match: String,
        netcdf_name: String,
    },
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKey::Grib {
                short_name,
                type_of_level,
            } => write!(f, "{}/{}", short_name, type_of_level),
            LookupKey::Wgrib2 {
                variable_match,
                level_match,
                ..
            } => write!(f, "{} {}", variable_match, level_match),
        }
    }
}

/// One output tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorKind {
    Surface,
    Upper,
}

impl TensorKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            TensorKind::Surface => "input_surface.npy",
            TensorKind::Upper => "input_upper.npy",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TensorKind::Surface => "surface",
            TensorKind::Upper => "upper",
        }
    }
}

/// One physical quantity and how to obtain it.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub units: &'static str,
    pub tensor: TensorKind,
    pub level_type: LevelType,
    pub levels: LevelSelection,
    pub key: LookupKey,
    /// Multiplier applied once during normalization.
    pub conversion_factor: f64,
    /// Axis order of the normalized field.
    pub axis_order: [AxisKind; 3],
}

impl VariableSpec {
    pub fn is_multi_level(&self) -> bool {
        self.levels.is_multi_level()
    }

    pub fn level_count(&self) -> usize {
        self.levels.count()
    }

    /// Declared pressure levels as `f64`, for comparison with field metadata.
    pub fn declared_pressures(&self) -> Option<Vec<f64>> {
        match &self.levels {
            LevelSelection::Pressure(levels) => Some(levels.iter().map(|p| *p as f64).collect()),
            LevelSelection::Single(_) => None,
        }
    }
}

/// An ordered set of variables forming one output tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSpec {
    pub kind: TensorKind,
    pub variables: Vec<VariableSpec>,
}

impl TensorSpec {
    /// `[variables, lat, lon]` for surface, `[variables, levels, lat, lon]` for upper.
    pub fn shape(&self, grid: &GridGeometry) -> Vec<usize> {
        let mut shape = vec![self.variables.len()];
        if self.kind == TensorKind::Upper {
            shape.push(self.variables.first().map_or(0, |v| v.level_count()));
        }
        shape.push(grid.nlat);
        shape.push(grid.nlon);
        shape
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.variables.iter().map(|v| v.name).collect()
    }
}

/// Static description of one catalogued variable.
struct CatalogEntry {
    name: &'static str,
    description: &'static str,
    units: &'static str,
    tensor: TensorKind,
    level_type: LevelType,
    /// Level value for single-level variables.
    level: f64,
    /// (shortName, typeOfLevel)
    grib: Option<(&'static str, &'static str)>,
    /// (wgrib2 parameter, wgrib2 level description); pressure variables use "mb".
    wgrib2: Option<(&'static str, &'static str)>,
    factor: f64,
}

const TABLE: [CatalogEntry; 9] = [
    CatalogEntry {
        name: "msl",
        description: "Pressure reduced to mean sea level",
        units: "Pa",
        tensor: TensorKind::Surface,
        level_type: LevelType::MeanSea,
        level: 0.0,
        grib: Some(("prmsl", "meanSea")),
        wgrib2: Some(("PRMSL", "mean sea level")),
        factor: 1.0,
    },
    CatalogEntry {
        name: "u10",
        description: "10 m u-component of wind",
        units: "m s-1",
        tensor: TensorKind::Surface,
        level_type: LevelType::HeightAboveGround,
        level: 10.0,
        grib: Some(("10u", "heightAboveGround")),
        wgrib2: Some(("UGRD", "10 m above ground")),
        factor: 1.0,
    },
    CatalogEntry {
        name: "v10",
        description: "10 m v-component of wind",
        units: "m s-1",
        tensor: TensorKind::Surface,
        level_type: LevelType::HeightAboveGround,
        level: 10.0,
        grib: Some(("10v", "heightAboveGround")),
        wgrib2: Some(("VGRD", "10 m above ground")),
        factor: 1.0,
    },
    CatalogEntry {
        name: "t2m",
        description: "2 m temperature",
        units: "K",
        tensor: TensorKind::Surface,
        level_type: LevelType::HeightAboveGround,
        level: 2.0,
        grib: Some(("2t", "heightAboveGround")),
        wgrib2: Some(("TMP", "2 m above ground")),
        factor: 1.0,
    },
    CatalogEntry {
        name: "z",
        description: "Geopotential",
        units: "m2 s-2",
        tensor: TensorKind::Upper,
        level_type: LevelType::Isobaric,
        level: 0.0,
        grib: Some(("gh", "isobaricInhPa")),
        wgrib2: Some(("HGT", "mb")),
        factor: STANDARD_GRAVITY,
    },
    CatalogEntry {
        name: "q",
        description: "Specific humidity",
        units: "kg kg-1",
        tensor: TensorKind::Upper,
        level_type: LevelType::Isobaric,
        level: 0.0,
        grib: Some(("q", "isobaricInhPa")),
        wgrib2: Some(("SPFH", "mb")),
        factor: 1.0,
    },
    CatalogEntry {
        name: "t",
        description: "Temperature",
        units: "K",
        tensor: TensorKind::Upper,
        level_type: LevelType::Isobaric,
        level: 0.0,
        grib: Some(("t", "isobaricInhPa")),
        wgrib2: Some(("TMP", "mb")),
        factor: 1.0,
    },
    CatalogEntry {
        name: "u",
        description: "u-component of wind",
        units: "m s-1",
        tensor: TensorKind::Upper,
        level_type: LevelType::Isobaric,
        level: 0.0,
        grib: Some(("u", "isobaricInhPa")),
        wgrib2: Some(("UGRD", "mb")),
        factor: 1.0,
    },
    CatalogEntry {
        name: "v",
        description: "v-component of wind",
        units: "m s-1",
        tensor: TensorKind::Upper,
        level_type: LevelType::Isobaric,
        level: 0.0,
        grib: Some(("v", "isobaricInhPa")),
        wgrib2: Some(("VGRD", "mb")),
        factor: 1.0,
    },
];

/// Name of the variable `wgrib2 -netcdf` writes: the parameter, plus an
/// underscore and the alphanumeric part of the level for single surfaces.
///
/// `wgrib2_variable_name("TMP", Some("2 m above ground")) == "TMP_2maboveground"`
pub fn wgrib2_variable_name(parameter: &str, level: Option<&str>) -> String {
    let alnum = |s: &str| s.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>();
    match level {
        Some(level) => format!("{}_{}", alnum(parameter), alnum(level)),
        None => alnum(parameter),
    }
}

/// wgrib2 `-match` expression selecting every given pressure level.
pub fn wgrib2_pressure_pattern(levels: &[u32]) -> String {
    let joined: Vec<String> = levels.iter().map(|p| p.to_string()).collect();
    format!(":({}) mb:", joined.join("|"))
}

/// Resolve one canonical variable for a backend and level set.
pub fn lookup(
    canonical_name: &str,
    backend: BackendKind,
    levels: PressureLevels,
) -> PrepResult<VariableSpec> {
    let entry = TABLE
        .iter()
        .find(|e| e.name == canonical_name)
        .ok_or_else(|| {
            PrepError::config(
                Component::Catalog,
                format!("variable '{}' is not catalogued", canonical_name),
            )
        })?;

    let selection = match entry.level_type {
        LevelType::Isobaric => LevelSelection::Pressure(levels.levels().to_vec()),
        _ => LevelSelection::Single(entry.level),
    };

    let missing = || {
        PrepError::config(
            Component::Catalog,
            format!("variable '{}' has no {} lookup key", entry.name, backend),
        )
    };

    let key = match backend {
        BackendKind::InProcess => {
            let (short_name, type_of_level) = entry.grib.ok_or_else(missing)?;
            LookupKey::Grib {
                short_name,
                type_of_level,
            }
        }
        BackendKind::External => {
            let (parameter, level) = entry.wgrib2.ok_or_else(missing)?;
            match &selection {
                LevelSelection::Pressure(levels) => LookupKey::Wgrib2 {
                    variable_match: format!(":{}:", parameter),
                    level_match: wgrib2_pressure_pattern(levels),
                    netcdf_name: wgrib2_variable_name(parameter, None),
                },
                LevelSelection::Single(_) => LookupKey::Wgrib2 {
                    variable_match: format!(":{}:", parameter),
                    level_match: format!(":{}:", level),
                    netcdf_name: wgrib2_variable_name(parameter, Some(level)),
                },
            }
        }
    };

    Ok(VariableSpec {
        name: entry.name,
        description: entry.description,
        units: entry.units,
        tensor: entry.tensor,
        level_type: entry.level_type,
        levels: selection,
        key,
        conversion_factor: entry.factor,
        axis_order: CANONICAL_AXES,
    })
}

/// Check that every tensor variable resolves for `backend`. Runs before any
/// decoding so a gap in the table fails at startup.
pub fn validate_catalog(backend: BackendKind, levels: PressureLevels) -> PrepResult<()> {
    for (kind, names) in [
        (TensorKind::Surface, &SURFACE_VARIABLES[..]),
        (TensorKind::Upper, &UPPER_VARIABLES[..]),
    ] {
        for name in names {
            let spec = lookup(name, backend, levels)?;
            if spec.tensor != kind {
                return Err(PrepError::config(
                    Component::Catalog,
                    format!("variable '{}' is catalogued for the wrong tensor", name),
                ));
            }
            // Tensors stack fields as (level, latitude, longitude).
            if spec.axis_order != CANONICAL_AXES {
                return Err(PrepError::config(
                    Component::Catalog,
                    format!("variable '{}' has axis order {:?}", name, spec.axis_order),
                ));
            }
        }
    }
    Ok(())
}

/// The resolved catalog for one run.
#[derive(Debug, Clone)]
pub struct Catalog {
    surface: TensorSpec,
    upper: TensorSpec,
}

impl Catalog {
    pub fn build(backend: BackendKind, levels: PressureLevels) -> PrepResult<Self> {
        validate_catalog(backend, levels)?;

        let resolve = |names: &[&str]| -> PrepResult<Vec<VariableSpec>> {
            names.iter().map(|n| lookup(n, backend, levels)).collect()
        };

        Ok(Self {
            surface: TensorSpec {
                kind: TensorKind::Surface,
                variables: resolve(&SURFACE_VARIABLES)?,
            },
            upper: TensorSpec {
                kind: TensorKind::Upper,
                variables: resolve(&UPPER_VARIABLES)?,
            },
        })
    }

    pub fn surface(&self) -> &TensorSpec {
        &self.surface
    }

    pub fn upper(&self) -> &TensorSpec {
        &self.upper
    }

    /// Both tensors, surface first.
    pub fn tensors(&self) -> [&TensorSpec; 2] {
        [&self.surface, &self.upper]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_total_for_both_backends() {
        for backend in BackendKind::ALL {
            for levels in [PressureLevels::L13, PressureLevels::L37] {
                validate_catalog(backend, levels).unwrap();
                let catalog = Catalog::build(backend, levels).unwrap();
                assert_eq!(catalog.surface().names(), SURFACE_VARIABLES);
                assert_eq!(catalog.upper().names(), UPPER_VARIABLES);
            }
        }
    }

    #[test]
    fn test_every_spec_uses_canonical_axes() {
        for backend in BackendKind::ALL {
            let catalog = Catalog::build(backend, PressureLevels::L37).unwrap();
            for spec in catalog.surface().variables.iter().chain(&catalog.upper().variables) {
                assert_eq!(spec.axis_order, CANONICAL_AXES, "{}", spec.name);
            }
        }
    }

    #[test]
    fn test_in_process_keys() {
        let msl = lookup("msl", BackendKind::InProcess, PressureLevels::L13).unwrap();
        assert_eq!(
            msl.key,
            LookupKey::Grib {
                short_name: "prmsl",
                type_of_level: "meanSea"
            }
        );
        assert_eq!(msl.levels, LevelSelection::Single(0.0));

        let t2m = lookup("t2m", BackendKind::InProcess, PressureLevels::L13).unwrap();
        assert_eq!(t2m.levels, LevelSelection::Single(2.0));
    }

    #[test]
    fn test_external_keys() {
        let u10 = lookup("u10", BackendKind::External, PressureLevels::L13).unwrap();
        assert_eq!(
            u10.key,
            LookupKey::Wgrib2 {
                variable_match: ":UGRD:".to_string(),
                level_match: ":10 m above ground:".to_string(),
                netcdf_name: "UGRD_10maboveground".to_string(),
            }
        );

        let msl = lookup("msl", BackendKind::External, PressureLevels::L13).unwrap();
        match msl.key {
            LookupKey::Wgrib2 { netcdf_name, .. } => assert_eq!(netcdf_name, "PRMSL_meansealevel"),
            other => panic!("unexpected key {:?}", other),
        }

        let z = lookup("z", BackendKind::External, PressureLevels::L13).unwrap();
        match z.key {
            LookupKey::Wgrib2 {
                level_match,
                netcdf_name,
                ..
            } => {
                assert_eq!(
                    level_match,
                    ":(1000|925|850|700|600|500|400|300|250|200|150|100|50) mb:"
                );
                assert_eq!(netcdf_name, "HGT");
            }
            other => panic!("unexpected key {:?}", other),
        }
    }

    #[test]
    fn test_only_geopotential_is_scaled() {
        let catalog = Catalog::build(BackendKind::InProcess, PressureLevels::L13).unwrap();
        for tensor in catalog.tensors() {
            for var in &tensor.variables {
                let expected = if var.name == "z" { STANDARD_GRAVITY } else { 1.0 };
                assert_eq!(var.conversion_factor, expected, "{}", var.name);
            }
        }
    }

    #[test]
    fn test_pressure_levels() {
        assert_eq!(PressureLevels::L13.levels()[0], 1000);
        assert_eq!(PressureLevels::L13.levels()[12], 50);
        assert_eq!(PressureLevels::L37.count(), 37);
        assert_eq!(*PressureLevels::L37.levels().last().unwrap(), 1);
        assert!(PressureLevels::L37.levels().windows(2).all(|w| w[0] > w[1]));
        assert!(PressureLevels::try_from(25).is_err());
        assert_eq!("37".parse::<PressureLevels>().unwrap(), PressureLevels::L37);
    }

    #[test]
    fn test_backend_aliases() {
        assert_eq!("wgrib2".parse::<BackendKind>().unwrap(), BackendKind::External);
        assert_eq!("pygrib".parse::<BackendKind>().unwrap(), BackendKind::InProcess);
        assert_eq!("In-Process".parse::<BackendKind>().unwrap(), BackendKind::InProcess);
        assert!("cfgrib".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_tensor_shapes() {
        let grid = GridGeometry::global_quarter_degree();
        let catalog = Catalog::build(BackendKind::External, PressureLevels::L13).unwrap();
        assert_eq!(catalog.surface().shape(&grid), vec![4, 721, 1440]);
        assert_eq!(catalog.upper().shape(&grid), vec![5, 13, 721, 1440]);

        let catalog = Catalog::build(BackendKind::External, PressureLevels::L37).unwrap();
        assert_eq!(catalog.upper().shape(&grid), vec![5, 37, 721, 1440]);
    }

    #[test]
    fn test_unknown_variable() {
        let err = lookup("sst", BackendKind::InProcess, PressureLevels::L13).unwrap_err();
        assert!(matches!(err, PrepError::Config { component: Component::Catalog, .. }));
    }

    #[test]
    fn test_wgrib2_variable_name() {
        assert_eq!(wgrib2_variable_name("TMP", Some("2 m above ground")), "TMP_2maboveground");
        assert_eq!(wgrib2_variable_name("HGT", None), "HGT");
    }
}
