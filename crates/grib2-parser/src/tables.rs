//! GRIB2 parameter and level lookup tables.
//!
//! Translates GRIB2 numeric codes into the two naming schemes downstream
//! tools use: wgrib2 abbreviations (`TMP`, `UGRD`, "500 mb") and eccodes
//! short names (`t`, `10u`, `isobaricInhPa`).

use std::collections::HashMap;

/// Lookup key for parameter: (discipline, category, number)
pub type ParamKey = (u8, u8, u8);

/// Level description - either static text or a template with placeholders
#[derive(Debug, Clone)]
pub enum LevelDescription {
    /// Static description (e.g., "surface", "mean sea level")
    Static(String),
    /// Template with `{value}` / `{value_mb}` placeholders
    Template(String),
}

impl LevelDescription {
    /// Format the level description, substituting placeholders if it's a template.
    ///
    /// - `{value}` - level value in native units (Pa for isobaric, m for heights)
    /// - `{value_mb}` - value converted from Pa to mb
    pub fn format(&self, value: f64) -> String {
        match self {
            LevelDescription::Static(s) => s.clone(),
            LevelDescription::Template(t) => t
                .replace("{value}", &format_number(value))
                .replace("{value_mb}", &format_number(value / 100.0)),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// A short name that applies only on one specific fixed surface,
/// e.g. `2t` for temperature at 2 m above ground.
#[derive(Debug, Clone)]
struct SurfaceOverride {
    surface_type: u8,
    value: f64,
    short_name: String,
}

/// GRIB2 parameter and level lookup tables.
///
/// Passed to the GRIB2 reader so messages can report readable names.
#[derive(Debug, Clone, Default)]
pub struct Grib2Tables {
    /// (discipline, category, number) -> wgrib2 abbreviation (e.g., "TMP")
    parameters: HashMap<ParamKey, String>,
    /// (discipline, category, number) -> eccodes short name (e.g., "t")
    short_names: HashMap<ParamKey, String>,
    overrides: HashMap<ParamKey, Vec<SurfaceOverride>>,
    /// level_type -> description pattern
    levels: HashMap<u8, LevelDescription>,
    /// level_type -> eccodes typeOfLevel
    level_names: HashMap<u8, String>,
}

impl Grib2Tables {
    /// Create empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables covering the NCEP GFS/GDAS analysis parameters.
    pub fn gfs() -> Self {
        let mut tables = Self::new();

        let params: [(ParamKey, &str, &str); 12] = [
            ((0, 0, 0), "TMP", "t"),
            ((0, 1, 0), "SPFH", "q"),
            ((0, 1, 1), "RH", "r"),
            ((0, 2, 2), "UGRD", "u"),
            ((0, 2, 3), "VGRD", "v"),
            ((0, 2, 8), "VVEL", "w"),
            ((0, 2, 22), "GUST", "gust"),
            ((0, 3, 0), "PRES", "pres"),
            ((0, 3, 1), "PRMSL", "prmsl"),
            ((0, 3, 5), "HGT", "gh"),
            ((0, 1, 8), "APCP", "tp"),
            ((0, 19, 0), "VIS", "vis"),
        ];
        for ((d, c, n), abbrev, short) in params {
            tables.add_parameter(d, c, n, abbrev.to_string());
            tables.add_short_name(d, c, n, short.to_string());
        }

        tables.add_surface_override((0, 0, 0), 103, 2.0, "2t".to_string());
        tables.add_surface_override((0, 2, 2), 103, 10.0, "10u".to_string());
        tables.add_surface_override((0, 2, 3), 103, 10.0, "10v".to_string());
        tables.add_surface_override((0, 3, 0), 1, 0.0, "sp".to_string());

        let levels: [(u8, &str, LevelDescription); 6] = [
            (1, "surface", LevelDescription::Static("surface".to_string())),
            (
                100,
                "isobaricInhPa",
                LevelDescription::Template("{value_mb} mb".to_string()),
            ),
            (
                101,
                "meanSea",
                LevelDescription::Static("mean sea level".to_string()),
            ),
            (
                103,
                "heightAboveGround",
                LevelDescription::Template("{value} m above ground".to_string()),
            ),
            (
                200,
                "atmosphere",
                LevelDescription::Static("entire atmosphere".to_string()),
            ),
            (
                220,
                "planetaryBoundaryLayer",
                LevelDescription::Static("planetary boundary layer".to_string()),
            ),
        ];
        for (level_type, name, description) in levels {
            tables.add_level(level_type, description);
            tables.add_level_name(level_type, name.to_string());
        }

        tables
    }

    /// Add a wgrib2 abbreviation for a parameter
    pub fn add_parameter(&mut self, discipline: u8, category: u8, number: u8, name: String) {
        self.parameters.insert((discipline, category, number), name);
    }

    /// Add an eccodes short name for a parameter
    pub fn add_short_name(&mut self, discipline: u8, category: u8, number: u8, name: String) {
        self.short_names.insert((discipline, category, number), name);
    }

    /// Add a short name that replaces the generic one on a single fixed surface.
    pub fn add_surface_override(
        &mut self,
        key: ParamKey,
        surface_type: u8,
        value: f64,
        short_name: String,
    ) {
        self.overrides.entry(key).or_default().push(SurfaceOverride {
            surface_type,
            value,
            short_name,
        });
    }

    /// Add a level description mapping
    pub fn add_level(&mut self, level_type: u8, description: LevelDescription) {
        self.levels.insert(level_type, description);
    }

    /// Add an eccodes typeOfLevel name for a level type
    pub fn add_level_name(&mut self, level_type: u8, name: String) {
        self.level_names.insert(level_type, name);
    }

    /// Look up the wgrib2 abbreviation by GRIB2 codes.
    ///
    /// Returns "P{discipline}_{category}_{number}" if not found.
    pub fn get_parameter_name(&self, discipline: u8, category: u8, number: u8) -> String {
        self.parameters
            .get(&(discipline, category, number))
            .cloned()
            .unwrap_or_else(|| format!("P{}_{}_{}", discipline, category, number))
    }

    /// Look up the eccodes short name, honouring surface-specific names.
    ///
    /// `level_value` is in the surface's native units. Returns "unknown" when
    /// the parameter is not in the table.
    pub fn get_short_name(
        &self,
        key: ParamKey,
        surface_type: u8,
        level_value: f64,
    ) -> String {
        if let Some(overrides) = self.overrides.get(&key) {
            if let Some(o) = overrides
                .iter()
                .find(|o| o.surface_type == surface_type && (o.value - level_value).abs() < 1e-6)
            {
                return o.short_name.clone();
            }
        }

        self.short_names
            .get(&key)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Look up level description by type code and value.
    ///
    /// Returns "Level type {type} value {value}" if not found.
    pub fn get_level_description(&self, level_type: u8, level_value: f64) -> String {
        match self.levels.get(&level_type) {
            Some(desc) => desc.format(level_value),
            None => format!(
                "Level type {} value {}",
                level_type,
                format_number(level_value)
            ),
        }
    }

    /// Look up the eccodes typeOfLevel name, or "unknown".
    pub fn get_level_name(&self, level_type: u8) -> String {
        self.level_names
            .get(&level_type)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Get the number of parameters in the table
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Get the number of level types in the table
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Check if the tables are empty
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.levels.is_empty()
    }
}
