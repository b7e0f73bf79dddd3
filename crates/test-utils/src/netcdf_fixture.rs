//! Writes NetCDF files in the layout `wgrib2 -netcdf` produces.

use std::path::Path;

/// Fill value wgrib2 writes for undefined points.
pub const WGRIB2_FILL_VALUE: f32 = 9.999e20;

/// A single variable to write.
#[derive(Debug, Clone)]
pub struct Wgrib2Variable<'a> {
    pub name: &'a str,
    /// Pressure coordinate values and their units, for `-nc_nlev` output.
    pub levels: Option<(&'a [f64], &'a str)>,
    /// Latitudes in storage order (wgrib2 writes south to north).
    pub latitudes: &'a [f64],
    pub longitudes: &'a [f64],
    /// Row-major values over `([lev,] latitude, longitude)`.
    pub values: &'a [f32],
}

/// Create `path` holding the given variables on shared coordinates.
///
/// All variables must share the same latitude/longitude axes and, when
/// present, the same level axis.
pub fn write_wgrib2_netcdf(path: &Path, variables: &[Wgrib2Variable<'_>]) -> Result<(), netcdf::Error> {
    let mut file = netcdf::create(path)?;

    let Some(first) = variables.first() else {
        return Ok(());
    };

    file.add_dimension("time", 1)?;
    file.add_dimension("latitude", first.latitudes.len())?;
    file.add_dimension("longitude", first.longitudes.len())?;

    {
        let mut time_var = file.add_variable::<f64>("time", &["time"])?;
        time_var.put_attribute("units", "seconds since 1970-01-01 00:00:00.0 0:00")?;
        time_var.put_values(&[1_705_320_000.0f64], ..)?;
    }
    {
        let mut lat_var = file.add_variable::<f64>("latitude", &["latitude"])?;
        lat_var.put_attribute("units", "degrees_north")?;
        lat_var.put_attribute("long_name", "latitude")?;
        lat_var.put_values(first.latitudes, ..)?;
    }
    {
        let mut lon_var = file.add_variable::<f64>("longitude", &["longitude"])?;
        lon_var.put_attribute("units", "degrees_east")?;
        lon_var.put_attribute("long_name", "longitude")?;
        lon_var.put_values(first.longitudes, ..)?;
    }

    if let Some((levels, units)) = first.levels {
        file.add_dimension("lev", levels.len())?;
        let mut lev_var = file.add_variable::<f64>("lev", &["lev"])?;
        lev_var.put_attribute("units", units)?;
        lev_var.put_attribute("long_name", "pressure level")?;
        lev_var.put_values(levels, ..)?;
    }

    for variable in variables {
        let dims: &[&str] = if variable.levels.is_some() {
            &["time", "lev", "latitude", "longitude"]
        } else {
            &["time", "latitude", "longitude"]
        };
        let mut var = file.add_variable::<f32>(variable.name, dims)?;
        var.put_attribute("_FillValue", WGRIB2_FILL_VALUE)?;
        var.put_attribute("short_name", variable.name)?;
        var.put_values(variable.values, ..)?;
    }

    Ok(())
}
