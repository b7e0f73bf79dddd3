//! NetCDF reader for gridded model output.
//!
//! Reads the NetCDF-4 files that `wgrib2 -netcdf` writes when it converts
//! GRIB2 messages: a data variable plus the `latitude`, `longitude` and
//! optional `lev` coordinate variables describing its axes.
//!
//! Requires the system libnetcdf/HDF5 libraries.

pub mod error;
pub mod native;
pub mod wgrib2;

pub use error::{NetCdfError, NetCdfResult};
pub use native::silence_hdf5_errors;
pub use wgrib2::{read_field, NetCdfAxis, NetCdfField};
