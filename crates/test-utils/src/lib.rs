//! Shared test utilities for the GDAS preprocessing workspace.
//!
//! - Test data path helpers and skip macros for optional real data files
//! - Synthetic GRIB2 messages and whole GDAS analysis files
//! - NetCDF files in `wgrib2 -netcdf` layout
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod generators;
pub mod grib2_builder;
pub mod netcdf_fixture;
pub mod paths;
pub mod synthetic;

pub use fixtures::*;
pub use generators::*;
pub use grib2_builder::*;
pub use netcdf_fixture::*;
pub use paths::*;
pub use synthetic::*;

/// Skip a test if the required file is not found.
///
/// Real GDAS analysis files are large and not checked in; tests that need
/// one print a skip message and return early when it is absent.
///
/// ```ignore
/// #[test]
/// fn test_real_gdas_file() {
///     let path = require_test_file!("gdas.t00z.pgrb2.0p25.f000");
///     // ...
/// }
/// ```
#[macro_export]
macro_rules! require_test_file {
    ($name:expr) => {{
        match $crate::find_test_file($name) {
            Some(path) => path,
            None => {
                eprintln!(
                    "SKIPPED: Test file '{}' not found. Download test data or set TEST_DATA_DIR.",
                    $name
                );
                return;
            }
        }
    }};
}

/// Approximate floating-point equality.
///
/// ```ignore
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}
