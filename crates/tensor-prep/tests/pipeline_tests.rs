//! End-to-end runs over synthetic GDAS files.

mod common;

use std::fs;
use std::sync::Arc;

use ndarray::Axis;
use tensor_prep::backend::{ExternalBackend, Wgrib2Tool};
use tensor_prep::{
    load_npy, BackendKind, Catalog, Component, GridGeometry, Pipeline, PrepError, PressureLevels,
    TensorKind, STANDARD_GRAVITY,
};
use test_utils::levels::LEVELS_37_FILE_ORDER;
use test_utils::{assert_approx_eq, temp_test_dir, SyntheticGdas, SyntheticVariable};

use common::{backend, config, write_gdas, FakeWgrib2};

const CANONICAL_13: [u32; 13] = [1000, 925, 850, 700, 600, 500, 400, 300, 250, 200, 150, 100, 50];

#[test]
fn test_both_backends_produce_the_same_tensors() {
    let dir = temp_test_dir();
    let gdas = SyntheticGdas::default();
    let input = write_gdas(dir.path(), &gdas);

    let mut outputs = Vec::new();
    for kind in BackendKind::ALL {
        let out = dir.path().join(kind.as_str());
        let pipeline =
            Pipeline::with_backend(config(&out, PressureLevels::L13, kind), backend(kind)).unwrap();
        let summary = pipeline.run(&input).unwrap();
        assert_eq!(summary.surface_shape, vec![4, 37, 72]);
        assert_eq!(summary.upper_shape, vec![5, 13, 37, 72]);
        outputs.push((
            load_npy(&out.join("input_surface.npy")).unwrap(),
            load_npy(&out.join("input_upper.npy")).unwrap(),
        ));
    }

    let (surface_a, upper_a) = &outputs[0];
    let (surface_b, upper_b) = &outputs[1];
    assert_eq!(surface_a.shape(), surface_b.shape());
    assert_eq!(upper_a.shape(), upper_b.shape());
    for (a, b) in surface_a.iter().zip(surface_b.iter()) {
        assert_approx_eq!(*a as f64, *b as f64, 1e-3);
    }
    for (a, b) in upper_a.iter().zip(upper_b.iter()) {
        assert_approx_eq!(*a as f64, *b as f64, 1e-2);
    }
}

#[test]
fn test_values_land_in_canonical_positions() {
    let dir = temp_test_dir();
    let gdas = SyntheticGdas::default();
    let input = write_gdas(dir.path(), &gdas);

    for kind in BackendKind::ALL {
        let pipeline = Pipeline::with_backend(
            config(dir.path(), PressureLevels::L13, kind),
            backend(kind),
        )
        .unwrap();
        let tensors = pipeline.prepare(&input).unwrap();
        let surface = &tensors[0];
        let upper = &tensors[1];
        assert_eq!(surface.kind, TensorKind::Surface);

        // Row 0 is 90N, row 36 is 90S; column 10 is 50E.
        for (i, var) in SyntheticVariable::SURFACE.iter().enumerate() {
            for (ilat, ilon) in [(0, 0), (36, 10), (12, 71)] {
                let expected = gdas.expected(*var, 0, ilat, ilon) as f64;
                let tolerance = expected.abs() * 1e-4 + 1e-3;
                assert_approx_eq!(surface.values[[i, ilat, ilon]] as f64, expected, tolerance);
            }
        }

        // Level 0 is 1000 hPa, level 12 is 50 hPa.
        for (v, var) in SyntheticVariable::UPPER.iter().enumerate() {
            let factor = if *var == SyntheticVariable::Hgt { STANDARD_GRAVITY } else { 1.0 };
            for (l, pressure) in [(0, 1000), (5, 500), (12, 50)] {
                let expected = gdas.expected(*var, pressure, 3, 7) as f64 * factor;
                let tolerance = expected.abs() * 1e-4 + 1e-4;
                assert_approx_eq!(upper.values[[v, l, 3, 7]] as f64, expected, tolerance);
            }
        }
    }
}

#[test]
fn test_geopotential_scaled_exactly_once() {
    let dir = temp_test_dir();
    let gdas = SyntheticGdas::default();
    let input = write_gdas(dir.path(), &gdas);

    let pipeline = Pipeline::with_backend(
        config(dir.path(), PressureLevels::L13, BackendKind::InProcess),
        backend(BackendKind::InProcess),
    )
    .unwrap();
    let upper = &pipeline.prepare(&input).unwrap()[1];

    let height = gdas.expected(SyntheticVariable::Hgt, 500, 0, 0) as f64;
    let value = upper.values[[0, 5, 0, 0]] as f64;
    let ratio = value / height;
    assert!((ratio - STANDARD_GRAVITY).abs() < 1e-3, "ratio {}", ratio);
}

#[test]
fn test_ascending_file_order_yields_descending_pressure() {
    let dir = temp_test_dir();
    // Upper-air levels stored 50 hPa first, as NCEP writes them.
    let gdas = SyntheticGdas::default();
    assert_eq!(gdas.levels[0], 50);
    let input = write_gdas(dir.path(), &gdas);

    for kind in BackendKind::ALL {
        let pipeline = Pipeline::with_backend(
            config(dir.path(), PressureLevels::L13, kind),
            backend(kind),
        )
        .unwrap();
        let upper = &pipeline.prepare(&input).unwrap()[1];
        let temperature = upper.values.index_axis(Axis(0), 2);
        for (l, pressure) in CANONICAL_13.iter().enumerate() {
            let expected = gdas.expected(SyntheticVariable::Tmp, *pressure, 0, 0) as f64;
            assert_approx_eq!(temperature[[l, 0, 0]] as f64, expected, 0.05);
        }
    }
}

#[test]
fn test_37_levels() {
    let dir = temp_test_dir();
    let gdas = SyntheticGdas::default().with_levels(&LEVELS_37_FILE_ORDER);
    let input = write_gdas(dir.path(), &gdas);

    for kind in BackendKind::ALL {
        let out = dir.path().join(kind.as_str());
        let pipeline =
            Pipeline::with_backend(config(&out, PressureLevels::L37, kind), backend(kind)).unwrap();
        let summary = pipeline.run(&input).unwrap();
        assert_eq!(summary.upper_shape, vec![5, 37, 37, 72]);

        let upper = load_npy(&out.join("input_upper.npy")).unwrap();
        assert_eq!(upper.shape(), &[5, 37, 37, 72]);
        let expected = gdas.expected(SyntheticVariable::Tmp, 1, 0, 0) as f64;
        assert_approx_eq!(upper[[2, 36, 0, 0]] as f64, expected, 0.05);
    }
}

#[test]
fn test_missing_variable_writes_nothing() {
    let dir = temp_test_dir();
    let gdas = SyntheticGdas::default().without(SyntheticVariable::Prmsl);
    let input = write_gdas(dir.path(), &gdas);
    let out = dir.path().join("out");

    let tool = Arc::new(FakeWgrib2::default());
    let pipeline = Pipeline::with_backend(
        config(&out, PressureLevels::L13, BackendKind::External),
        Box::new(ExternalBackend::new(tool.clone(), None)),
    )
    .unwrap();

    let err = pipeline.run(&input).unwrap_err();
    match &err {
        PrepError::VariableNotFound { variable, .. } => assert_eq!(variable, "msl"),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.component(), Component::Extractor);
    // msl is the first variable, so the run stopped at the first request.
    assert_eq!(tool.request_count(), 1);
    assert!(!out.join("input_surface.npy").exists());
    assert!(!out.join("input_upper.npy").exists());
}

#[test]
fn test_missing_upper_variable_writes_nothing() {
    let dir = temp_test_dir();
    let gdas = SyntheticGdas::default().without(SyntheticVariable::Vgrd);
    let input = write_gdas(dir.path(), &gdas);
    let out = dir.path().join("out");

    let pipeline = Pipeline::with_backend(
        config(&out, PressureLevels::L13, BackendKind::InProcess),
        backend(BackendKind::InProcess),
    )
    .unwrap();
    let err = pipeline.run(&input).unwrap_err();
    assert_eq!(err.variable(), Some("v"));
    assert!(!out.join("input_surface.npy").exists());
}

#[test]
fn test_duplicate_level_is_level_count_mismatch() {
    let dir = temp_test_dir();
    let gdas = SyntheticGdas::default().with_duplicate_level(500);
    let input = write_gdas(dir.path(), &gdas);

    let pipeline = Pipeline::with_backend(
        config(dir.path(), PressureLevels::L13, BackendKind::InProcess),
        backend(BackendKind::InProcess),
    )
    .unwrap();
    let err = pipeline.prepare(&input).unwrap_err();
    match err {
        PrepError::LevelCountMismatch {
            variable,
            expected,
            found,
            ..
        } => {
            assert_eq!(variable, "z");
            assert_eq!((expected, found), (13, 14));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_failing_tool_is_backend_execution_error() {
    let dir = temp_test_dir();
    let input = write_gdas(dir.path(), &SyntheticGdas::default());
    let out = dir.path().join("out");

    let pipeline = Pipeline::with_backend(
        config(&out, PressureLevels::L13, BackendKind::External),
        Box::new(ExternalBackend::new(Arc::new(Wgrib2Tool::new("false")), None)),
    )
    .unwrap();
    let err = pipeline.run(&input).unwrap_err();
    assert!(matches!(err, PrepError::BackendExecution { .. }));
    assert_eq!(err.variable(), Some("msl"));
    assert!(!out.exists() || fs::read_dir(&out).unwrap().next().is_none());
}

#[test]
fn test_wrong_grid_is_rejected() {
    let dir = temp_test_dir();
    let input = write_gdas(dir.path(), &SyntheticGdas::default());

    let mut cfg = config(dir.path(), PressureLevels::L13, BackendKind::InProcess);
    cfg.grid = GridGeometry::global_quarter_degree();
    let pipeline = Pipeline::with_backend(cfg, backend(BackendKind::InProcess)).unwrap();
    let err = pipeline.prepare(&input).unwrap_err();
    assert!(matches!(err, PrepError::UnsupportedGridResolution { .. }));
    assert_eq!(err.variable(), Some("msl"));
}

#[test]
fn test_missing_input_file() {
    let dir = temp_test_dir();
    for kind in BackendKind::ALL {
        let pipeline = Pipeline::with_backend(
            config(dir.path(), PressureLevels::L13, kind),
            backend(kind),
        )
        .unwrap();
        let err = pipeline.run(&dir.path().join("absent.grib2")).unwrap_err();
        assert!(matches!(err, PrepError::BackendExecution { .. }));
    }
}

#[test]
fn test_default_geometry_shapes() {
    let grid = GridGeometry::default();
    for levels in [PressureLevels::L13, PressureLevels::L37] {
        let catalog = Catalog::build(BackendKind::External, levels).unwrap();
        assert_eq!(catalog.surface().shape(&grid), vec![4, 721, 1440]);
        assert_eq!(
            catalog.upper().shape(&grid),
            vec![5, levels.count(), 721, 1440]
        );
    }
}

#[test]
fn test_real_wgrib2_matches_in_process() {
    if !common::wgrib2_available() {
        eprintln!("Skipping: wgrib2 not found on PATH");
        return;
    }
    let dir = temp_test_dir();
    let input = write_gdas(dir.path(), &SyntheticGdas::default());

    let in_process = Pipeline::with_backend(
        config(dir.path(), PressureLevels::L13, BackendKind::InProcess),
        backend(BackendKind::InProcess),
    )
    .unwrap()
    .prepare(&input)
    .unwrap();
    let external = Pipeline::new(config(dir.path(), PressureLevels::L13, BackendKind::External))
        .unwrap()
        .prepare(&input)
        .unwrap();

    for (a, b) in in_process.iter().zip(&external) {
        assert_eq!(a.shape(), b.shape());
        for (x, y) in a.values.iter().zip(b.values.iter()) {
            assert_approx_eq!(*x as f64, *y as f64, 1e-2);
        }
    }
}
