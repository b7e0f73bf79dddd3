//! Variable extraction: resolve one catalogued variable against a dataset.

use ndarray::{stack, ArrayView, Axis, IxDyn};
use tracing::debug;

use crate::backend::{BackendError, DatasetHandle};
use crate::catalog::{BackendKind, VariableSpec};
use crate::error::{Component, PrepError, PrepResult};
use crate::field::{AxisKind, RawField};

/// Read `spec` from `handle` as a single raw field.
///
/// Single-level variables must match exactly one 2-D field. Multi-level
/// variables are either served pre-stacked by the backend or stacked here in
/// the order the backend returned them; level order is fixed later from the
/// per-level metadata.
pub fn extract(
    handle: &mut dyn DatasetHandle,
    spec: &VariableSpec,
    backend: BackendKind,
) -> PrepResult<RawField> {
    let fields = handle
        .read(&spec.key, &spec.levels)
        .map_err(|e| backend_error(e, spec, backend))?;

    if fields.is_empty() {
        return Err(PrepError::VariableNotFound {
            component: Component::Extractor,
            variable: spec.name.to_string(),
            key: spec.key.to_string(),
            levels: spec.levels.to_string(),
        });
    }

    let expected = spec.level_count();

    if !spec.is_multi_level() {
        if fields.len() != 1 {
            return Err(level_count_mismatch(spec, fields.len()));
        }
        let field = fields.into_iter().next().ok_or_else(|| level_count_mismatch(spec, 0))?;
        if let Some(level_axis) = field.axis_index(AxisKind::Level) {
            let found = field.shape()[level_axis];
            if found != 1 {
                return Err(level_count_mismatch(spec, found));
            }
        }
        return Ok(field);
    }

    // A single field that already carries a level axis.
    if fields.len() == 1 {
        if let Some(level_axis) = fields[0].axis_index(AxisKind::Level) {
            let found = fields[0].shape()[level_axis];
            if found != expected {
                return Err(level_count_mismatch(spec, found));
            }
            debug!(variable = spec.name, levels = found, "Using pre-stacked field");
            return fields.into_iter().next().ok_or_else(|| level_count_mismatch(spec, 0));
        }
    }

    if fields.len() != expected {
        return Err(level_count_mismatch(spec, fields.len()));
    }

    stack_levels(fields, spec)
}

/// Stack 2-D fields along a new leading level axis, keeping their order.
fn stack_levels(fields: Vec<RawField>, spec: &VariableSpec) -> PrepResult<RawField> {
    let first = &fields[0];
    let mut levels = Vec::with_capacity(fields.len());

    for field in &fields {
        if field.axes != first.axes || field.shape() != first.shape() || field.grid != first.grid {
            return Err(PrepError::UnsupportedGridResolution {
                component: Component::Extractor,
                variable: spec.name.to_string(),
                reason: format!(
                    "level fields disagree on layout: {:?} {:?} vs {:?} {:?}",
                    first.axes,
                    first.shape(),
                    field.axes,
                    field.shape()
                ),
            });
        }
        match field.levels.as_deref() {
            Some([pressure]) => levels.push(*pressure),
            _ => {
                return Err(PrepError::LevelMismatch {
                    component: Component::Extractor,
                    variable: spec.name.to_string(),
                    expected: spec.declared_pressures().unwrap_or_default(),
                    found: field.levels.clone().unwrap_or_default(),
                })
            }
        }
    }

    let views: Vec<ArrayView<f32, IxDyn>> = fields.iter().map(|f| f.values.view()).collect();
    let values = stack(Axis(0), &views).map_err(|e| PrepError::UnsupportedGridResolution {
        component: Component::Extractor,
        variable: spec.name.to_string(),
        reason: e.to_string(),
    })?;

    let mut axes = Vec::with_capacity(first.axes.len() + 1);
    axes.push(AxisKind::Level);
    axes.extend(first.axes.iter().copied());

    debug!(variable = spec.name, levels = ?levels, "Stacked level fields");

    Ok(RawField {
        source: first.source.clone(),
        values,
        axes,
        grid: first.grid,
        levels: Some(levels),
        converted: fields.iter().all(|f| f.converted),
    })
}

fn level_count_mismatch(spec: &VariableSpec, found: usize) -> PrepError {
    PrepError::LevelCountMismatch {
        component: Component::Extractor,
        variable: spec.name.to_string(),
        expected: spec.level_count(),
        found,
    }
}

fn backend_error(err: BackendError, spec: &VariableSpec, backend: BackendKind) -> PrepError {
    PrepError::BackendExecution {
        component: Component::Backend,
        backend: backend.to_string(),
        variable: spec.name.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendResult;
    use crate::catalog::{lookup, LevelSelection, LookupKey, PressureLevels};
    use crate::field::DeclaredGrid;
    use chrono::{DateTime, Utc};
    use ndarray::ArrayD;

    /// Serves a fixed list of fields for every lookup.
    struct Canned(Vec<RawField>);

    impl DatasetHandle for Canned {
        fn read(&mut self, _: &LookupKey, _: &LevelSelection) -> BackendResult<Vec<RawField>> {
            Ok(self.0.clone())
        }

        fn reference_time(&self) -> Option<DateTime<Utc>> {
            None
        }
    }

    struct Failing;

    impl DatasetHandle for Failing {
        fn read(&mut self, _: &LookupKey, _: &LevelSelection) -> BackendResult<Vec<RawField>> {
            Err(BackendError::Execution("exit status 1".to_string()))
        }

        fn reference_time(&self) -> Option<DateTime<Utc>> {
            None
        }
    }

    fn grid() -> DeclaredGrid {
        DeclaredGrid {
            first_latitude: 90.0,
            last_latitude: -90.0,
            first_longitude: 0.0,
            last_longitude: 270.0,
        }
    }

    fn field_2d(value: f32, level: Option<f64>) -> RawField {
        RawField {
            source: "test".to_string(),
            values: ArrayD::from_elem(IxDyn(&[3, 4]), value),
            axes: vec![AxisKind::Latitude, AxisKind::Longitude],
            grid: grid(),
            levels: level.map(|p| vec![p]),
            converted: false,
        }
    }

    fn upper_spec() -> VariableSpec {
        lookup("t", BackendKind::InProcess, PressureLevels::L13).unwrap()
    }

    #[test]
    fn test_single_level() {
        let spec = lookup("t2m", BackendKind::InProcess, PressureLevels::L13).unwrap();
        let mut handle = Canned(vec![field_2d(280.0, None)]);
        let field = extract(&mut handle, &spec, BackendKind::InProcess).unwrap();
        assert_eq!(field.shape(), &[3, 4]);
    }

    #[test]
    fn test_single_level_with_two_matches() {
        let spec = lookup("t2m", BackendKind::InProcess, PressureLevels::L13).unwrap();
        let mut handle = Canned(vec![field_2d(280.0, None), field_2d(281.0, None)]);
        let err = extract(&mut handle, &spec, BackendKind::InProcess).unwrap_err();
        assert!(matches!(err, PrepError::LevelCountMismatch { expected: 1, found: 2, .. }));
    }

    #[test]
    fn test_zero_matches() {
        let spec = lookup("msl", BackendKind::External, PressureLevels::L13).unwrap();
        let err = extract(&mut Canned(vec![]), &spec, BackendKind::External).unwrap_err();
        match err {
            PrepError::VariableNotFound { variable, key, .. } => {
                assert_eq!(variable, "msl");
                assert!(key.contains(":PRMSL:"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_stacks_in_decoder_order() {
        let spec = upper_spec();
        let fields: Vec<RawField> = PressureLevels::L13
            .levels()
            .iter()
            .rev()
            .map(|p| field_2d(*p as f32, Some(*p as f64)))
            .collect();
        let field = extract(&mut Canned(fields), &spec, BackendKind::InProcess).unwrap();

        assert_eq!(field.shape(), &[13, 3, 4]);
        assert_eq!(field.axes[0], AxisKind::Level);
        assert_eq!(field.levels.as_ref().unwrap()[0], 50.0);
        assert_eq!(field.values[[0, 0, 0]], 50.0);
        assert_eq!(field.values[[12, 2, 3]], 1000.0);
    }

    #[test]
    fn test_missing_level() {
        let spec = upper_spec();
        let fields: Vec<RawField> = PressureLevels::L13.levels()[1..]
            .iter()
            .map(|p| field_2d(0.0, Some(*p as f64)))
            .collect();
        let err = extract(&mut Canned(fields), &spec, BackendKind::InProcess).unwrap_err();
        assert!(matches!(err, PrepError::LevelCountMismatch { expected: 13, found: 12, .. }));
    }

    #[test]
    fn test_pre_stacked_field() {
        let spec = upper_spec();
        let field = RawField {
            source: "TMP".to_string(),
            values: ArrayD::zeros(IxDyn(&[13, 3, 4])),
            axes: vec![AxisKind::Level, AxisKind::Latitude, AxisKind::Longitude],
            grid: grid(),
            levels: Some(PressureLevels::L13.levels().iter().map(|p| *p as f64).collect()),
            converted: false,
        };
        let out = extract(&mut Canned(vec![field]), &spec, BackendKind::External).unwrap();
        assert_eq!(out.shape(), &[13, 3, 4]);
    }

    #[test]
    fn test_backend_failure_names_variable() {
        let spec = upper_spec();
        let err = extract(&mut Failing, &spec, BackendKind::External).unwrap_err();
        assert_eq!(err.component(), Component::Backend);
        assert_eq!(err.variable(), Some("t"));
        assert!(matches!(err, PrepError::BackendExecution { .. }));
    }
}
