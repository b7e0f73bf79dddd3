//! Tensor assembly and `.npy` persistence.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::{stack, ArrayD, ArrayView, Axis, IxDyn, ShapeBuilder};
use npyz::WriterBuilder;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::catalog::{TensorKind, TensorSpec};
use crate::error::{Component, PrepError, PrepResult};
use crate::field::{CanonicalField, GridGeometry};

/// One assembled output tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    pub kind: TensorKind,
    pub values: ArrayD<f32>,
}

impl OutputTensor {
    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn file_name(&self) -> &'static str {
        self.kind.file_name()
    }
}

/// Stack `fields` on a new leading axis in the order of `spec.variables`.
///
/// Fields are matched by canonical name; the order they are passed in does
/// not matter.
pub fn assemble(
    spec: &TensorSpec,
    grid: &GridGeometry,
    fields: &[CanonicalField],
) -> PrepResult<OutputTensor> {
    let expected = spec.shape(grid);
    let mut views: Vec<ArrayView<f32, IxDyn>> = Vec::with_capacity(spec.variables.len());

    for variable in &spec.variables {
        let mut matches = fields.iter().filter(|f| f.name == variable.name);
        let field = matches.next().ok_or_else(|| PrepError::VariableNotFound {
            component: Component::Assembler,
            variable: variable.name.to_string(),
            key: variable.key.to_string(),
            levels: variable.levels.to_string(),
        })?;
        if matches.next().is_some() {
            return Err(PrepError::config(
                Component::Assembler,
                format!("variable '{}' supplied more than once", variable.name),
            ));
        }

        let [nlev, nlat, nlon] = field.shape();
        let view = match spec.kind {
            TensorKind::Surface if nlev == 1 => field.values.index_axis(Axis(0), 0).into_dyn(),
            TensorKind::Upper => field.values.view().into_dyn(),
            TensorKind::Surface => {
                return Err(shape_mismatch(spec, expected[1..].to_vec(), vec![nlev, nlat, nlon]))
            }
        };
        if view.shape() != &expected[1..] {
            return Err(shape_mismatch(spec, expected[1..].to_vec(), view.shape().to_vec()));
        }
        views.push(view);
    }

    let values = stack(Axis(0), &views)
        .map_err(|_| shape_mismatch(spec, expected.clone(), Vec::new()))?;

    if values.shape() != expected.as_slice() {
        return Err(shape_mismatch(spec, expected, values.shape().to_vec()));
    }

    Ok(OutputTensor {
        kind: spec.kind,
        values,
    })
}

fn shape_mismatch(spec: &TensorSpec, expected: Vec<usize>, found: Vec<usize>) -> PrepError {
    PrepError::ShapeMismatch {
        component: Component::Assembler,
        tensor: spec.kind.as_str().to_string(),
        expected,
        found,
    }
}

/// Write every tensor into `output_dir` under its fixed file name.
///
/// All tensors are first serialized to temporary files in `output_dir`; the
/// final names appear only once every file has been written. If a rename
/// fails, the files already renamed are removed again.
pub fn persist(tensors: &[OutputTensor], output_dir: &Path) -> PrepResult<Vec<PathBuf>> {
    fs::create_dir_all(output_dir).map_err(|e| PrepError::io(Component::Assembler, output_dir, e))?;

    let mut staged = Vec::with_capacity(tensors.len());
    for tensor in tensors {
        let tmp = tempfile::Builder::new()
            .prefix(&format!(".{}.", tensor.file_name()))
            .suffix(".tmp")
            .tempfile_in(output_dir)
            .map_err(|e| PrepError::io(Component::Assembler, output_dir, e))?;
        write_npy(tmp.as_file(), &tensor.values)
            .map_err(|e| PrepError::io(Component::Assembler, tmp.path(), e))?;
        staged.push((tmp, output_dir.join(tensor.file_name())));
    }

    let mut written: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for (tmp, target) in staged {
        if let Err(e) = tmp.persist(&target) {
            for path in &written {
                if let Err(err) = fs::remove_file(path) {
                    warn!(path = %path.display(), error = %err, "Failed to roll back output file");
                }
            }
            return Err(PrepError::io(Component::Assembler, &target, e.error));
        }
        written.push(target);
    }

    for (tensor, path) in tensors.iter().zip(&written) {
        info!(
            tensor = tensor.kind.as_str(),
            shape = ?tensor.shape(),
            path = %path.display(),
            "Wrote tensor"
        );
    }

    Ok(written)
}

/// Serialize as NumPy `.npy`: little-endian `<f4`, C order.
fn write_npy(file: &fs::File, values: &ArrayD<f32>) -> std::io::Result<()> {
    let shape: Vec<u64> = values.shape().iter().map(|d| *d as u64).collect();
    let mut out = BufWriter::new(file);
    {
        let mut writer = npyz::WriteOptions::<f32>::new()
            .default_dtype()
            .shape(&shape)
            .writer(&mut out)
            .begin_nd()?;
        // Logical iteration order is row-major for any memory layout.
        for value in values.iter() {
            writer.push(value)?;
        }
        writer.finish()?;
    }
    out.flush()?;
    file.sync_all()
}

/// Read an `f32` `.npy` file.
pub fn load_npy(path: &Path) -> std::io::Result<ArrayD<f32>> {
    let bytes = fs::read(path)?;
    let reader = npyz::NpyFile::new(&bytes[..])?;
    let shape: Vec<usize> = reader.shape().iter().map(|d| *d as usize).collect();
    let fortran = reader.order() == npyz::Order::Fortran;
    let data = reader.into_vec::<f32>()?;

    ArrayD::from_shape_vec(shape.set_f(fortran), data)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BackendKind, Catalog, PressureLevels};
    use crate::field::DeclaredGrid;
    use ndarray::Array3;
    use test_utils::temp_test_dir;

    fn grid() -> GridGeometry {
        GridGeometry::global(45.0).unwrap()
    }

    fn field(name: &str, nlev: usize, value: f32) -> CanonicalField {
        let grid = grid();
        CanonicalField {
            name: name.to_string(),
            values: Array3::from_elem((nlev, grid.nlat, grid.nlon), value),
            levels: None,
            grid: DeclaredGrid {
                first_latitude: 90.0,
                last_latitude: -90.0,
                first_longitude: 0.0,
                last_longitude: grid.last_longitude(),
            },
            converted: true,
        }
    }

    fn catalog() -> Catalog {
        Catalog::build(BackendKind::InProcess, PressureLevels::L13).unwrap()
    }

    #[test]
    fn test_surface_order_follows_spec_not_arguments() {
        let catalog = catalog();
        let fields = vec![
            field("t2m", 1, 4.0),
            field("msl", 1, 1.0),
            field("v10", 1, 3.0),
            field("u10", 1, 2.0),
        ];
        let tensor = assemble(catalog.surface(), &grid(), &fields).unwrap();
        assert_eq!(tensor.shape(), &[4, 5, 8]);
        for (i, expected) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            assert_eq!(tensor.values[[i, 2, 3]], *expected);
        }
    }

    #[test]
    fn test_upper_shape() {
        let catalog = catalog();
        let fields: Vec<CanonicalField> = ["z", "q", "t", "u", "v"]
            .iter()
            .map(|n| field(n, 13, 0.0))
            .collect();
        let tensor = assemble(catalog.upper(), &grid(), &fields).unwrap();
        assert_eq!(tensor.shape(), &[5, 13, 5, 8]);
    }

    #[test]
    fn test_missing_field() {
        let catalog = catalog();
        let fields = vec![field("msl", 1, 0.0), field("u10", 1, 0.0), field("v10", 1, 0.0)];
        let err = assemble(catalog.surface(), &grid(), &fields).unwrap_err();
        assert_eq!(err.variable(), Some("t2m"));
    }

    #[test]
    fn test_wrong_level_count_is_shape_mismatch() {
        let catalog = catalog();
        let mut fields: Vec<CanonicalField> = ["z", "q", "t", "u", "v"]
            .iter()
            .map(|n| field(n, 13, 0.0))
            .collect();
        fields[2] = field("t", 12, 0.0);
        let err = assemble(catalog.upper(), &grid(), &fields).unwrap_err();
        assert!(matches!(err, PrepError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_persist_and_load() {
        let dir = temp_test_dir();
        let tensor = OutputTensor {
            kind: TensorKind::Surface,
            values: ArrayD::from_shape_fn(IxDyn(&[2, 3, 4]), |ix| (ix[0] * 100 + ix[1] * 10 + ix[2]) as f32),
        };
        let paths = persist(std::slice::from_ref(&tensor), dir.path()).unwrap();
        assert_eq!(paths, vec![dir.path().join("input_surface.npy")]);

        let bytes = fs::read(&paths[0]).unwrap();
        assert_eq!(&bytes[..6], b"\x93NUMPY");
        assert!(String::from_utf8_lossy(&bytes[..128]).contains("'<f4'"));

        let loaded = load_npy(&paths[0]).unwrap();
        assert_eq!(loaded, tensor.values);

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_persist_rolls_back_on_failure() {
        let dir = temp_test_dir();
        // A directory occupying the second target name makes its rename fail.
        fs::create_dir(dir.path().join("input_upper.npy")).unwrap();
        fs::write(dir.path().join("input_upper.npy").join("keep"), b"x").unwrap();

        let tensors = vec![
            OutputTensor {
                kind: TensorKind::Surface,
                values: ArrayD::zeros(IxDyn(&[1, 2, 2])),
            },
            OutputTensor {
                kind: TensorKind::Upper,
                values: ArrayD::zeros(IxDyn(&[1, 1, 2, 2])),
            },
        ];
        assert!(persist(&tensors, dir.path()).is_err());
        assert!(!dir.path().join("input_surface.npy").exists());
    }
}
