//! Run driver: decode once, extract and normalize every catalogued variable
//! in order, assemble both tensors, then write them.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::assembler::{assemble, persist, OutputTensor};
use crate::backend::{self, Backend};
use crate::catalog::{BackendKind, Catalog, TensorKind};
use crate::config::PrepConfig;
use crate::error::{Component, PrepError, PrepResult};
use crate::extractor::extract;
use crate::normalizer::normalize;

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub analysis_time: Option<DateTime<Utc>>,
    pub backend: BackendKind,
    pub outputs: Vec<PathBuf>,
    pub surface_shape: Vec<usize>,
    pub upper_shape: Vec<usize>,
    pub duration_ms: u128,
}

pub struct Pipeline {
    config: PrepConfig,
    catalog: Catalog,
    backend: Box<dyn Backend>,
}

impl Pipeline {
    /// Validate `config` and build the catalog and backend it selects.
    pub fn new(config: PrepConfig) -> PrepResult<Self> {
        let backend = backend::from_config(&config);
        Self::with_backend(config, backend)
    }

    /// Use a specific backend; the catalog is resolved for its kind.
    pub fn with_backend(config: PrepConfig, backend: Box<dyn Backend>) -> PrepResult<Self> {
        config.validate()?;
        let catalog = Catalog::build(backend.kind(), config.pressure_levels)?;
        Ok(Self {
            config,
            catalog,
            backend,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &PrepConfig {
        &self.config
    }

    /// Build both tensors from `input` without writing anything.
    #[instrument(skip(self, input), fields(backend = %self.backend.kind(), input = %input.display()))]
    pub fn prepare(&self, input: &Path) -> PrepResult<Vec<OutputTensor>> {
        let kind = self.backend.kind();
        let grid = &self.config.grid;

        let mut handle = self.backend.decode(input).map_err(|e| PrepError::BackendExecution {
            component: Component::Backend,
            backend: kind.to_string(),
            variable: "*".to_string(),
            reason: e.to_string(),
        })?;

        if let (Some(expected), Some(found)) = (self.config.analysis_time, handle.reference_time()) {
            if expected != found {
                warn!(
                    expected = %expected.format("%Y%m%d%H"),
                    found = %found.format("%Y%m%d%H"),
                    "Input reference time differs from requested analysis time"
                );
            }
        }

        let mut tensors = Vec::with_capacity(2);
        for tensor in self.catalog.tensors() {
            let mut fields = Vec::with_capacity(tensor.variables.len());
            for spec in &tensor.variables {
                let raw = extract(&mut *handle, spec, kind)?;
                let field = normalize(raw, spec, grid)?;
                info!(
                    variable = spec.name,
                    tensor = tensor.kind.as_str(),
                    levels = field.shape()[0],
                    "Prepared variable"
                );
                fields.push(field);
            }
            tensors.push(assemble(tensor, grid, &fields)?);
        }

        Ok(tensors)
    }

    /// Prepare both tensors from `input` and write them to the output
    /// directory. Nothing is written unless every variable succeeded.
    #[instrument(skip(self, input), fields(input = %input.display()))]
    pub fn run(&self, input: &Path) -> PrepResult<RunSummary> {
        let run_id = Uuid::new_v4();
        let start = Instant::now();

        info!(
            %run_id,
            backend = %self.backend.kind(),
            levels = self.config.pressure_levels.count(),
            output_dir = %self.config.output_dir.display(),
            "Starting preparation run"
        );

        let tensors = self.prepare(input)?;
        let outputs = persist(&tensors, &self.config.output_dir)?;

        let shape_of = |kind: TensorKind| {
            tensors
                .iter()
                .find(|t| t.kind == kind)
                .map(|t| t.shape().to_vec())
                .unwrap_or_default()
        };

        let summary = RunSummary {
            run_id,
            analysis_time: self.config.analysis_time,
            backend: self.backend.kind(),
            outputs,
            surface_shape: shape_of(TensorKind::Surface),
            upper_shape: shape_of(TensorKind::Upper),
            duration_ms: start.elapsed().as_millis(),
        };

        info!(
            %run_id,
            surface = ?summary.surface_shape,
            upper = ?summary.upper_shape,
            duration_ms = summary.duration_ms as u64,
            "Preparation run complete"
        );

        Ok(summary)
    }
}
