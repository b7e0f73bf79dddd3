//! In-process GRIB2 decoding.
//!
//! The file is read and indexed once; every lookup is served from the index
//! and only matched messages are unpacked.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use grib2_parser::{Grib2Error, Grib2Message, Grib2Reader, Grib2Tables, SURFACE_ISOBARIC};
use ndarray::{ArrayD, IxDyn};
use tracing::{debug, info, warn};

use super::{Backend, BackendError, BackendResult, DatasetHandle};
use crate::catalog::{BackendKind, LevelSelection, LookupKey};
use crate::field::{AxisKind, DeclaredGrid, RawField};

/// Backend decoding GRIB2 with `grib2-parser`.
#[derive(Debug, Clone)]
pub struct InProcessBackend {
    tables: Arc<Grib2Tables>,
}

impl Default for InProcessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessBackend {
    pub fn new() -> Self {
        Self::with_tables(Grib2Tables::gfs())
    }

    pub fn with_tables(tables: Grib2Tables) -> Self {
        Self {
            tables: Arc::new(tables),
        }
    }
}

impl Backend for InProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::InProcess
    }

    fn decode(&self, path: &Path) -> BackendResult<Box<dyn DatasetHandle>> {
        let dataset = InProcessDataset::open(path, self.tables.clone())?;
        Ok(Box::new(dataset))
    }
}

/// Names resolved once per message so selections are plain comparisons.
#[derive(Debug, Clone)]
struct IndexEntry {
    short_name: String,
    type_of_level: String,
    level: f64,
}

/// Every message of one GRIB2 file with its selection keys.
pub struct InProcessDataset {
    messages: Vec<Grib2Message>,
    index: Vec<IndexEntry>,
}

impl InProcessDataset {
    pub fn open(path: &Path, tables: Arc<Grib2Tables>) -> BackendResult<Self> {
        let mut reader = Grib2Reader::open(path, tables)
            .map_err(|e| BackendError::Decode(format!("{}: {}", path.display(), e)))?;
        let mut messages = Vec::new();
        let mut skipped = 0usize;
        loop {
            match reader.next_message() {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => break,
                // Messages outside the supported templates are never catalog fields.
                Err(Grib2Error::Unsupported(reason)) => {
                    warn!(path = %path.display(), reason = %reason, "Skipping unsupported GRIB2 message");
                    skipped += 1;
                }
                Err(e) => {
                    return Err(BackendError::Decode(format!("{}: {}", path.display(), e)));
                }
            }
        }

        if messages.is_empty() {
            return Err(BackendError::Decode(format!(
                "{} contains no GRIB2 messages",
                path.display()
            )));
        }

        let index = messages
            .iter()
            .map(|msg| IndexEntry {
                short_name: msg.short_name(),
                type_of_level: msg.type_of_level(),
                level: msg.level_value(),
            })
            .collect();

        info!(
            path = %path.display(),
            messages = messages.len(),
            skipped,
            bytes = reader.size(),
            "Indexed GRIB2 file"
        );

        Ok(Self { messages, index })
    }
}

impl DatasetHandle for InProcessDataset {
    fn read(&mut self, key: &LookupKey, levels: &LevelSelection) -> BackendResult<Vec<RawField>> {
        let (short_name, type_of_level) = match key {
            LookupKey::Grib {
                short_name,
                type_of_level,
            } => (*short_name, *type_of_level),
            other => return Err(BackendError::UnsupportedKey(other.to_string())),
        };

        let matched: Vec<&Grib2Message> = self
            .index
            .iter()
            .zip(&self.messages)
            .filter(|(entry, _)| {
                entry.short_name == short_name
                    && entry.type_of_level == type_of_level
                    && levels.contains(entry.level)
            })
            .map(|(_, msg)| msg)
            .collect();

        debug!(
            short_name,
            type_of_level,
            levels = %levels,
            matched = matched.len(),
            "Selected GRIB2 messages"
        );

        // Matches are served newest-first: reverse file order.
        matched
            .into_iter()
            .rev()
            .map(|msg| to_raw_field(msg, format!("{}@{}", short_name, type_of_level)))
            .collect()
    }

    fn reference_time(&self) -> Option<DateTime<Utc>> {
        self.messages.first().map(|m| m.reference_time())
    }
}

/// Unpack one message into a labelled 2-D field.
fn to_raw_field(message: &Grib2Message, source: String) -> BackendResult<RawField> {
    let gd = &message.grid_definition;
    let scan = gd.scan_mode();

    if scan.alternating_rows {
        return Err(BackendError::Grid(format!(
            "message at offset {} uses alternating row scanning",
            message.offset
        )));
    }

    let grid = DeclaredGrid {
        first_latitude: gd.first_latitude(),
        last_latitude: gd.last_latitude(),
        first_longitude: gd.first_longitude(),
        last_longitude: gd.last_longitude(),
    };

    if grid.first_latitude != grid.last_latitude && grid.latitude_ascending() != scan.j_positive {
        return Err(BackendError::Grid(format!(
            "message at offset {}: scanning mode contradicts latitudes {} to {}",
            message.offset, grid.first_latitude, grid.last_latitude
        )));
    }
    if grid.first_longitude != grid.last_longitude && grid.longitude_descending() != scan.i_negative {
        return Err(BackendError::Grid(format!(
            "message at offset {}: scanning mode contradicts longitudes {} to {}",
            message.offset, grid.first_longitude, grid.last_longitude
        )));
    }

    let values = message
        .unpack_data()
        .map_err(|e| BackendError::Decode(format!("message at offset {}: {}", message.offset, e)))?;

    let (nj, ni) = message.grid_dims();
    let (shape, axes) = if scan.j_consecutive {
        ([ni as usize, nj as usize], vec![AxisKind::Longitude, AxisKind::Latitude])
    } else {
        ([nj as usize, ni as usize], vec![AxisKind::Latitude, AxisKind::Longitude])
    };

    let values = ArrayD::from_shape_vec(IxDyn(&shape), values)
        .map_err(|e| BackendError::Grid(format!("message at offset {}: {}", message.offset, e)))?;

    let levels = if message.product_definition.first_surface.surface_type == SURFACE_ISOBARIC {
        Some(vec![message.level_value()])
    } else {
        None
    };

    Ok(RawField {
        source,
        values,
        axes,
        grid,
        levels,
        converted: false,
    })
}
