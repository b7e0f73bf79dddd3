//! A single parsed GRIB2 message.

use crate::error::{Grib2Error, Grib2Result};
use crate::sections::{
    self, DataRepresentation, GridDefinition, Identification, Indicator, ProductDefinition,
};
use crate::tables::Grib2Tables;
use crate::unpacking;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Code Table 4.5 surface type for isobaric levels.
pub const SURFACE_ISOBARIC: u8 = 100;

/// Parsed metadata for one GRIB2 message.
///
/// Sections 0-5 are parsed eagerly. The bitmap and packed data stay in the
/// raw message bytes until [`Grib2Message::unpack_data`] is called, so
/// indexing a large file costs a few hundred bytes per message.
#[derive(Debug, Clone)]
pub struct Grib2Message {
    /// Byte offset of the message within its file.
    pub offset: usize,
    pub indicator: Indicator,
    pub identification: Identification,
    pub grid_definition: GridDefinition,
    pub product_definition: ProductDefinition,
    pub data_representation: DataRepresentation,
    raw_data: Bytes,
    tables: Arc<Grib2Tables>,
}

impl Grib2Message {
    /// Parse the metadata sections of a complete message.
    pub fn parse(raw_data: Bytes, offset: usize, tables: Arc<Grib2Tables>) -> Grib2Result<Self> {
        let indicator = sections::parse_indicator(&raw_data)?;
        let identification = sections::parse_identification(&raw_data)?;
        let grid_definition = sections::parse_grid_definition(&raw_data)?;
        let product_definition = sections::parse_product_definition(&raw_data)?;
        let data_representation = sections::parse_data_representation(&raw_data)?;

        Ok(Self {
            offset,
            indicator,
            identification,
            grid_definition,
            product_definition,
            data_representation,
            raw_data,
            tables,
        })
    }

    fn param_key(&self) -> (u8, u8, u8) {
        (
            self.indicator.discipline,
            self.product_definition.parameter_category,
            self.product_definition.parameter_number,
        )
    }

    /// wgrib2-style parameter abbreviation (e.g. "TMP", "HGT").
    pub fn parameter(&self) -> String {
        let (d, c, n) = self.param_key();
        self.tables.get_parameter_name(d, c, n)
    }

    /// eccodes-style short name (e.g. "t", "2t", "gh").
    pub fn short_name(&self) -> String {
        let surface = &self.product_definition.first_surface;
        self.tables
            .get_short_name(self.param_key(), surface.surface_type, surface.value())
    }

    /// eccodes-style level type name (e.g. "isobaricInhPa").
    pub fn type_of_level(&self) -> String {
        self.tables
            .get_level_name(self.product_definition.first_surface.surface_type)
    }

    /// wgrib2-style level description (e.g. "500 mb", "2 m above ground").
    pub fn level(&self) -> String {
        let surface = &self.product_definition.first_surface;
        self.tables
            .get_level_description(surface.surface_type, surface.value())
    }

    /// Level value in selection units: hPa for isobaric surfaces, the
    /// surface's native unit otherwise.
    pub fn level_value(&self) -> f64 {
        let surface = &self.product_definition.first_surface;
        if surface.surface_type == SURFACE_ISOBARIC {
            surface.value() / 100.0
        } else {
            surface.value()
        }
    }

    /// Grid dimensions as (rows, columns) = (Nj, Ni).
    pub fn grid_dims(&self) -> (u32, u32) {
        (
            self.grid_definition.num_points_latitude,
            self.grid_definition.num_points_longitude,
        )
    }

    pub fn reference_time(&self) -> DateTime<Utc> {
        self.identification.reference_time
    }

    /// Size of the raw message in bytes.
    pub fn size(&self) -> usize {
        self.raw_data.len()
    }

    /// Decode all grid point values in file scan order.
    ///
    /// Points masked by the bitmap are returned as NaN.
    pub fn unpack_data(&self) -> Grib2Result<Vec<f32>> {
        let expected = self.grid_definition.num_data_points as usize;
        let dr = &self.data_representation;

        let values = match dr.template_number {
            0 => {
                let bitmap = sections::parse_bitmap(&self.raw_data)?;
                let data = sections::parse_data_section(&self.raw_data)?;
                unpacking::unpack_simple(
                    &data.data,
                    self.grid_definition.num_data_points,
                    dr.bits_per_value,
                    dr.reference_value,
                    dr.binary_scale_factor,
                    dr.decimal_scale_factor,
                    bitmap.as_ref().map(|b| b.data.as_ref()),
                )?
            }
            _ => unpacking::unpack_with_grib_crate(&self.raw_data)?,
        };

        if values.len() != expected {
            return Err(Grib2Error::UnpackingError(format!(
                "decoded {} values, grid has {} points",
                values.len(),
                expected
            )));
        }

        Ok(values.into_iter().map(|v| v.unwrap_or(f32::NAN)).collect())
    }
}
