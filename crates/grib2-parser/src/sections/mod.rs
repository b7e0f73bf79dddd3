//! GRIB2 section parsing.
//!
//! Each GRIB2 message consists of numbered sections: an indicator (0),
//! identification (1), optional local use (2), grid definition (3), product
//! definition (4), data representation (5), bitmap (6), data (7) and the
//! `7777` end marker (8). The parsers here take the complete message bytes and
//! locate sections by walking the section length prefixes.

use crate::error::{Grib2Error, Grib2Result};
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};

/// Section 0: Indicator Section (16 bytes)
#[derive(Debug, Clone)]
pub struct Indicator {
    pub discipline: u8,
    pub edition: u8,
    pub message_length: u64,
}

/// Section 1: Identification Section
#[derive(Debug, Clone)]
pub struct Identification {
    pub center: u16,
    pub sub_center: u16,
    pub table_version: u8,
    pub local_table_version: u8,
    pub significance_of_reference_time: u8,
    pub reference_time: DateTime<Utc>,
    pub production_status: u8,
    pub data_type: u8,
}

/// Scanning mode flags (Flag Table 3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanMode {
    /// Points of the first row scan towards decreasing longitude.
    pub i_negative: bool,
    /// Rows scan from south to north.
    pub j_positive: bool,
    /// Adjacent points in memory run along a meridian (column-major).
    pub j_consecutive: bool,
    /// Every other row reverses direction (boustrophedonic).
    pub alternating_rows: bool,
}

impl ScanMode {
    /// Create from the GRIB2 flag byte.
    pub fn from_flags(flag: u8) -> Self {
        Self {
            i_negative: (flag & 0x80) != 0,
            j_positive: (flag & 0x40) != 0,
            j_consecutive: (flag & 0x20) != 0,
            alternating_rows: (flag & 0x10) != 0,
        }
    }
}

/// Section 3: Grid Definition Section.
///
/// Coordinates are kept in microdegrees as encoded by template 3.0.
#[derive(Debug, Clone)]
pub struct GridDefinition {
    pub template_number: u16,
    pub num_data_points: u32,
    pub earth_shape: u8,
    pub num_points_longitude: u32,
    pub num_points_latitude: u32,
    pub first_latitude_microdegrees: i32,
    pub first_longitude_microdegrees: i32,
    pub last_latitude_microdegrees: i32,
    pub last_longitude_microdegrees: i32,
    pub longitude_increment_microdegrees: u32,
    pub latitude_increment_microdegrees: u32,
    pub scanning_mode: u8,
}

impl GridDefinition {
    pub fn scan_mode(&self) -> ScanMode {
        ScanMode::from_flags(self.scanning_mode)
    }

    pub fn first_latitude(&self) -> f64 {
        self.first_latitude_microdegrees as f64 * 1e-6
    }

    pub fn last_latitude(&self) -> f64 {
        self.last_latitude_microdegrees as f64 * 1e-6
    }

    pub fn first_longitude(&self) -> f64 {
        self.first_longitude_microdegrees as f64 * 1e-6
    }

    pub fn last_longitude(&self) -> f64 {
        self.last_longitude_microdegrees as f64 * 1e-6
    }

    pub fn latitude_increment(&self) -> f64 {
        self.latitude_increment_microdegrees as f64 * 1e-6
    }

    pub fn longitude_increment(&self) -> f64 {
        self.longitude_increment_microdegrees as f64 * 1e-6
    }
}

/// A fixed surface from Section 4 (Code Table 4.5 type plus scaled value).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedSurface {
    pub surface_type: u8,
    pub scale_factor: i8,
    pub scaled_value: u32,
}

impl FixedSurface {
    /// Physical value: `scaled_value / 10^scale_factor`.
    ///
    /// Isobaric surfaces come out in Pa, heights in m.
    pub fn value(&self) -> f64 {
        if self.scaled_value == u32::MAX {
            return 0.0;
        }
        self.scaled_value as f64 / 10f64.powi(self.scale_factor as i32)
    }
}

/// Section 4: Product Definition Section
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub template_number: u16,
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub forecast_time: u32,
    pub first_surface: FixedSurface,
    pub second_surface: FixedSurface,
}

/// Section 5: Data Representation Section
#[derive(Debug, Clone)]
pub struct DataRepresentation {
    pub num_data_points: u32,
    pub template_number: u16,
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
    pub original_data_type: u8,
}

/// Section 6: Bitmap Section
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub indicator: u8,
    pub data: Bytes,
}

/// Section 7: Data Section
#[derive(Debug, Clone)]
pub struct DataSection {
    pub data: Bytes,
}

// ===== Parsing Functions =====

/// Parse Section 0 (Indicator) from start of message
pub fn parse_indicator(data: &[u8]) -> Grib2Result<Indicator> {
    if data.len() < 16 {
        return Err(Grib2Error::InvalidFormat(
            "Not enough data for indicator section".to_string(),
        ));
    }

    if &data[0..4] != b"GRIB" {
        return Err(Grib2Error::InvalidFormat(
            "Invalid GRIB magic bytes".to_string(),
        ));
    }

    // Octets 5-6 reserved, octet 7 discipline, octet 8 edition,
    // octets 9-16 total message length (big-endian u64).
    let discipline = data[6];
    let edition = data[7];

    if edition != 2 {
        return Err(Grib2Error::InvalidFormat(format!(
            "Expected GRIB edition 2, got {}",
            edition
        )));
    }

    let message_length = read_u64(&data[8..16]);

    Ok(Indicator {
        discipline,
        edition,
        message_length,
    })
}

/// Parse Section 1 (Identification), located at offset 16 in the message
pub fn parse_identification(data: &[u8]) -> Grib2Result<Identification> {
    let section_offset = find_section(data, 1)?;
    let section_data = &data[section_offset..];

    if section_data.len() < 21 {
        return Err(Grib2Error::InvalidSection {
            section: 1,
            reason: "Not enough data".to_string(),
        });
    }

    let sec = &section_data[5..];

    let center = read_u16(&sec[0..2]);
    let sub_center = read_u16(&sec[2..4]);
    let table_version = sec[4];
    let local_table_version = sec[5];
    let significance_of_reference_time = sec[6];

    let year = read_u16(&sec[7..9]);
    let (month, day, hour, minute, second) = (sec[9], sec[10], sec[11], sec[12], sec[13]);

    let reference_time = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or_else(|| Grib2Error::InvalidSection {
            section: 1,
            reason: format!(
                "Invalid date: {}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ),
        })?;

    Ok(Identification {
        center,
        sub_center,
        table_version,
        local_table_version,
        significance_of_reference_time,
        reference_time: DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc),
        production_status: sec.get(14).copied().unwrap_or(0),
        data_type: sec.get(15).copied().unwrap_or(0),
    })
}

/// Parse Section 3 (Grid Definition).
///
/// Only template 3.0 (regular latitude/longitude) is supported; the global
/// analysis grids this reader targets are always encoded that way.
pub fn parse_grid_definition(data: &[u8]) -> Grib2Result<GridDefinition> {
    let section_offset = find_section(data, 3)?;
    let section_data = &data[section_offset..];

    if section_data.len() < 14 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: "Not enough data".to_string(),
        });
    }

    // Bytes 0-3: length, 4: section number, 5: source of grid definition,
    // 6-9: number of data points, 10-11: optional list, 12-13: template.
    let num_data_points = read_u32(&section_data[6..10]);
    let template_number = read_u16(&section_data[12..14]);

    if template_number != 0 {
        return Err(Grib2Error::Unsupported(format!(
            "grid definition template 3.{}",
            template_number
        )));
    }

    // Template 3.0 layout, relative to byte 14 of the section:
    //   0: shape of the earth
    //   16-19: Ni, 20-23: Nj
    //   32-35: La1, 36-39: Lo1, 40: resolution flags
    //   41-44: La2, 45-48: Lo2, 49-52: Di, 53-56: Dj, 57: scanning mode
    let gd = &section_data[14..];
    if gd.len() < 58 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: format!("Template 3.0 needs at least 58 bytes, got {}", gd.len()),
        });
    }

    Ok(GridDefinition {
        template_number,
        num_data_points,
        earth_shape: gd[0],
        num_points_longitude: read_u32(&gd[16..20]),
        num_points_latitude: read_u32(&gd[20..24]),
        first_latitude_microdegrees: decode_grib2_signed(&gd[32..36]),
        first_longitude_microdegrees: decode_grib2_signed(&gd[36..40]),
        last_latitude_microdegrees: decode_grib2_signed(&gd[41..45]),
        last_longitude_microdegrees: decode_grib2_signed(&gd[45..49]),
        longitude_increment_microdegrees: read_u32(&gd[49..53]),
        latitude_increment_microdegrees: read_u32(&gd[53..57]),
        scanning_mode: gd[57],
    })
}

/// Parse Section 4 (Product Definition).
///
/// Templates 4.0, 4.1, 4.8 and 4.11 share the layout of the first 34 bytes,
/// which is all that is needed to identify a parameter and its level.
pub fn parse_product_definition(data: &[u8]) -> Grib2Result<ProductDefinition> {
    let section_offset = find_section(data, 4)?;
    let section_data = &data[section_offset..];

    if section_data.len() < 34 {
        return Err(Grib2Error::InvalidSection {
            section: 4,
            reason: "Not enough data".to_string(),
        });
    }

    let template_number = read_u16(&section_data[7..9]);
    if !matches!(template_number, 0 | 1 | 8 | 11) {
        return Err(Grib2Error::Unsupported(format!(
            "product definition template 4.{}",
            template_number
        )));
    }

    let first_surface = FixedSurface {
        surface_type: section_data[22],
        scale_factor: read_signed_i8(section_data[23]),
        scaled_value: read_u32(&section_data[24..28]),
    };
    let second_surface = FixedSurface {
        surface_type: section_data[28],
        scale_factor: read_signed_i8(section_data[29]),
        scaled_value: read_u32(&section_data[30..34]),
    };

    Ok(ProductDefinition {
        template_number,
        parameter_category: section_data[9],
        parameter_number: section_data[10],
        forecast_time: read_u32(&section_data[18..22]),
        first_surface,
        second_surface,
    })
}

/// Parse Section 5 (Data Representation)
pub fn parse_data_representation(data: &[u8]) -> Grib2Result<DataRepresentation> {
    let section_offset = find_section(data, 5)?;
    let section_data = &data[section_offset..];

    if section_data.len() < 21 {
        return Err(Grib2Error::InvalidSection {
            section: 5,
            reason: "Not enough data".to_string(),
        });
    }

    // Bytes 5-8: number of packed values, 9-10: template number.
    // Templates 5.0, 5.2, 5.3, 5.40 and 5.41 all begin with
    // R (f32), E (i16), D (i16), bits per value, original type.
    let template = &section_data[11..];

    Ok(DataRepresentation {
        num_data_points: read_u32(&section_data[5..9]),
        template_number: read_u16(&section_data[9..11]),
        reference_value: f32::from_be_bytes([template[0], template[1], template[2], template[3]]),
        binary_scale_factor: read_signed_i16(&template[4..6]),
        decimal_scale_factor: read_signed_i16(&template[6..8]),
        bits_per_value: template[8],
        original_data_type: template[9],
    })
}

/// Parse Section 6 (Bitmap).
///
/// Returns `None` when the indicator says no bitmap applies (255).
pub fn parse_bitmap(data: &Bytes) -> Grib2Result<Option<Bitmap>> {
    let section_offset = find_section(data, 6)?;
    let section_data = &data[section_offset..];

    if section_data.len() < 6 {
        return Err(Grib2Error::InvalidSection {
            section: 6,
            reason: "Not enough data".to_string(),
        });
    }

    let section_length = read_u32(&section_data[0..4]) as usize;
    if section_length < 6 {
        return Err(Grib2Error::InvalidSection {
            section: 6,
            reason: format!("section length {} is shorter than its header", section_length),
        });
    }
    let indicator = section_data[5];

    match indicator {
        255 => Ok(None),
        0 => Ok(Some(Bitmap {
            indicator,
            data: data.slice(section_offset + 6..section_offset + section_length),
        })),
        other => Err(Grib2Error::Unsupported(format!(
            "bitmap indicator {} (predefined or previously defined bitmaps)",
            other
        ))),
    }
}

/// Parse Section 7 (Data) without copying the packed payload.
pub fn parse_data_section(data: &Bytes) -> Grib2Result<DataSection> {
    let section_offset = find_section(data, 7)?;
    let section_length = read_u32(&data[section_offset..section_offset + 4]) as usize;

    Ok(DataSection {
        data: data.slice(section_offset + 5..section_offset + section_length),
    })
}

// ===== Helper Functions =====

/// Find a section by number within a message
fn find_section(data: &[u8], section_num: u8) -> Grib2Result<usize> {
    let mut offset = 16; // After Section 0

    loop {
        if offset + 5 > data.len() {
            return Err(Grib2Error::InvalidSection {
                section: section_num,
                reason: "Section not found".to_string(),
            });
        }

        if &data[offset..offset + 4] == b"7777" {
            return Err(Grib2Error::InvalidSection {
                section: section_num,
                reason: "Reached end of message without finding section".to_string(),
            });
        }

        let section_length = read_u32(&data[offset..offset + 4]) as usize;

        if section_length < 5 || offset + section_length > data.len() {
            return Err(Grib2Error::InvalidSection {
                section: section_num,
                reason: "Invalid section length".to_string(),
            });
        }

        if data[offset + 4] == section_num {
            return Ok(offset);
        }

        offset += section_length;
    }
}

fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}

/// Decode a 4-byte GRIB2 signed integer.
///
/// GRIB2 uses sign-magnitude, not two's complement: the top bit is the sign.
pub fn decode_grib2_signed(bytes: &[u8]) -> i32 {
    let raw = read_u32(bytes);
    let magnitude = (raw & 0x7FFF_FFFF) as i32;
    if raw & 0x8000_0000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn read_signed_i16(bytes: &[u8]) -> i16 {
    let raw = read_u16(bytes);
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn read_signed_i8(byte: u8) -> i8 {
    let magnitude = (byte & 0x7F) as i8;
    if byte & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}
