//! GRIB2 data unpacking.
//!
//! Simple packing (template 5.0) is decoded here directly. Every other
//! packing scheme (complex, spatially differenced, JPEG2000, PNG) is handed
//! to the `grib` crate, which decodes the whole message.

use crate::error::{Grib2Error, Grib2Result};
use std::io::Cursor;

/// Unpack simple packed GRIB2 data.
///
/// Simple packing formula:
/// `value = (reference_value + packed_value * 2^binary_scale) * 10^(-decimal_scale)`
///
/// Points masked out by the bitmap carry no packed bits and come back as
/// `None`.
pub fn unpack_simple(
    packed_data: &[u8],
    num_points: u32,
    bits_per_value: u8,
    reference_value: f32,
    binary_scale_factor: i16,
    decimal_scale_factor: i16,
    bitmap: Option<&[u8]>,
) -> Grib2Result<Vec<Option<f32>>> {
    let binary_scale = 2.0_f64.powi(binary_scale_factor as i32);
    let decimal_scale = 10.0_f64.powi(-(decimal_scale_factor as i32));
    let reference = reference_value as f64;

    let mut values = Vec::with_capacity(num_points as usize);
    let mut bit_position = 0;
    let bits_per_value = bits_per_value as usize;

    for i in 0..(num_points as usize) {
        let present = match bitmap {
            Some(bm) => {
                let byte_idx = i / 8;
                let bit_idx = 7 - (i % 8);
                byte_idx < bm.len() && (bm[byte_idx] >> bit_idx) & 1 == 1
            }
            None => true,
        };

        if !present {
            values.push(None);
            continue;
        }

        let packed_value = if bits_per_value == 0 {
            0
        } else {
            let raw = extract_bits(packed_data, bit_position, bits_per_value).map_err(|e| {
                Grib2Error::UnpackingError(format!("point {}: {}", i, e))
            })?;
            bit_position += bits_per_value;
            raw
        };

        let value = (reference + packed_value as f64 * binary_scale) * decimal_scale;
        values.push(Some(value as f32));
    }

    Ok(values)
}

/// Decode a complete GRIB2 message with the `grib` crate.
///
/// Used for packing templates not handled natively. Missing points are
/// reported by the crate as NaN and mapped to `None`.
pub fn unpack_with_grib_crate(message: &[u8]) -> Grib2Result<Vec<Option<f32>>> {
    let grib_file = grib::from_reader(Cursor::new(message))
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate parse: {}", e)))?;

    let (_, submessage) = grib_file
        .iter()
        .next()
        .ok_or_else(|| Grib2Error::UnpackingError("grib crate found no submessage".to_string()))?;

    let decoder = grib::Grib2SubmessageDecoder::from(submessage)
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate decoder: {}", e)))?;
    let values = decoder
        .dispatch()
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate dispatch: {}", e)))?;

    Ok(values
        .map(|v| if v.is_nan() { None } else { Some(v) })
        .collect())
}

/// Extract `num_bits` bits (MSB first) starting at `start_bit`.
fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> Result<u32, String> {
    if num_bits > 32 || num_bits == 0 {
        return Err(format!("Invalid number of bits: {}", num_bits));
    }

    let last_byte = (start_bit + num_bits - 1) / 8;
    if last_byte >= data.len() {
        return Err("Not enough data to extract bits".to_string());
    }

    let mut result = 0u32;
    for i in 0..num_bits {
        let absolute_bit = start_bit + i;
        let bit = (data[absolute_bit / 8] >> (7 - (absolute_bit % 8))) & 1;
        result = (result << 1) | (bit as u32);
    }

    Ok(result)
}
