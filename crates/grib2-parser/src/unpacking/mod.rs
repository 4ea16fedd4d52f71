//! GRIB2 data unpacking.
//!
//! Only simple packing (Data Representation Template 5.0) is implemented.

use crate::Grib2Error;

/// Unpack simple packed GRIB2 data.
///
/// `value = (reference_value + packed_value * 2^E) * 10^(-D)`
///
/// When a bitmap is present the packed stream only holds values for points
/// whose bitmap bit is set; masked points come back as `None`.
pub fn unpack_simple(
    packed_data: &[u8],
    num_points: u32,
    bits_per_value: u8,
    reference_value: f32,
    binary_scale_factor: i16,
    decimal_scale_factor: i16,
    bitmap: Option<&[u8]>,
) -> Result<Vec<Option<f32>>, Grib2Error> {
    let num_points = num_points as usize;
    if let Some(bm) = bitmap {
        if bm.len() * 8 < num_points {
            return Err(Grib2Error::UnpackingError(format!(
                "Bitmap covers {} points, grid has {}",
                bm.len() * 8,
                num_points
            )));
        }
    }

    let binary_scale = 2.0_f64.powi(binary_scale_factor as i32);
    let decimal_scale = 10.0_f64.powi(-(decimal_scale_factor as i32));
    let reference = reference_value as f64;
    let bits_per_value = bits_per_value as usize;

    let mut values = Vec::with_capacity(num_points);
    let mut bit_position = 0;

    for i in 0..num_points {
        if let Some(bm) = bitmap {
            // 1 bit per grid point, MSB first, 1 = value present
            if (bm[i / 8] >> (7 - (i % 8))) & 1 == 0 {
                values.push(None);
                continue;
            }
        }

        let packed_value = if bits_per_value == 0 {
            // Constant field: every value equals the reference value
            0
        } else {
            extract_bits(packed_data, bit_position, bits_per_value).map_err(|e| {
                Grib2Error::UnpackingError(format!("Failed to extract value {}: {}", i, e))
            })?
        };
        bit_position += bits_per_value;

        let value = (reference + packed_value as f64 * binary_scale) * decimal_scale;
        values.push(Some(value as f32));
    }

    Ok(values)
}

/// Extract `num_bits` bits (MSB first) starting at `start_bit`.
fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> Result<u32, String> {
    if num_bits > 32 || num_bits == 0 {
        return Err(format!("Invalid number of bits: {}", num_bits));
    }

    if (start_bit + num_bits + 7) / 8 > data.len() {
        return Err("Not enough data to extract bits".to_string());
    }

    let mut result = 0u32;
    for i in 0..num_bits {
        let absolute_bit = start_bit + i;
        let bit = (data[absolute_bit / 8] >> (7 - (absolute_bit % 8))) & 1;
        result = (result << 1) | bit as u32;
    }

    Ok(result)
}
