//! GRIB2 section parsing.
//!
//! Each GRIB2 message is a sequence of numbered sections: indicator (0),
//! identification (1), optional local use (2), grid definition (3), product
//! definition (4), data representation (5), bitmap (6), data (7) and the
//! `7777` end marker (8). Functions here take the full message bytes and
//! locate the section they need.
//!
//! Signed integers in GRIB2 use sign-magnitude encoding (most significant
//! bit is the sign), not two's complement.

use crate::Grib2Error;
use bytes::Bytes;
use chrono::{DateTime, Duration, NaiveDate, Utc};

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

/// Section 3: Grid Definition Section (template 3.0, regular lat/lon)
///
/// Coordinates and increments are kept in microdegrees as stored.
#[derive(Debug, Clone)]
pub struct GridDefinition {
    pub num_data_points: u32,
    pub earth_shape: u8,
    /// Points along a parallel (columns)
    pub ni: u32,
    /// Points along a meridian (rows)
    pub nj: u32,
    pub la1: i32,
    pub lo1: i32,
    pub la2: i32,
    pub lo2: i32,
    pub di: u32,
    pub dj: u32,
    pub scanning_mode: u8,
}

impl GridDefinition {
    pub fn first_latitude(&self) -> f64 {
        micro_to_degrees(self.la1 as f64)
    }

    pub fn last_latitude(&self) -> f64 {
        micro_to_degrees(self.la2 as f64)
    }

    pub fn first_longitude(&self) -> f64 {
        micro_to_degrees(self.lo1 as f64)
    }

    pub fn last_longitude(&self) -> f64 {
        micro_to_degrees(self.lo2 as f64)
    }

    /// i (west-east) direction increment in degrees
    pub fn i_increment(&self) -> f64 {
        micro_to_degrees(self.di as f64)
    }

    /// j (south-north) direction increment in degrees
    pub fn j_increment(&self) -> f64 {
        micro_to_degrees(self.dj as f64)
    }
}

fn micro_to_degrees(value: f64) -> f64 {
    value / 1_000_000.0
}

/// Indicator of unit of time range (Code Table 4.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    ThreeHours,
    SixHours,
    TwelveHours,
    Second,
    Other(u8),
}

impl TimeUnit {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => TimeUnit::Minute,
            1 => TimeUnit::Hour,
            2 => TimeUnit::Day,
            10 => TimeUnit::ThreeHours,
            11 => TimeUnit::SixHours,
            12 => TimeUnit::TwelveHours,
            13 => TimeUnit::Second,
            other => TimeUnit::Other(other),
        }
    }

    /// Length of one unit in seconds, when the unit has a fixed length.
    pub fn seconds(&self) -> Option<i64> {
        match self {
            TimeUnit::Minute => Some(60),
            TimeUnit::Hour => Some(3_600),
            TimeUnit::Day => Some(86_400),
            TimeUnit::ThreeHours => Some(3 * 3_600),
            TimeUnit::SixHours => Some(6 * 3_600),
            TimeUnit::TwelveHours => Some(12 * 3_600),
            TimeUnit::Second => Some(1),
            TimeUnit::Other(_) => None,
        }
    }
}

/// Section 4: Product Definition Section (templates 4.0 and 4.8)
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub template: u16,
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub parameter_short_name: String,
    pub time_unit: TimeUnit,
    pub forecast_time: i32,
    pub level_type: u8,
    pub level_value: u32,
    /// End of the overall time interval (template 4.8 only)
    pub interval_end: Option<DateTime<Utc>>,
}

impl ProductDefinition {
    /// Forecast step from the reference time.
    ///
    /// Statistically processed fields are valid at the end of their
    /// interval, so the step runs up to `interval_end` when present.
    pub fn forecast_step(&self, reference_time: DateTime<Utc>) -> Result<Duration, Grib2Error> {
        if let Some(end) = self.interval_end {
            return Ok(end - reference_time);
        }

        let unit_seconds = self.time_unit.seconds().ok_or_else(|| Grib2Error::InvalidSection {
            section: 4,
            reason: format!("Unsupported time range unit {:?}", self.time_unit),
        })?;

        Ok(Duration::seconds(self.forecast_time as i64 * unit_seconds))
    }

    pub fn valid_time(&self, reference_time: DateTime<Utc>) -> Result<DateTime<Utc>, Grib2Error> {
        Ok(reference_time + self.forecast_step(reference_time)?)
    }
}

/// Section 5: Data Representation Section (template 5.0, simple packing)
#[derive(Debug, Clone)]
pub struct DataRepresentation {
    /// Number of packed values (excludes points masked by the bitmap)
    pub num_data_points: u32,
    pub template: u16,
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
    pub original_data_type: u8,
}

/// Section 6: Bitmap Section
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub data: Bytes,
}

/// Section 7: Data Section
#[derive(Debug, Clone)]
pub struct DataSection {
    pub data: Bytes,
}

// ===== Parsing Functions =====

/// Parse Section 0 (Indicator) from start of message
pub fn parse_indicator(data: &[u8]) -> Result<Indicator, Grib2Error> {
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

    // Octets 5-6 reserved, 7 discipline, 8 edition, 9-16 total length
    let discipline = data[6];
    let edition = data[7];

    if edition != 2 {
        return Err(Grib2Error::InvalidFormat(format!(
            "Expected GRIB edition 2, got {}",
            edition
        )));
    }

    let mut length = [0u8; 8];
    length.copy_from_slice(&data[8..16]);

    Ok(Indicator {
        discipline,
        edition,
        message_length: u64::from_be_bytes(length),
    })
}

/// Parse Section 1 (Identification)
pub fn parse_identification(data: &[u8]) -> Result<Identification, Grib2Error> {
    let section = find_section(data, 1)?;

    if section.len() < 21 {
        return Err(Grib2Error::InvalidSection {
            section: 1,
            reason: format!("Expected at least 21 bytes, got {}", section.len()),
        });
    }

    let year = u16::from_be_bytes([section[12], section[13]]);
    let (month, day, hour, minute, second) =
        (section[14], section[15], section[16], section[17], section[18]);

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
        center: u16::from_be_bytes([section[5], section[6]]),
        sub_center: u16::from_be_bytes([section[7], section[8]]),
        table_version: section[9],
        local_table_version: section[10],
        significance_of_reference_time: section[11],
        reference_time: DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc),
        production_status: section[19],
        data_type: section[20],
    })
}

/// Parse Section 3 (Grid Definition)
pub fn parse_grid_definition(data: &[u8]) -> Result<GridDefinition, Grib2Error> {
    let section = find_section(data, 3)?;

    if section.len() < 14 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: "Not enough data".to_string(),
        });
    }

    // Bytes 6-9: number of data points, 12-13: template number
    let num_data_points = read_u32(section, 6);
    let template = u16::from_be_bytes([section[12], section[13]]);

    if template != 0 {
        return Err(Grib2Error::UnsupportedTemplate { section: 3, template });
    }

    // Template 3.0 data starts at byte 14
    let gd = &section[14..];
    if gd.len() < 58 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: format!("Template 0 needs at least 58 bytes, got {}", gd.len()),
        });
    }

    // 16-19 Ni, 20-23 Nj, 32-35 La1, 36-39 Lo1, 40 resolution flags,
    // 41-44 La2, 45-48 Lo2, 49-52 Di, 53-56 Dj, 57 scanning mode
    Ok(GridDefinition {
        num_data_points,
        earth_shape: gd[0],
        ni: read_u32(gd, 16),
        nj: read_u32(gd, 20),
        la1: decode_grib2_signed(&gd[32..36]),
        lo1: decode_grib2_signed(&gd[36..40]),
        la2: decode_grib2_signed(&gd[41..45]),
        lo2: decode_grib2_signed(&gd[45..49]),
        di: read_u32(gd, 49),
        dj: read_u32(gd, 53),
        scanning_mode: gd[57],
    })
}

/// Parse Section 4 (Product Definition)
pub fn parse_product_definition(
    data: &[u8],
    discipline: u8,
) -> Result<ProductDefinition, Grib2Error> {
    let section = find_section(data, 4)?;

    if section.len() < 34 {
        return Err(Grib2Error::InvalidSection {
            section: 4,
            reason: "Not enough data".to_string(),
        });
    }

    // 5-6 coordinate values, 7-8 template, 9 category, 10 number,
    // 17 time unit, 18-21 forecast time, 22 first surface type,
    // 23 scale factor, 24-27 scaled value
    let template = u16::from_be_bytes([section[7], section[8]]);
    if template != 0 && template != 8 {
        return Err(Grib2Error::UnsupportedTemplate { section: 4, template });
    }

    let parameter_category = section[9];
    let parameter_number = section[10];

    let interval_end = if template == 8 {
        Some(parse_interval_end(section)?)
    } else {
        None
    };

    Ok(ProductDefinition {
        template,
        parameter_category,
        parameter_number,
        parameter_short_name: parameter_short_name(
            discipline,
            parameter_category,
            parameter_number,
        ),
        time_unit: TimeUnit::from_code(section[17]),
        forecast_time: decode_grib2_signed(&section[18..22]),
        level_type: section[22],
        level_value: read_u32(section, 24),
        interval_end,
    })
}

/// Template 4.8 bytes 34-40: end of the overall time interval.
fn parse_interval_end(section: &[u8]) -> Result<DateTime<Utc>, Grib2Error> {
    if section.len() < 41 {
        return Err(Grib2Error::InvalidSection {
            section: 4,
            reason: format!("Template 8 needs at least 41 bytes, got {}", section.len()),
        });
    }

    let year = u16::from_be_bytes([section[34], section[35]]);
    NaiveDate::from_ymd_opt(year as i32, section[36] as u32, section[37] as u32)
        .and_then(|date| {
            date.and_hms_opt(section[38] as u32, section[39] as u32, section[40] as u32)
        })
        .map(|end| DateTime::<Utc>::from_naive_utc_and_offset(end, Utc))
        .ok_or_else(|| Grib2Error::InvalidSection {
            section: 4,
            reason: "Invalid end of overall time interval".to_string(),
        })
}

/// Parse Section 5 (Data Representation)
pub fn parse_data_representation(data: &[u8]) -> Result<DataRepresentation, Grib2Error> {
    let section = find_section(data, 5)?;

    if section.len() < 21 {
        return Err(Grib2Error::InvalidSection {
            section: 5,
            reason: "Not enough data".to_string(),
        });
    }

    // 5-8 number of packed values, 9-10 template; template 5.0:
    // 11-14 reference value (IEEE float), 15-16 binary scale factor,
    // 17-18 decimal scale factor, 19 bits per value, 20 original type
    let template = u16::from_be_bytes([section[9], section[10]]);
    if template != 0 {
        return Err(Grib2Error::UnsupportedTemplate { section: 5, template });
    }

    Ok(DataRepresentation {
        num_data_points: read_u32(section, 5),
        template,
        reference_value: f32::from_be_bytes([section[11], section[12], section[13], section[14]]),
        binary_scale_factor: decode_grib2_signed16([section[15], section[16]]),
        decimal_scale_factor: decode_grib2_signed16([section[17], section[18]]),
        bits_per_value: section[19],
        original_data_type: section[20],
    })
}

/// Parse Section 6 (Bitmap). Returns `None` when no bitmap applies.
pub fn parse_bitmap(data: &[u8]) -> Result<Option<Bitmap>, Grib2Error> {
    let section = find_section(data, 6)?;

    if section.len() < 6 {
        return Err(Grib2Error::InvalidSection {
            section: 6,
            reason: "Not enough data".to_string(),
        });
    }

    match section[5] {
        255 => Ok(None),
        0 => Ok(Some(Bitmap {
            data: Bytes::copy_from_slice(&section[6..]),
        })),
        indicator => Err(Grib2Error::InvalidSection {
            section: 6,
            reason: format!("Bitmap indicator {} is not supported", indicator),
        }),
    }
}

/// Parse Section 7 (Data)
pub fn parse_data_section(data: &[u8]) -> Result<DataSection, Grib2Error> {
    let section = find_section(data, 7)?;

    Ok(DataSection {
        data: Bytes::copy_from_slice(&section[5..]),
    })
}

// ===== Helper Functions =====

/// Decode a 4-byte GRIB2 sign-magnitude integer.
///
/// Returns 0 if the slice is not exactly 4 bytes long.
pub fn decode_grib2_signed(bytes: &[u8]) -> i32 {
    let Ok(raw) = <[u8; 4]>::try_from(bytes) else {
        return 0;
    };
    let raw = u32::from_be_bytes(raw);
    let magnitude = (raw & 0x7FFF_FFFF) as i32;
    if raw & 0x8000_0000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Decode a 2-byte GRIB2 sign-magnitude integer (scale factors).
pub fn decode_grib2_signed16(bytes: [u8; 2]) -> i16 {
    let raw = u16::from_be_bytes(bytes);
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Find a section by number and return its bytes (including the 5-byte header).
fn find_section(data: &[u8], section_num: u8) -> Result<&[u8], Grib2Error> {
    let mut offset = 16; // After Section 0

    while offset + 5 <= data.len() {
        if &data[offset..offset + 4] == b"7777" {
            break;
        }

        let section_length = read_u32(data, offset) as usize;
        if section_length < 5 || offset + section_length > data.len() {
            return Err(Grib2Error::InvalidSection {
                section: section_num,
                reason: format!("Invalid section length {} at offset {}", section_length, offset),
            });
        }

        if data[offset + 4] == section_num {
            return Ok(&data[offset..offset + section_length]);
        }

        offset += section_length;
    }

    Err(Grib2Error::InvalidSection {
        section: section_num,
        reason: "Reached end of message without finding section".to_string(),
    })
}

/// Short name for the precipitation-related parameters we expect to see.
fn parameter_short_name(discipline: u8, category: u8, number: u8) -> String {
    match (discipline, category, number) {
        (0, 1, 7) => "PRATE".to_string(),  // Precipitation rate
        (0, 1, 8) => "APCP".to_string(),   // Total precipitation (accumulated)
        (0, 1, 9) => "NCPCP".to_string(),  // Large scale precipitation
        (0, 1, 10) => "ACPCP".to_string(), // Convective precipitation
        (0, 1, 52) => "TP".to_string(),    // Total precipitation rate, accumulated via 4.8
        _ => format!("P{}_{}_{}", discipline, category, number),
    }
}
