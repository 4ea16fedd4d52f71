//! Synthetic GRIB2 message builder.
//!
//! Produces small but structurally valid GRIB2 edition 2 messages:
//! regular lat/lon grid (template 3.0), product template 4.0 or 4.8,
//! simple packing (template 5.0) and an optional bitmap for `NaN` values.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

/// Build a GRIB2 message with the specified parameters
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    center: u16,
    reference_time: NaiveDateTime,
    // Grid definition
    ni: u32,  // columns
    nj: u32,  // rows
    la1: i32, // microdegrees
    lo1: i32,
    la2: i32,
    lo2: i32,
    di: u32,
    dj: u32,
    scanning_mode: u8,
    // Product definition
    param_category: u8,
    param_number: u8,
    level_type: u8,
    forecast_hour: u32,
    /// End hour of an accumulation starting at the reference time (template 4.8)
    accumulation_hours: Option<u32>,
    // Data
    data_values: Vec<f32>,
}

impl Grib2Builder {
    /// Total precipitation on a 4x3 regional lat/lon grid at 0.02 degrees,
    /// accumulated from the reference time (ICON-D2 style).
    pub fn new_tot_prec() -> Self {
        let ni = 4;
        let nj = 3;
        Self {
            discipline: 0,
            center: 78, // DWD Offenbach
            reference_time: NaiveDate::from_ymd_opt(2024, 5, 1)
                .and_then(|d| d.and_hms_opt(12, 0, 0))
                .expect("valid reference time"),
            ni,
            nj,
            la1: 47_500_000,
            lo1: 5_000_000,
            la2: 47_540_000,
            lo2: 5_060_000,
            di: 20_000,
            dj: 20_000,
            scanning_mode: 0b0100_0000, // +i, +j, i consecutive
            param_category: 1,
            param_number: 52,
            level_type: 1, // surface
            forecast_hour: 0,
            accumulation_hours: Some(0),
            data_values: vec![0.0; (ni * nj) as usize],
        }
    }

    pub fn with_reference_time(mut self, year: i32, month: u32, day: u32, hour: u32) -> Self {
        self.reference_time = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .expect("valid reference time");
        self
    }

    pub fn with_grid(mut self, ni: u32, nj: u32) -> Self {
        self.ni = ni;
        self.nj = nj;
        self.data_values = vec![0.0; (ni * nj) as usize];
        self
    }

    /// Boundary coordinates and increments in degrees.
    pub fn with_bounds(
        mut self,
        first_lat: f64,
        last_lat: f64,
        first_lon: f64,
        last_lon: f64,
        di: f64,
        dj: f64,
    ) -> Self {
        self.la1 = to_micro(first_lat);
        self.la2 = to_micro(last_lat);
        self.lo1 = to_micro(first_lon);
        self.lo2 = to_micro(last_lon);
        self.di = to_micro(di) as u32;
        self.dj = to_micro(dj) as u32;
        self
    }

    pub fn with_scanning_mode(mut self, flags: u8) -> Self {
        self.scanning_mode = flags;
        self
    }

    pub fn with_parameter(mut self, category: u8, number: u8) -> Self {
        self.param_category = category;
        self.param_number = number;
        self
    }

    /// Instantaneous field at `hour` (template 4.0).
    pub fn with_forecast_hour(mut self, hour: u32) -> Self {
        self.forecast_hour = hour;
        self.accumulation_hours = None;
        self
    }

    /// Accumulation from the reference time up to `hour` (template 4.8).
    pub fn with_accumulation_hours(mut self, hour: u32) -> Self {
        self.forecast_hour = 0;
        self.accumulation_hours = Some(hour);
        self
    }

    pub fn with_constant_value(mut self, value: f32) -> Self {
        self.data_values = vec![value; (self.ni * self.nj) as usize];
        self
    }

    /// Row-major values; `NaN` entries are encoded as missing via the bitmap.
    pub fn with_data(mut self, data: Vec<f32>) -> Self {
        self.data_values = data;
        self
    }

    /// Build the complete GRIB2 message bytes
    pub fn build(&self) -> Vec<u8> {
        let sections = [
            self.build_section1(),
            self.build_section3(),
            self.build_section4(),
            self.build_section5(),
            self.build_section6(),
            self.build_section7(),
        ];

        let message_length = 16 + sections.iter().map(Vec::len).sum::<usize>() + 4;

        let mut message = Vec::with_capacity(message_length);

        // Section 0: Indicator
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&[0, 0]);
        message.push(self.discipline);
        message.push(2);
        message.extend_from_slice(&(message_length as u64).to_be_bytes());

        for section in &sections {
            message.extend_from_slice(section);
        }

        // Section 8: End
        message.extend_from_slice(b"7777");

        message
    }

    fn build_section1(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(1);

        section.extend_from_slice(&self.center.to_be_bytes());
        section.extend_from_slice(&255u16.to_be_bytes()); // Sub-center
        section.push(2); // Master table version
        section.push(1); // Local table version
        section.push(1); // Significance of reference time (start of forecast)
        push_datetime(&mut section, self.reference_time);
        section.push(0); // Production status (operational)
        section.push(1); // Type of data (forecast)

        section
    }

    fn build_section3(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&72u32.to_be_bytes());
        section.push(3);

        section.push(0); // Source of grid definition
        section.extend_from_slice(&(self.ni * self.nj).to_be_bytes());
        section.push(0); // Octets for optional list
        section.push(0); // Interpretation of optional list
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 3.0

        section.push(6); // Shape of Earth (sphere, 6371229 m)
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());

        section.extend_from_slice(&self.ni.to_be_bytes());
        section.extend_from_slice(&self.nj.to_be_bytes());
        section.extend_from_slice(&0u32.to_be_bytes()); // Basic angle
        section.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes()); // Subdivisions

        section.extend_from_slice(&encode_grib2_signed(self.la1));
        section.extend_from_slice(&encode_grib2_signed(self.lo1));
        section.push(48); // Resolution and component flags
        section.extend_from_slice(&encode_grib2_signed(self.la2));
        section.extend_from_slice(&encode_grib2_signed(self.lo2));
        section.extend_from_slice(&self.di.to_be_bytes());
        section.extend_from_slice(&self.dj.to_be_bytes());
        section.push(self.scanning_mode);

        section
    }

    fn build_section4(&self) -> Vec<u8> {
        let template: u16 = if self.accumulation_hours.is_some() { 8 } else { 0 };
        let section_length: u32 = if template == 8 { 58 } else { 34 };

        let mut section = Vec::new();
        section.extend_from_slice(&section_length.to_be_bytes());
        section.push(4);

        section.extend_from_slice(&0u16.to_be_bytes()); // Coordinate values
        section.extend_from_slice(&template.to_be_bytes());

        section.push(self.param_category);
        section.push(self.param_number);
        section.push(2); // Type of generating process (forecast)
        section.push(0); // Background generating process
        section.push(0); // Analysis or forecast process
        section.extend_from_slice(&0u16.to_be_bytes()); // Hours of cutoff
        section.push(0); // Minutes of cutoff
        section.push(1); // Time range unit (hours)
        section.extend_from_slice(&self.forecast_hour.to_be_bytes());

        section.push(self.level_type);
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(255); // No second fixed surface
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());

        if let Some(hours) = self.accumulation_hours {
            let end = self.reference_time + Duration::hours(hours as i64);
            push_datetime(&mut section, end);
            section.push(1); // Number of time range specifications
            section.extend_from_slice(&0u32.to_be_bytes()); // Missing values in process
            section.push(1); // Statistical process: accumulation
            section.push(2); // Successive times, same start
            section.push(1); // Unit for time range (hours)
            section.extend_from_slice(&hours.to_be_bytes());
            section.push(255); // Unit for increment
            section.extend_from_slice(&0u32.to_be_bytes());
        }

        section
    }

    fn present_values(&self) -> Vec<f32> {
        self.data_values
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .collect()
    }

    /// (reference value, binary scale factor, bits per value)
    fn packing_parameters(&self) -> (f32, i16, u8) {
        let (min_val, max_val) = self.present_values().iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY),
            |(min, max), &v| (min.min(v), max.max(v)),
        );

        if !min_val.is_finite() || max_val == min_val {
            let reference = if min_val.is_finite() { min_val } else { 0.0 };
            return (reference, 0, 0);
        }

        // 16-bit packing: range = 65535 * 2^E
        let binary_scale_factor = ((max_val - min_val) / 65535.0).log2().ceil() as i16;
        (min_val, binary_scale_factor, 16)
    }

    fn build_section5(&self) -> Vec<u8> {
        let (reference_value, binary_scale_factor, bits_per_value) = self.packing_parameters();

        let mut section = Vec::new();
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(5);

        section.extend_from_slice(&(self.present_values().len() as u32).to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 5.0

        section.extend_from_slice(&reference_value.to_be_bytes());
        section.extend_from_slice(&encode_grib2_signed16(binary_scale_factor));
        section.extend_from_slice(&encode_grib2_signed16(0)); // Decimal scale factor
        section.push(bits_per_value);
        section.push(0); // Original field type (floating point)

        section
    }

    fn build_section6(&self) -> Vec<u8> {
        let mut section = Vec::new();

        if !self.data_values.iter().any(|v| v.is_nan()) {
            section.extend_from_slice(&6u32.to_be_bytes());
            section.push(6);
            section.push(255); // No bitmap
            return section;
        }

        let mut bitmap = vec![0u8; self.data_values.len().div_ceil(8)];
        for (i, value) in self.data_values.iter().enumerate() {
            if !value.is_nan() {
                bitmap[i / 8] |= 0x80 >> (i % 8);
            }
        }

        section.extend_from_slice(&(6 + bitmap.len() as u32).to_be_bytes());
        section.push(6);
        section.push(0); // Bitmap follows
        section.extend_from_slice(&bitmap);
        section
    }

    fn build_section7(&self) -> Vec<u8> {
        let packed_data = self.pack_simple();

        let mut section = Vec::new();
        section.extend_from_slice(&(5 + packed_data.len() as u32).to_be_bytes());
        section.push(7);
        section.extend_from_slice(&packed_data);
        section
    }

    fn pack_simple(&self) -> Vec<u8> {
        let (reference_value, binary_scale_factor, bits_per_value) = self.packing_parameters();
        if bits_per_value == 0 {
            return Vec::new();
        }

        let binary_scale = 2.0_f32.powi(binary_scale_factor as i32);
        self.present_values()
            .iter()
            .flat_map(|&v| {
                let packed = ((v - reference_value) / binary_scale).round() as u16;
                packed.to_be_bytes()
            })
            .collect()
    }
}

/// Concatenate messages into a single multi-message file.
pub fn build_grib2_file(messages: &[Grib2Builder]) -> Vec<u8> {
    messages.iter().flat_map(|m| m.build()).collect()
}

/// Encode a 4-byte GRIB2 sign-magnitude integer.
pub fn encode_grib2_signed(value: i32) -> [u8; 4] {
    let magnitude = value.unsigned_abs() & 0x7FFF_FFFF;
    let sign = if value < 0 { 0x8000_0000 } else { 0 };
    (magnitude | sign).to_be_bytes()
}

/// Encode a 2-byte GRIB2 sign-magnitude integer.
pub fn encode_grib2_signed16(value: i16) -> [u8; 2] {
    let magnitude = value.unsigned_abs() & 0x7FFF;
    let sign = if value < 0 { 0x8000 } else { 0 };
    (magnitude | sign).to_be_bytes()
}

fn to_micro(degrees: f64) -> i32 {
    (degrees * 1_000_000.0).round() as i32
}

fn push_datetime(section: &mut Vec<u8>, time: NaiveDateTime) {
    section.extend_from_slice(&(time.year() as u16).to_be_bytes());
    section.push(time.month() as u8);
    section.push(time.day() as u8);
    section.push(time.hour() as u8);
    section.push(time.minute() as u8);
    section.push(time.second() as u8);
}
