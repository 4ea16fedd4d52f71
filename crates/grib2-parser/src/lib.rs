//! GRIB2 reader (WMO FM 92 GRIB Edition 2).
//!
//! A pure Rust decoder for the subset of GRIB2 published by regional NWP
//! models on regular latitude/longitude grids:
//!
//! - Grid definition template 3.0 (regular lat/lon)
//! - Product definition templates 4.0 and 4.8 (statistically processed,
//!   used for accumulated fields such as total precipitation)
//! - Data representation template 5.0 (simple packing)
//! - Optional bitmap (Section 6)
//!
//! Files may contain several messages back to back; [`Grib2Reader`] walks
//! them in order.

pub mod scan;
pub mod sections;
pub mod unpacking;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

pub use scan::ScanMode;
pub use sections::{
    Bitmap, DataRepresentation, DataSection, GridDefinition, Identification, Indicator,
    ProductDefinition, TimeUnit,
};
pub use unpacking::unpack_simple;

/// Errors produced while decoding GRIB2 data.
#[derive(Debug, Error)]
pub enum Grib2Error {
    #[error("Invalid GRIB2 format: {0}")]
    InvalidFormat(String),

    #[error("Invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    #[error("Unsupported template {template} in section {section}")]
    UnsupportedTemplate { section: u8, template: u16 },

    #[error("Unpacking failed: {0}")]
    UnpackingError(String),
}

/// A fully parsed GRIB2 message.
#[derive(Debug, Clone)]
pub struct Grib2Message {
    pub indicator: Indicator,
    pub identification: Identification,
    pub grid_definition: GridDefinition,
    pub product_definition: ProductDefinition,
    pub data_representation: DataRepresentation,
    pub bitmap: Option<Bitmap>,
    pub data_section: DataSection,
}

impl Grib2Message {
    /// Parse a single message. `data` must start at the `GRIB` marker.
    pub fn parse(data: &[u8]) -> Result<Self, Grib2Error> {
        let indicator = sections::parse_indicator(data)?;
        let identification = sections::parse_identification(data)?;
        let grid_definition = sections::parse_grid_definition(data)?;
        let product_definition = sections::parse_product_definition(data, indicator.discipline)?;
        let data_representation = sections::parse_data_representation(data)?;
        let bitmap = sections::parse_bitmap(data)?;
        let data_section = sections::parse_data_section(data)?;

        Ok(Self {
            indicator,
            identification,
            grid_definition,
            product_definition,
            data_representation,
            bitmap,
            data_section,
        })
    }

    /// Parameter short name (e.g. "TP", "APCP").
    pub fn parameter(&self) -> &str {
        &self.product_definition.parameter_short_name
    }

    /// Grid dimensions as (rows, columns), i.e. (Nj, Ni).
    pub fn grid_dims(&self) -> (usize, usize) {
        (
            self.grid_definition.nj as usize,
            self.grid_definition.ni as usize,
        )
    }

    /// Valid time of the field: reference time plus forecast step.
    pub fn valid_time(&self) -> Result<DateTime<Utc>, Grib2Error> {
        self.product_definition
            .valid_time(self.identification.reference_time)
    }

    /// Unpack the field values in message (scan) order.
    ///
    /// Points masked out by the bitmap are returned as `NaN`.
    pub fn unpack_data(&self) -> Result<Vec<f32>, Grib2Error> {
        let num_points = self.grid_definition.num_data_points;
        let drs = &self.data_representation;

        let values = unpack_simple(
            &self.data_section.data,
            num_points,
            drs.bits_per_value,
            drs.reference_value,
            drs.binary_scale_factor,
            drs.decimal_scale_factor,
            self.bitmap.as_ref().map(|b| b.data.as_ref()),
        )?;

        Ok(values.into_iter().map(|v| v.unwrap_or(f32::NAN)).collect())
    }
}

/// Sequential reader over the messages of a GRIB2 file.
pub struct Grib2Reader {
    data: Bytes,
    offset: usize,
}

impl Grib2Reader {
    pub fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    /// Read the next message, or `None` once the input is exhausted.
    pub fn next_message(&mut self) -> Result<Option<Grib2Message>, Grib2Error> {
        let Some(start) = find_marker(&self.data[self.offset..]).map(|pos| self.offset + pos)
        else {
            self.offset = self.data.len();
            return Ok(None);
        };

        let indicator = sections::parse_indicator(&self.data[start..])?;
        let length = usize::try_from(indicator.message_length).map_err(|_| {
            Grib2Error::InvalidFormat(format!(
                "Message length {} does not fit in memory",
                indicator.message_length
            ))
        })?;
        let end = start
            .checked_add(length)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                Grib2Error::InvalidFormat(format!(
                    "Message at offset {} declares {} bytes but only {} remain",
                    start,
                    length,
                    self.data.len() - start
                ))
            })?;

        let message_bytes = &self.data[start..end];
        if !message_bytes.ends_with(b"7777") {
            return Err(Grib2Error::InvalidFormat(format!(
                "Message at offset {} is missing the 7777 end marker",
                start
            )));
        }

        let message = Grib2Message::parse(message_bytes)?;
        debug!(
            offset = start,
            length = length,
            parameter = %message.parameter(),
            "Parsed GRIB2 message"
        );

        self.offset = end;
        Ok(Some(message))
    }

    /// Read every remaining message.
    pub fn read_all(&mut self) -> Result<Vec<Grib2Message>, Grib2Error> {
        let mut messages = Vec::new();
        while let Some(message) = self.next_message()? {
            messages.push(message);
        }
        Ok(messages)
    }
}

fn find_marker(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"GRIB")
}
