//! Reader tests against synthetic messages from `test_utils::Grib2Builder`.

use bytes::Bytes;
use chrono::{Duration, TimeZone, Utc};
use grib2_parser::{Grib2Error, Grib2Reader, TimeUnit};
use test_utils::{
    assert_approx_eq, assert_slices_approx_eq, build_grib2_file, create_test_grid, Grib2Builder,
};

fn read_single(data: Vec<u8>) -> grib2_parser::Grib2Message {
    let mut reader = Grib2Reader::new(Bytes::from(data));
    reader
        .next_message()
        .expect("Should parse")
        .expect("Should have message")
}

#[test]
fn test_grid_definition_in_degrees() {
    let msg = read_single(
        Grib2Builder::new_tot_prec()
            .with_bounds(47.5, 55.5, 5.0, 17.0, 0.02, 0.02)
            .build(),
    );

    let gd = &msg.grid_definition;
    assert_approx_eq!(gd.first_latitude(), 47.5, 1e-9);
    assert_approx_eq!(gd.last_latitude(), 55.5, 1e-9);
    assert_approx_eq!(gd.first_longitude(), 5.0, 1e-9);
    assert_approx_eq!(gd.last_longitude(), 17.0, 1e-9);
    assert_approx_eq!(gd.i_increment(), 0.02, 1e-9);
    assert_approx_eq!(gd.j_increment(), 0.02, 1e-9);
    assert_eq!(msg.grid_dims(), (3, 4));
}

#[test]
fn test_negative_longitude_is_sign_magnitude() {
    let msg = read_single(
        Grib2Builder::new_tot_prec()
            .with_bounds(43.18, 58.08, -3.94, 20.34, 0.02, 0.02)
            .build(),
    );
    assert_approx_eq!(msg.grid_definition.first_longitude(), -3.94, 1e-9);
}

#[test]
fn test_accumulation_valid_time_is_interval_end() {
    let msg = read_single(
        Grib2Builder::new_tot_prec()
            .with_reference_time(2024, 5, 1, 12)
            .with_accumulation_hours(3)
            .build(),
    );

    let reference = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    assert_eq!(msg.product_definition.template, 8);
    assert_eq!(msg.parameter(), "TP");
    assert_eq!(msg.identification.reference_time, reference);
    assert_eq!(msg.valid_time().unwrap(), reference + Duration::hours(3));
}

#[test]
fn test_instantaneous_valid_time_uses_forecast_hour() {
    let msg = read_single(
        Grib2Builder::new_tot_prec()
            .with_parameter(1, 8)
            .with_forecast_hour(6)
            .build(),
    );

    assert_eq!(msg.product_definition.template, 0);
    assert_eq!(msg.product_definition.time_unit, TimeUnit::Hour);
    assert_eq!(msg.parameter(), "APCP");
    let reference = msg.identification.reference_time;
    assert_eq!(msg.valid_time().unwrap(), reference + Duration::hours(6));
}

#[test]
fn test_unpack_values() {
    let values = create_test_grid(4, 3);
    let msg = read_single(Grib2Builder::new_tot_prec().with_data(values.clone()).build());

    let unpacked = msg.unpack_data().unwrap();
    assert_slices_approx_eq!(unpacked, values, 0.1);
}

#[test]
fn test_unpack_fractional_values() {
    // Range below 65535 gives a negative binary scale factor
    let values: Vec<f32> = (0..12).map(|i| i as f32 * 0.125).collect();
    let msg = read_single(Grib2Builder::new_tot_prec().with_data(values.clone()).build());

    assert!(msg.data_representation.binary_scale_factor < 0);
    assert_slices_approx_eq!(msg.unpack_data().unwrap(), values, 1e-4);
}

#[test]
fn test_bitmap_marks_missing_as_nan() {
    let mut values: Vec<f32> = (0..12).map(|i| i as f32).collect();
    values[1] = f32::NAN;
    values[10] = f32::NAN;

    let msg = read_single(Grib2Builder::new_tot_prec().with_data(values).build());
    assert!(msg.bitmap.is_some());
    assert_eq!(msg.data_representation.num_data_points, 10);

    let unpacked = msg.unpack_data().unwrap();
    assert!(unpacked[1].is_nan());
    assert!(unpacked[10].is_nan());
    assert_approx_eq!(unpacked[2], 2.0, 1e-3);
    assert_approx_eq!(unpacked[11], 11.0, 1e-3);
}

#[test]
fn test_reader_walks_multiple_messages() {
    let data = build_grib2_file(&[
        Grib2Builder::new_tot_prec().with_accumulation_hours(1),
        Grib2Builder::new_tot_prec().with_accumulation_hours(2),
    ]);

    let messages = Grib2Reader::new(Bytes::from(data)).read_all().unwrap();
    assert_eq!(messages.len(), 2);
    let steps: Vec<_> = messages
        .iter()
        .map(|m| m.valid_time().unwrap() - m.identification.reference_time)
        .collect();
    assert_eq!(steps, vec![Duration::hours(1), Duration::hours(2)]);
}

#[test]
fn test_reader_skips_leading_garbage() {
    let mut data = b"junk".to_vec();
    data.extend(Grib2Builder::new_tot_prec().build());

    let messages = Grib2Reader::new(Bytes::from(data)).read_all().unwrap();
    assert_eq!(messages.len(), 1);
}

#[test]
fn test_empty_input_has_no_messages() {
    let mut reader = Grib2Reader::new(Bytes::new());
    assert!(reader.next_message().unwrap().is_none());
}

#[test]
fn test_truncated_message_is_rejected() {
    let mut data = Grib2Builder::new_tot_prec().build();
    data.truncate(data.len() - 10);

    let err = Grib2Reader::new(Bytes::from(data)).next_message().unwrap_err();
    assert!(matches!(err, Grib2Error::InvalidFormat(_)));
}

#[test]
fn test_unsupported_grid_template() {
    let mut data = Grib2Builder::new_tot_prec().build();
    // Section 3 starts after section 0 (16) and section 1 (21); template at +12
    let template_offset = 16 + 21 + 12;
    data[template_offset..template_offset + 2].copy_from_slice(&30u16.to_be_bytes());

    let err = Grib2Reader::new(Bytes::from(data)).next_message().unwrap_err();
    assert!(matches!(
        err,
        Grib2Error::UnsupportedTemplate { section: 3, template: 30 }
    ));
}
