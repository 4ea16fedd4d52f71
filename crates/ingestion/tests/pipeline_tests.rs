//! End-to-end runs against a scripted server and a temp directory.

mod common;

use std::sync::Arc;

use common::{
    publish_grids, publish_series, read_wgf4, test_config, MockHttpClient, BASE_URL, COLS, ROWS,
};
use ingestion::{
    Grib2GridLoader, IngestionError, OnFailure, Pipeline, PipelineConfig, EMPTY_VALUE,
};
use test_utils::fixtures::{grid, index};
use test_utils::{assert_slices_approx_eq, temp_test_dir, Grib2Builder};

fn pipeline(config: PipelineConfig, client: &Arc<MockHttpClient>) -> Pipeline {
    Pipeline::new(config, client.clone(), Arc::new(Grib2GridLoader)).unwrap()
}

#[tokio::test]
async fn test_three_entries_produce_two_outputs() {
    let dir = temp_test_dir();
    let client = Arc::new(MockHttpClient::new());
    let series = publish_series(&client, 3);
    let config = test_config(dir.path());
    let model_dir = config.output_root.join(&config.model);

    let summary = pipeline(config, &client).run().await.unwrap();

    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.cache_hits, 0);
    assert_eq!(summary.written, 2);
    assert_eq!(summary.skipped, 0);

    let expected_dirs = [
        model_dir.join("01:05:2024_13:00_1714568400"),
        model_dir.join("01:05:2024_14:00_1714572000"),
    ];
    assert_eq!(
        summary.outputs,
        expected_dirs
            .iter()
            .map(|d| d.join("PRATE.wgf4"))
            .collect::<Vec<_>>()
    );

    let mut dirs: Vec<_> = std::fs::read_dir(&model_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    dirs.sort();
    assert_eq!(dirs, expected_dirs.to_vec());

    for (i, path) in summary.outputs.iter().enumerate() {
        let size = std::fs::metadata(path).unwrap().len() as usize;
        assert_eq!(size, ROWS * COLS * 4 + 32);

        let (header, sentinel, payload) = read_wgf4(path);
        assert_eq!(header, [47_500_000, 47_540_000, 5_000_000, 5_060_000, 20_000, 20_000, 1]);
        assert_eq!(sentinel, EMPTY_VALUE);

        let expected: Vec<f32> = series.grids[i + 1]
            .iter()
            .zip(&series.grids[i])
            .map(|(b, a)| b - a)
            .collect();
        assert_slices_approx_eq!(payload, expected, 1e-3);
    }

    // The icosahedral decoy is never requested
    assert!(client
        .calls()
        .iter()
        .all(|url| url == BASE_URL || url.contains(index::MARKER)));
}

#[tokio::test]
async fn test_second_run_uses_cache() {
    let dir = temp_test_dir();
    let client = Arc::new(MockHttpClient::new());
    publish_series(&client, 3);

    let first = pipeline(test_config(dir.path()), &client).run().await.unwrap();
    let fetched_after_first = client.entry_calls();
    let second = pipeline(test_config(dir.path()), &client).run().await.unwrap();

    assert_eq!(fetched_after_first, 3);
    assert_eq!(client.entry_calls(), 3);
    assert_eq!(second.cache_hits, 3);
    assert_eq!(second.fetched, 0);
    assert_eq!(second.outputs, first.outputs);
}

#[tokio::test]
async fn test_flaky_downloads_are_retried() {
    let dir = temp_test_dir();
    let client = Arc::new(MockHttpClient::new());
    let series = publish_series(&client, 2);
    client.fail_times(&series.url(1), 2);

    let summary = pipeline(test_config(dir.path()), &client).run().await.unwrap();

    assert_eq!(summary.written, 1);
    assert_eq!(client.call_count(&series.url(1)), 3);
}

#[tokio::test]
async fn test_download_failure_aborts_run() {
    let dir = temp_test_dir();
    let client = Arc::new(MockHttpClient::new());
    let series = publish_series(&client, 3);
    client.fail_times(&series.url(1), u32::MAX);
    let config = test_config(dir.path());
    let cache_dir = config.cache_dir.clone();
    let model_dir = config.output_root.join(&config.model);

    let err = pipeline(config, &client).run().await.unwrap_err();

    assert!(matches!(err, IngestionError::Network { attempts: 3, .. }));
    // The other entries still completed and stay cached for the next run
    assert_eq!(std::fs::read_dir(&cache_dir).unwrap().count(), 2);
    assert_eq!(std::fs::read_dir(&model_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn test_missing_cells_are_written_as_sentinel() {
    let dir = temp_test_dir();
    let client = Arc::new(MockHttpClient::new());
    let mut first = vec![0.0f32; ROWS * COLS];
    let mut second = vec![1.5f32; ROWS * COLS];
    first[0] = f32::NAN;
    second[5] = f32::NAN;
    publish_grids(&client, vec![first, second]);

    let summary = pipeline(test_config(dir.path()), &client).run().await.unwrap();

    let (_, _, payload) = read_wgf4(&summary.outputs[0]);
    assert_eq!(payload[0], EMPTY_VALUE);
    assert_eq!(payload[5], EMPTY_VALUE);
    assert_eq!(payload.iter().filter(|&&v| v == EMPTY_VALUE).count(), 2);
    assert!(payload
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 0 && *i != 5)
        .all(|(_, &v)| (v - 1.5).abs() < 1e-3));
}

#[tokio::test]
async fn test_header_uses_scaled_grid_bounds() {
    let dir = temp_test_dir();
    let client = Arc::new(MockHttpClient::new());
    let names: Vec<String> = (0..2).map(|s| index::entry_name(index::MARKER, s)).collect();
    for (step, name) in names.iter().enumerate() {
        let grib = Grib2Builder::new_tot_prec()
            .with_bounds(
                grid::FIRST_LAT,
                grid::LAST_LAT,
                grid::FIRST_LON,
                grid::LAST_LON,
                grid::INCREMENT,
                grid::INCREMENT,
            )
            .with_accumulation_hours(step as u32)
            .with_constant_value(step as f32)
            .build();
        client.respond(&format!("{}{}", BASE_URL, name), common::bzip2(&grib));
    }
    let listed: Vec<&str> = names.iter().map(String::as_str).collect();
    client.respond(BASE_URL, index::listing(&listed));

    let summary = pipeline(test_config(dir.path()), &client).run().await.unwrap();

    let (header, _, _) = read_wgf4(&summary.outputs[0]);
    assert_eq!(header, grid::EXPECTED_HEADER);
}

#[tokio::test]
async fn test_empty_index_completes_without_output() {
    let dir = temp_test_dir();
    let client = Arc::new(MockHttpClient::new());
    client.respond(BASE_URL, index::listing(&[]));

    let summary = pipeline(test_config(dir.path()), &client).run().await.unwrap();

    assert_eq!(summary.discovered, 0);
    assert_eq!(summary.written, 0);
    assert!(summary.outputs.is_empty());
}

#[tokio::test]
async fn test_duplicate_entries_are_fetched_once() {
    let dir = temp_test_dir();
    let client = Arc::new(MockHttpClient::new());
    let series = publish_series(&client, 2);
    let listed = [
        series.names[0].as_str(),
        series.names[0].as_str(),
        series.names[1].as_str(),
    ];
    client.respond(BASE_URL, index::listing(&listed));

    let summary = pipeline(test_config(dir.path()), &client).run().await.unwrap();

    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.written, 1);
    assert_eq!(client.call_count(&series.url(0)), 1);
}

#[tokio::test]
async fn test_entries_sharing_a_cache_file_are_fetched_once() {
    let dir = temp_test_dir();
    let client = Arc::new(MockHttpClient::new());
    let series = publish_series(&client, 2);
    let gzip_twin = series.names[0].replace(".bz2", ".gz");
    let mirrored = format!("mirror/{}", series.names[0]);
    client.respond(&format!("{}{}", BASE_URL, gzip_twin), b"not served".to_vec());
    let listed = [
        series.names[0].as_str(),
        gzip_twin.as_str(),
        mirrored.as_str(),
        series.names[1].as_str(),
    ];
    client.respond(BASE_URL, index::listing(&listed));
    let config = test_config(dir.path());
    let cache_dir = config.cache_dir.clone();

    let summary = pipeline(config, &client).run().await.unwrap();

    assert_eq!(summary.discovered, 4);
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.cache_hits, 0);
    assert_eq!(summary.written, 1);
    assert_eq!(client.entry_calls(), 2);
    assert_eq!(client.call_count(&format!("{}{}", BASE_URL, gzip_twin)), 0);
    assert_eq!(std::fs::read_dir(&cache_dir).unwrap().count(), 2);
}

/// Occupy the output directory of `dir_name` with a plain file.
fn block_output_dir(config: &PipelineConfig, dir_name: &str) {
    let model_dir = config.output_root.join(&config.model);
    std::fs::create_dir_all(&model_dir).unwrap();
    std::fs::write(model_dir.join(dir_name), b"in the way").unwrap();
}

#[tokio::test]
async fn test_write_failure_is_retried_then_aborts() {
    let dir = temp_test_dir();
    let client = Arc::new(MockHttpClient::new());
    let series = publish_series(&client, 3);
    let config = test_config(dir.path());
    let max_attempts = config.processing.retry.max_attempts;
    block_output_dir(&config, "01:05:2024_13:00_1714568400");

    let err = pipeline(config, &client).run().await.unwrap_err();

    match err {
        IngestionError::Processing {
            entry,
            attempts,
            source,
        } => {
            assert_eq!(entry, series.names[1]);
            assert_eq!(attempts, max_attempts);
            assert!(matches!(*source, IngestionError::Filesystem { .. }));
        }
        other => panic!("expected Processing error, got {other}"),
    }
}

#[tokio::test]
async fn test_write_failure_with_skip_policy_restarts_baseline() {
    let dir = temp_test_dir();
    let client = Arc::new(MockHttpClient::new());
    let series = publish_series(&client, 4);
    let mut config = test_config(dir.path());
    config.processing.on_failure = OnFailure::Skip;
    let model_dir = config.output_root.join(&config.model);
    block_output_dir(&config, "01:05:2024_13:00_1714568400");

    let summary = pipeline(config, &client).run().await.unwrap();

    // 1 fails to write; 2 becomes the new baseline; 3 is written against 2
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.written, 1);
    assert_eq!(
        summary.outputs,
        vec![model_dir.join("01:05:2024_15:00_1714575600").join("PRATE.wgf4")]
    );

    let (_, _, payload) = read_wgf4(&summary.outputs[0]);
    let expected: Vec<f32> = series.grids[3]
        .iter()
        .zip(&series.grids[2])
        .map(|(b, a)| b - a)
        .collect();
    assert_slices_approx_eq!(payload, expected, 1e-3);
}

/// Publish four entries where the third one does not decode.
fn publish_with_corrupt_third(client: &MockHttpClient) -> common::Series {
    let series = publish_series(client, 4);
    client.respond(&series.url(2), common::bzip2(b"truncated download"));
    series
}

#[tokio::test]
async fn test_decode_failure_aborts_by_default() {
    let dir = temp_test_dir();
    let client = Arc::new(MockHttpClient::new());
    let series = publish_with_corrupt_third(&client);

    let err = pipeline(test_config(dir.path()), &client).run().await.unwrap_err();

    match err {
        IngestionError::Processing {
            entry,
            attempts,
            source,
        } => {
            assert_eq!(entry, series.names[2]);
            // Decode errors are not retried
            assert_eq!(attempts, 1);
            assert!(matches!(*source, IngestionError::Decode { .. }));
        }
        other => panic!("expected Processing error, got {other}"),
    }
}

#[tokio::test]
async fn test_skip_policy_restarts_baseline_after_failure() {
    let dir = temp_test_dir();
    let client = Arc::new(MockHttpClient::new());
    publish_with_corrupt_third(&client);
    let mut config = test_config(dir.path());
    config.processing.on_failure = OnFailure::Skip;
    let model_dir = config.output_root.join(&config.model);

    let summary = pipeline(config, &client).run().await.unwrap();

    // 0 -> 1 is written; 2 is skipped; 3 only re-establishes the baseline
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.written, 1);
    assert_eq!(
        summary.outputs,
        vec![model_dir.join("01:05:2024_13:00_1714568400").join("PRATE.wgf4")]
    );
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = temp_test_dir();
    let client = Arc::new(MockHttpClient::new());
    let mut config = test_config(dir.path());
    config.max_concurrent_downloads = 0;

    let result = Pipeline::new(config, client, Arc::new(Grib2GridLoader));
    assert!(matches!(result, Err(IngestionError::Config(_))));
}
