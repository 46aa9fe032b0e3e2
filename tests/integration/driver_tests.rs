//! End-to-end tests of `driver::run` over PNG and tiled TIFF fixture slides.

use serde_json::json;
use std::collections::HashSet;

use patch_miner::config::{MiningRequest, PatchQuota};
use patch_miner::driver;
use patch_miner::error::MiningError;
use patch_miner::slide::{AutoSlideSource, LocalSlideSource};

use super::test_utils::*;

fn standard_config() -> serde_json::Value {
    json!({
        "scale": 16,
        "patch_size": [64, 64],
        "read_type": "random",
        "seed": 11
    })
}

#[tokio::test]
async fn test_missing_slide_fails_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), standard_config());
    let output = dir.path().join("out");

    let missing = dir.path().join("absent.png");
    let mut request = MiningRequest::new(missing, PatchQuota::Limit(5), config);
    request.output_path = Some(output.clone());

    let source = TrackingSlideSource::new();
    let result = driver::run(&request, &source).await;

    assert!(matches!(result, Err(MiningError::SlideNotFound { .. })));
    assert_eq!(source.counts.opens(), 0);
    assert_eq!(source.counts.thumbnails(), 0);
    assert!(!output.exists());
}

#[tokio::test]
async fn test_creates_nested_output_directory() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "case.png", &tissue_image(1024, 1024));
    let config = write_config(dir.path(), standard_config());
    let output = dir.path().join("a").join("b").join("patches");

    let mut request = MiningRequest::new(slide, PatchQuota::Limit(4), config);
    request.output_path = Some(output.clone());
    request.output_csv = Some(dir.path().join("mined.csv"));

    let summary = driver::run(&request, &LocalSlideSource::new()).await.unwrap();

    assert!(output.is_dir());
    assert_eq!(summary.accepted, 4);
    assert_eq!(count_files(&output, "png"), 4);
    assert!(summary
        .rows
        .iter()
        .all(|row| row.path.as_ref().is_some_and(|p| p.starts_with(&output))));
    assert_eq!(manifest_coordinates(&dir.path().join("mined.csv")).len(), 4);
}

#[tokio::test]
async fn test_blank_slide_yields_zero_patches() {
    let dir = tempfile::tempdir().unwrap();
    let blank = image::RgbaImage::from_pixel(512, 512, BACKGROUND);
    let slide = write_slide(dir.path(), "blank.png", &blank);
    let config = write_config(dir.path(), standard_config());

    let request = MiningRequest::new(slide, PatchQuota::UntilSaturation, config);
    let source = TrackingSlideSource::new();
    let summary = driver::run(&request, &source).await.unwrap();

    assert_eq!(summary.accepted, 0);
    assert_eq!(summary.examined, 0);
    assert!(summary.saturated);
    assert_eq!(source.counts.thumbnails(), 1);
    assert_eq!(source.counts.regions(), 0);
}

#[tokio::test]
async fn test_accepted_patches_lie_on_tissue() {
    let dir = tempfile::tempdir().unwrap();
    let image = tissue_image(1024, 1024);
    let slide = write_slide(dir.path(), "case.png", &image);
    let config = write_config(dir.path(), standard_config());

    let request = MiningRequest::new(slide, PatchQuota::Limit(10), config);
    let summary = driver::run(&request, &LocalSlideSource::new()).await.unwrap();

    assert_eq!(summary.accepted, 10);
    for row in &summary.rows {
        let c = row.coordinate;
        assert_eq!((c.width, c.height, c.level), (64, 64, 0));
        assert!(c.x + c.width <= 1024 && c.y + c.height <= 1024);
        let has_tissue = (c.y..c.y + c.height)
            .any(|y| (c.x..c.x + c.width).any(|x| *image.get_pixel(x, y) == TISSUE));
        assert!(has_tissue, "patch at ({}, {}) has no tissue", c.x, c.y);
    }
}

#[tokio::test]
async fn test_replay_is_faithful() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "case.png", &tissue_image(1024, 1024));
    let config = write_config(dir.path(), standard_config());
    let mined_csv = dir.path().join("mined.csv");
    let replayed_csv = dir.path().join("replayed.csv");

    let mut mine = MiningRequest::new(slide.clone(), PatchQuota::Limit(12), config.clone());
    mine.output_csv = Some(mined_csv.clone());
    let mined = driver::run(&mine, &LocalSlideSource::new()).await.unwrap();
    assert_eq!(mined.accepted, 12);

    let replay_out = dir.path().join("replayed");
    let mut replay = MiningRequest::new(slide, PatchQuota::Limit(1), config);
    replay.input_csv = Some(mined_csv.clone());
    replay.output_csv = Some(replayed_csv.clone());
    replay.output_path = Some(replay_out.clone());

    let source = TrackingSlideSource::new();
    let replayed = driver::run(&replay, &source).await.unwrap();

    // No mask work in replay, and the quota does not apply.
    assert_eq!(source.counts.thumbnails(), 0);
    assert_eq!(replayed.accepted, 12);
    assert_eq!(source.counts.regions(), 12);

    let before: HashSet<_> = manifest_coordinates(&mined_csv).into_iter().collect();
    let after: HashSet<_> = manifest_coordinates(&replayed_csv).into_iter().collect();
    assert_eq!(before, after);
    assert_eq!(count_files(&replay_out, "png"), 12);
}

#[tokio::test]
async fn test_replay_ignores_mask() {
    let dir = tempfile::tempdir().unwrap();
    let blank = image::RgbaImage::from_pixel(512, 512, BACKGROUND);
    let slide = write_slide(dir.path(), "blank.png", &blank);
    let config = write_config(dir.path(), standard_config());
    let input_csv = dir.path().join("in.csv");
    std::fs::write(&input_csv, "x,y\n0,0\n128,256\n448,448\n").unwrap();

    let mut request = MiningRequest::new(slide, PatchQuota::UntilSaturation, config);
    request.input_csv = Some(input_csv);
    let summary = driver::run(&request, &LocalSlideSource::new()).await.unwrap();

    assert_eq!(summary.accepted, 3);
    assert_eq!(summary.rows[1].coordinate.x, 128);
    assert_eq!(summary.rows[1].coordinate.y, 256);
}

#[tokio::test]
async fn test_read_failures_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "case.png", &tissue_image(512, 512));
    let config = write_config(dir.path(), standard_config());

    let request = MiningRequest::new(slide, PatchQuota::Limit(3), config);
    let source = TrackingSlideSource::failing_regions();
    let summary = driver::run(&request, &source).await.unwrap();

    assert_eq!(summary.accepted, 0);
    assert!(summary.saturated);
    assert!(summary.read_failures > 0);
    assert_eq!(summary.read_failures, source.counts.regions());
}

#[tokio::test]
async fn test_invalid_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "case.png", &tissue_image(256, 256));
    let config = write_config(dir.path(), json!({ "patch_size": [64, 64] }));

    let request = MiningRequest::new(slide, PatchQuota::Limit(1), config);
    let source = TrackingSlideSource::new();
    let result = driver::run(&request, &source).await;

    assert!(matches!(result, Err(MiningError::Config(_))));
    assert_eq!(source.counts.opens(), 0);
}

#[tokio::test]
async fn test_label_map_annotates_rows() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "case.png", &tissue_image(1024, 1024));
    let mut config = standard_config();
    config["labels"] = json!([7]);
    let config = write_config(dir.path(), config);

    // Thumbnail-space label map: class 7 on the right half, 3 on the left.
    let labels =
        image::GrayImage::from_fn(64, 64, |x, _| image::Luma([if x >= 32 { 7 } else { 3 }]));
    let label_path = dir.path().join("labels.png");
    labels.save(&label_path).unwrap();

    let mut request = MiningRequest::new(slide, PatchQuota::Limit(5), config);
    request.label_map_path = Some(label_path);
    let summary = driver::run(&request, &LocalSlideSource::new()).await.unwrap();

    assert_eq!(summary.accepted, 5);
    assert!(summary.rows.iter().all(|row| row.label == Some(7)));
}

#[tokio::test]
async fn test_mines_tiled_pyramid() {
    let dir = tempfile::tempdir().unwrap();
    let image = tissue_image(1024, 1024);
    let slide = write_tiled_slide(dir.path(), "case.tif", &image, &[1, 4], 128);
    let config = write_config(dir.path(), standard_config());
    let output = dir.path().join("out");

    let mut request = MiningRequest::new(slide, PatchQuota::Limit(6), config);
    request.output_path = Some(output.clone());
    let summary = driver::run(&request, &AutoSlideSource::new()).await.unwrap();

    assert_eq!(summary.accepted, 6);
    for row in &summary.rows {
        let c = row.coordinate;
        let expected = image::imageops::crop_imm(&image, c.x, c.y, c.width, c.height).to_image();
        let written = image::open(row.path.as_ref().unwrap()).unwrap().to_rgba8();
        assert_eq!(written, expected, "patch at ({}, {})", c.x, c.y);
    }
}

#[tokio::test]
async fn test_yaml_config() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "case.png", &tissue_image(1024, 1024));
    let config = dir.path().join("config.yaml");
    std::fs::write(
        &config,
        "scale: 16\npatch_size: [64, 64]\nread_type: random\nseed: 11\n",
    )
    .unwrap();

    let request = MiningRequest::new(slide, PatchQuota::Limit(3), config);
    let summary = driver::run(&request, &AutoSlideSource::new()).await.unwrap();

    assert_eq!(summary.accepted, 3);
    assert!(summary.rows.iter().all(|row| row.coordinate.width == 64));
}
