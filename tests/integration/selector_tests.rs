//! Patch selector tests with custom criteria and worker counts.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use patch_miner::config::{MiningConfig, PatchQuota};
use patch_miner::criteria::{AlphaChannelCheck, CriteriaChain, PatchSizeCheck};
use patch_miner::driver::generate_initial_mask;
use patch_miner::patch::Patch;
use patch_miner::selector::{MiningPlan, PatchFormat, PatchSelector, PatchWriter, ReadType};
use patch_miner::slide::{SlideOptions, SlideSource};

use super::test_utils::*;

async fn open_fixture(dir: &Path, source: &TrackingSlideSource) -> TrackingSlide {
    let path = write_slide(dir, "case.png", &tissue_image(1024, 1024));
    source.open(&path, &SlideOptions::default()).await.unwrap()
}

async fn plan_for(slide: &TrackingSlide, criteria: CriteriaChain) -> MiningPlan {
    let (mask, scale) = generate_initial_mask(slide, 16, &Default::default())
        .await
        .unwrap();
    MiningPlan {
        mask: Arc::new(mask),
        scale,
        criteria: Arc::new(criteria),
        label_map: None,
    }
}

fn standard_chain() -> CriteriaChain {
    let mut chain = CriteriaChain::new();
    chain.register(AlphaChannelCheck).register(PatchSizeCheck::new(64, 64));
    chain
}

#[tokio::test]
async fn test_custom_criterion_sees_every_rendered_patch() {
    let dir = tempfile::tempdir().unwrap();
    let source = TrackingSlideSource::new();
    let slide = Arc::new(open_fixture(dir.path(), &source).await);

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let mut chain = standard_chain();
    chain.register(move |_: &Patch| {
        counter.fetch_add(1, Ordering::SeqCst);
        true
    });

    let plan = plan_for(&slide, chain).await;
    let mut config = MiningConfig::new(16, (64, 64));
    config.read_type = ReadType::Sequential;

    let summary = PatchSelector::new(Arc::clone(&slide), config)
        .with_workers(1)
        .mine(&plan, PatchQuota::Limit(8), None)
        .await
        .unwrap();

    assert_eq!(summary.accepted, 8);
    // Only patches that passed the built-in checks reach the custom one.
    assert_eq!(seen.load(Ordering::SeqCst), summary.accepted);
    assert_eq!(source.counts.regions(), summary.examined);
}

#[tokio::test]
async fn test_rejecting_criterion_blocks_everything() {
    let dir = tempfile::tempdir().unwrap();
    let source = TrackingSlideSource::new();
    let slide = Arc::new(open_fixture(dir.path(), &source).await);

    let mut chain = standard_chain();
    chain.register(|_: &Patch| false);
    let plan = plan_for(&slide, chain).await;

    let summary = PatchSelector::new(slide, MiningConfig::new(16, (64, 64)))
        .with_workers(8)
        .mine(&plan, PatchQuota::UntilSaturation, None)
        .await
        .unwrap();

    assert_eq!(summary.accepted, 0);
    assert!(summary.saturated);
    assert_eq!(summary.rejected, summary.examined);
    assert_eq!(summary.examined, plan.mask.count_valid());
}

#[tokio::test]
async fn test_seeded_runs_match_across_worker_counts() {
    let dir = tempfile::tempdir().unwrap();
    let source = TrackingSlideSource::new();
    let slide = Arc::new(open_fixture(dir.path(), &source).await);
    let plan = plan_for(&slide, standard_chain()).await;

    let mut config = MiningConfig::new(16, (64, 64));
    config.read_type = ReadType::Random;
    config.seed = Some(2024);

    let mut runs = Vec::new();
    for workers in [1, 3, 12] {
        let summary = PatchSelector::new(Arc::clone(&slide), config.clone())
            .with_workers(workers)
            .mine(&plan, PatchQuota::Limit(15), None)
            .await
            .unwrap();
        runs.push(summary.rows);
    }

    assert_eq!(runs[0].len(), 15);
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0], runs[2]);
}

#[tokio::test]
async fn test_overlap_factor_allows_denser_sampling() {
    let dir = tempfile::tempdir().unwrap();
    let source = TrackingSlideSource::new();
    let slide = Arc::new(open_fixture(dir.path(), &source).await);
    let plan = plan_for(&slide, standard_chain()).await;

    let mut config = MiningConfig::new(16, (64, 64));
    config.read_type = ReadType::Sequential;

    let strict = PatchSelector::new(Arc::clone(&slide), config.clone())
        .mine(&plan, PatchQuota::UntilSaturation, None)
        .await
        .unwrap();

    config.overlap_factor = 0.5;
    let relaxed = PatchSelector::new(Arc::clone(&slide), config)
        .mine(&plan, PatchQuota::UntilSaturation, None)
        .await
        .unwrap();

    assert!(strict.accepted > 0);
    assert!(relaxed.accepted > strict.accepted);
}

#[tokio::test]
async fn test_jpeg_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let source = TrackingSlideSource::new();
    let slide = Arc::new(open_fixture(dir.path(), &source).await);
    let plan = plan_for(&slide, standard_chain()).await;

    let out = dir.path().join("jpeg");
    std::fs::create_dir(&out).unwrap();
    let writer = PatchWriter::new(&out, "case", PatchFormat::Jpeg, 85);

    let summary = PatchSelector::new(slide, MiningConfig::new(16, (64, 64)))
        .with_writer(writer)
        .mine(&plan, PatchQuota::Limit(3), None)
        .await
        .unwrap();

    assert_eq!(count_files(&out, "jpg"), 3);
    for row in &summary.rows {
        let path = row.path.as_ref().unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("case_{}_{}.jpg", row.coordinate.x, row.coordinate.y));
        assert_eq!(image::open(path).unwrap().width(), 64);
    }
}
