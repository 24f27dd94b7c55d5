// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: export → compile → cache-merge pipeline.
//!
//! These tests exercise the complete flow from checkpoint export through
//! engine compilation to timing-cache persistence, proving the crates
//! compose end-to-end and that a warm cache actually skips tuning.

use engine_builder::{
    compile_artifact, BuilderConfig, BuilderFlag, CacheStore, Engine, MergeOutcome, Precision,
    TimingCache, CACHE_FILE,
};
use exporter::{ExportConfig, Exporter, WeightStore};
use graph_ir::ModelManifest;
use std::path::Path;

// ── Helpers ────────────────────────────────────────────────────

fn exporter() -> Exporter {
    let manifest = ModelManifest::from_json(
        r#"{
            "name": "dinov2_vits14",
            "architecture": "dinov2",
            "patch_size": 14,
            "embed_dim": 32,
            "depth": 2,
            "num_heads": 4
        }"#,
    )
    .unwrap();
    Exporter::from_parts(manifest, WeightStore::synthetic())
}

/// Exports a small synthetic artifact and returns its path.
fn export_artifact(dir: &Path, height: usize, width: usize) -> std::path::PathBuf {
    let report = exporter()
        .export(&ExportConfig {
            image_height: height,
            image_width: width,
            output: Some(dir.join(format!("test_1-3-{height}-{width}.vitir"))),
            ..ExportConfig::new(".")
        })
        .unwrap();
    report.path
}

// ── Full pipeline ──────────────────────────────────────────────

#[test]
fn test_export_then_compile() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = export_artifact(dir.path(), 126, 126);
    let engine_path = dir.path().join("test.engine");
    let cache_path = dir.path().join(CACHE_FILE);

    let report = compile_artifact(
        &artifact,
        &engine_path,
        &cache_path,
        &BuilderConfig::default(),
    )
    .unwrap();

    assert!(engine_path.exists());
    assert!(cache_path.exists());
    assert!(report.engine_bytes > 0);
    assert!(report.num_bindings > 0);
    assert_eq!(report.stats.hits, 0);
    assert!(report.stats.misses > 0);
    assert!(report.cache_entries > 0);

    // The engine reads back with the exported geometry:
    // 126/14 = 9 patches per side → 81 patch tokens.
    let engine = Engine::read_from(&engine_path).unwrap();
    assert_eq!(engine.name, "dinov2_vits14");
    assert_eq!(engine.input_name, "input");
    assert_eq!(engine.input_shape.dims(), &[1, 3, 126, 126]);
    assert_eq!(engine.output_name, "unpooled_features");
    assert_eq!(engine.output_shape.dims(), &[1, 81, 32]);
}

#[test]
fn test_warm_rebuild_skips_tuning() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = export_artifact(dir.path(), 126, 126);
    let cache_path = dir.path().join(CACHE_FILE);
    let config = BuilderConfig::default();

    let cold = compile_artifact(
        &artifact,
        &dir.path().join("a.engine"),
        &cache_path,
        &config,
    )
    .unwrap();
    assert!(cold.stats.misses > 0);

    // Same artifact, populated cache: every node is a lookup.
    let warm = compile_artifact(
        &artifact,
        &dir.path().join("b.engine"),
        &cache_path,
        &config,
    )
    .unwrap();
    assert_eq!(warm.stats.misses, 0);
    assert_eq!(warm.stats.hits, cold.stats.hits + cold.stats.misses);
    assert_eq!(warm.cache_entries, cold.cache_entries);
}

#[test]
fn test_cache_transfers_between_resolutions() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join(CACHE_FILE);
    let config = BuilderConfig::default();

    let small = export_artifact(dir.path(), 126, 126);
    compile_artifact(&small, &dir.path().join("s.engine"), &cache_path, &config).unwrap();

    // A different resolution changes token counts, so its matmul-shaped
    // nodes re-tune, but shape-independent entries could never transfer
    // anyway — the build must simply succeed and grow the cache.
    let large = export_artifact(dir.path(), 224, 224);
    let report =
        compile_artifact(&large, &dir.path().join("l.engine"), &cache_path, &config).unwrap();
    assert!(report.stats.misses > 0);

    let cache = TimingCache::from_bytes(&std::fs::read(&cache_path).unwrap(), "generic", false)
        .unwrap();
    assert_eq!(cache.len(), report.cache_entries);
}

#[test]
fn test_fp16_build_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = export_artifact(dir.path(), 126, 126);
    let engine_path = dir.path().join("half.engine");

    let config = BuilderConfig {
        flags: vec![BuilderFlag::Fp16],
        ..Default::default()
    };
    compile_artifact(&artifact, &engine_path, &dir.path().join(CACHE_FILE), &config).unwrap();

    let engine = Engine::read_from(&engine_path).unwrap();
    assert_eq!(engine.precision, Precision::F16);

    let full_path = dir.path().join("full.engine");
    compile_artifact(
        &artifact,
        &full_path,
        &dir.path().join("full.timing"),
        &BuilderConfig::default(),
    )
    .unwrap();
    let full = Engine::read_from(&full_path).unwrap();
    assert_eq!(engine.weight_bytes() * 2, full.weight_bytes());
}

#[test]
fn test_compile_rejects_missing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let result = compile_artifact(
        &dir.path().join("nope.vitir"),
        &dir.path().join("nope.engine"),
        &dir.path().join(CACHE_FILE),
        &BuilderConfig::default(),
    );
    assert!(result.is_err());
}

// ── Cache store lifecycle ──────────────────────────────────────

#[test]
fn test_store_seed_build_merge_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join("timing_caches");
    let init_dir = dir.path().join("timing_caches_init");
    let store = CacheStore::new(&cache_dir, &init_dir, "generic", true);

    // Cold start: no seed anywhere.
    store.initialize();
    assert!(store.load().unwrap().is_empty());

    // Build against the runtime cache file.
    let artifact = export_artifact(dir.path(), 126, 126);
    let report = compile_artifact(
        &artifact,
        &dir.path().join("x.engine"),
        &store.cache_path(),
        &BuilderConfig::default(),
    )
    .unwrap();

    // Merge a second, partially overlapping cache in.
    let mut fresh = TimingCache::new("generic");
    fresh.insert(
        0xdead_beef,
        engine_builder::TimingRecord {
            kernel: "external.kernel".into(),
            latency_ns: 1,
            workspace_bytes: 0,
        },
    );
    let outcome = store.merge(&fresh).unwrap();
    assert!(matches!(
        outcome,
        MergeOutcome::Combined { fully: true, .. }
    ));

    let merged = store.load().unwrap();
    assert_eq!(merged.len(), report.cache_entries + 1);
    assert!(merged.get(0xdead_beef).is_some());
}

#[test]
fn test_store_initialize_seeds_next_machine() {
    let dir = tempfile::tempdir().unwrap();

    // Machine A builds and persists its cache.
    let a_cache = dir.path().join("a").join("timing_caches");
    let a = CacheStore::new(&a_cache, dir.path().join("a").join("init"), "generic", true);
    let artifact = export_artifact(dir.path(), 126, 126);
    compile_artifact(
        &artifact,
        &dir.path().join("a.engine"),
        &a.cache_path(),
        &BuilderConfig::default(),
    )
    .unwrap();

    // Machine B ships A's cache as its seed.
    let b = CacheStore::new(
        dir.path().join("b").join("timing_caches"),
        &a_cache,
        "generic",
        true,
    );
    b.initialize();

    // B's first build is fully warm.
    let report = compile_artifact(
        &artifact,
        &dir.path().join("b.engine"),
        &b.cache_path(),
        &BuilderConfig::default(),
    )
    .unwrap();
    assert_eq!(report.stats.misses, 0);
    assert!(report.stats.hits > 0);
}
