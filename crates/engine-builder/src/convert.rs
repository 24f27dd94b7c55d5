// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! One-call artifact → engine conversion against an explicit cache file.
//!
//! This is the unit the CLI and the batch drivers call: open artifact,
//! load (or create) the timing cache, build, write the engine, write the
//! cache back with whatever was learned. The cache file is created empty
//! if absent so downstream tooling can always assume it exists.

use crate::engine::EngineBuilder;
use crate::store::load_cache_file;
use crate::tuner::TunerStats;
use crate::{BuildError, BuilderConfig};
use graph_ir::Artifact;
use std::path::{Path, PathBuf};

/// Result of one [`compile_artifact`] call.
#[derive(Debug)]
pub struct CompileReport {
    /// Where the engine was written.
    pub engine_path: PathBuf,
    /// Engine file size in bytes.
    pub engine_bytes: u64,
    /// Kernel bindings in the engine.
    pub num_bindings: usize,
    /// Sum of per-node measured latencies, in nanoseconds.
    pub estimated_latency_ns: u64,
    /// Timing-cache entries after the build.
    pub cache_entries: usize,
    /// Tuner hit/miss counters for the build.
    pub stats: TunerStats,
}

impl CompileReport {
    /// Returns a one-line description for logs and CLI output.
    pub fn summary(&self) -> String {
        format!(
            "compiled {} ({} bytes, {} bindings, est. {:.2} ms) — {} hits, {} tuned, cache now {} entries",
            self.engine_path.display(),
            self.engine_bytes,
            self.num_bindings,
            self.estimated_latency_ns as f64 / 1_000_000.0,
            self.stats.hits,
            self.stats.misses,
            self.cache_entries,
        )
    }
}

/// Compiles an artifact into an engine file, reusing and updating the
/// timing cache at `cache_path`.
pub fn compile_artifact(
    artifact_path: &Path,
    engine_path: &Path,
    cache_path: &Path,
    config: &BuilderConfig,
) -> Result<CompileReport, BuildError> {
    // An absent cache file becomes a valid empty one before anything
    // else touches it.
    if !cache_path.exists() {
        if let Some(parent) = cache_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(cache_path, [])?;
        tracing::info!("created empty timing cache at {}", cache_path.display());
    }

    let artifact = Artifact::open(artifact_path)?;
    tracing::info!("{}", artifact.summary());

    let mut cache = load_cache_file(cache_path, &config.device, config.ignore_cache_mismatch)?;
    tracing::info!("{}", cache.summary());

    let (engine, stats) = EngineBuilder::new(config.clone())?
        .parse(&artifact)?
        .build(&mut cache)?;

    let engine_bytes = engine.write(engine_path)?;
    std::fs::write(cache_path, cache.to_bytes())?;

    Ok(CompileReport {
        engine_path: engine_path.to_path_buf(),
        engine_bytes,
        num_bindings: engine.bindings.len(),
        estimated_latency_ns: engine.estimated_latency_ns(),
        cache_entries: cache.len(),
        stats,
    })
}
