// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `vit-forge build` command: compile an artifact into an engine.
//!
//! Demonstrates the full type-state pipeline:
//! ```text
//! EngineBuilder<Idle> → parse → <Parsed> → build → Engine
//! ```
//! plus the cache lifecycle around it: seed the runtime cache, build
//! against it, merge the new measurements back.

use engine_builder::{compile_artifact, BuilderConfig, BuilderFlag, CacheStore, CACHE_FILE};
use std::path::PathBuf;

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    config_file: Option<PathBuf>,
    artifact: PathBuf,
    output: Option<PathBuf>,
    fp16: bool,
    workspace: String,
    device: String,
    cache_dir: String,
    strict_cache: bool,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║             vit-forge · Engine Builder              ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    // ── Configuration ──────────────────────────────────────────
    let config = match config_file {
        Some(path) => {
            println!("  Config file: {}", path.display());
            BuilderConfig::from_file(&path)?
        }
        None => {
            let mut flags = Vec::new();
            if fp16 {
                flags.push(BuilderFlag::Fp16);
            }
            BuilderConfig {
                flags,
                workspace,
                device,
                cache_dir,
                ignore_cache_mismatch: !strict_cache,
                ..BuilderConfig::default()
            }
        }
    };

    let engine_path = output.unwrap_or_else(|| artifact.with_extension("engine"));

    println!("  Config:");
    println!("   Artifact:  {}", artifact.display());
    println!("   Engine:    {}", engine_path.display());
    println!("   Precision: {}", config.precision());
    println!("   Workspace: {}", config.workspace);
    println!("   Device:    {}", config.device);
    println!("   Cache dir: {}", config.cache_dir);
    println!();

    // ── Cache seed ─────────────────────────────────────────────
    println!("  [1/3] Preparing timing cache...");
    let store = CacheStore::from_config(&config);
    store.initialize();
    let cache_path = store.cache_path();
    println!("        Cache: {}", cache_path.display());
    println!();

    // ── Build ──────────────────────────────────────────────────
    println!("  [2/3] Compiling...");
    let report = compile_artifact(&artifact, &engine_path, &cache_path, &config)?;
    println!();

    // ── Merge back ─────────────────────────────────────────────
    // compile_artifact already rewrote the cache file; report what it
    // looks like now.
    println!("  [3/3] Cache updated ({CACHE_FILE}).");
    println!();

    println!("  Results:");
    println!("   {}", report.summary());
    println!(
        "   Cache reuse: {} of {} nodes served from cache",
        report.stats.hits,
        report.stats.hits + report.stats.misses,
    );
    println!();

    Ok(())
}
