// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `vit-forge sweep` command: export the full resolution grid.
//!
//! Each height × width combination becomes one artifact. Failed
//! combinations are reported at the end instead of aborting the grid, so
//! a partial artifact set is always produced.

use crate::commands::parse_size_list;
use exporter::{Exporter, Sweep, SweepConfig};
use std::path::PathBuf;

pub async fn execute(
    config_file: Option<PathBuf>,
    model: PathBuf,
    heights: Option<String>,
    widths: Option<String>,
    batch: usize,
    opset: u32,
    out_dir: PathBuf,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║            vit-forge · Resolution Sweep             ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    // ── Configuration ──────────────────────────────────────────
    let config = match config_file {
        Some(path) => {
            println!("  Config file: {}", path.display());
            let text = std::fs::read_to_string(&path)?;
            toml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("bad sweep config '{}': {e}", path.display()))?
        }
        None => {
            let heights = match heights {
                Some(list) => parse_size_list(&list)?,
                None => SweepConfig::default().heights,
            };
            let widths = match widths {
                Some(list) => parse_size_list(&list)?,
                None => heights.clone(),
            };
            SweepConfig {
                heights,
                widths,
                batch_size: batch,
                opset_version: opset,
                out_dir: out_dir.clone(),
                ..SweepConfig::default()
            }
        }
    };

    println!("  Config:");
    println!("   Model:   {}", model.display());
    println!("   Heights: {:?}", config.heights);
    println!("   Widths:  {:?}", config.widths);
    println!("   Batch:   {} (opset {})", config.batch_size, config.opset_version);
    println!("   Out dir: {}", config.out_dir.display());
    println!();

    std::fs::create_dir_all(&config.out_dir)?;

    // ── Sweep ──────────────────────────────────────────────────
    let exporter = Exporter::open(&model)
        .map_err(|e| anyhow::anyhow!("failed to open model at '{}': {e}", model.display()))?;

    let total = config.heights.len() * config.widths.len();
    println!("  Exporting {total} combinations...");
    println!();

    let report = Sweep::new(&exporter, config).run();

    // ── Per-combination results ────────────────────────────────
    println!(
        "  {:<12} {:<8} {}",
        "Resolution", "Status", "Artifact / Error",
    );
    println!("  {}", "-".repeat(64));
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(r) => println!(
                "  {:<12} {:<8} {}",
                format!("{}x{}", outcome.height, outcome.width),
                "ok",
                r.path.display(),
            ),
            Err(e) => println!(
                "  {:<12} {:<8} {}",
                format!("{}x{}", outcome.height, outcome.width),
                "FAILED",
                e,
            ),
        }
    }
    println!();
    println!("  {}", report.summary());
    println!();

    if report.failed() == report.outcomes.len() {
        anyhow::bail!("every combination failed");
    }
    Ok(())
}
