// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `vit-forge export` command: export a checkpoint into an IR artifact.

use exporter::{ExportConfig, Exporter};
use std::path::PathBuf;

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    config_file: Option<PathBuf>,
    model: PathBuf,
    height: usize,
    width: usize,
    batch: usize,
    opset: u32,
    no_fold: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║             vit-forge · Artifact Export             ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    // ── Configuration ──────────────────────────────────────────
    let config = match config_file {
        Some(path) => {
            println!("  Config file: {}", path.display());
            ExportConfig::from_file(&path)?
        }
        None => ExportConfig {
            image_height: height,
            image_width: width,
            batch_size: batch,
            opset_version: opset,
            fold_constants: !no_fold,
            output,
            ..ExportConfig::new(&model)
        },
    };

    println!("  Config:");
    println!("   Model:      {}", config.model_dir.display());
    println!(
        "   Resolution: {}x{} (batch {})",
        config.image_height, config.image_width, config.batch_size,
    );
    println!("   Opset:      {}", config.opset_version);
    println!("   Folding:    {}", config.fold_constants);
    println!();

    // ── Export ─────────────────────────────────────────────────
    println!("  [1/2] Opening checkpoint...");
    let exporter = Exporter::open(&config.model_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to open model at '{}': {e}",
            config.model_dir.display(),
        )
    })?;
    let manifest = exporter.manifest();
    println!(
        "        {} ({}, {} blocks, dim {}, patch {})",
        manifest.name, manifest.architecture, manifest.depth, manifest.embed_dim,
        manifest.patch_size,
    );
    println!();

    println!("  [2/2] Exporting...");
    let report = exporter.export(&config)?;
    println!();

    println!("  Results:");
    println!("   {}", report.summary());
    println!();

    Ok(())
}
