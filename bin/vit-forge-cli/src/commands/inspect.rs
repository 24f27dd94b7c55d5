// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `vit-forge inspect` command: display artifact structure and
//! memory estimates.
//!
//! Opens the artifact (header + mmap'd payload) and prints a detailed
//! breakdown of nodes, weight sizes, and what the kernel tuner would
//! pick at different workspace limits.

use crate::commands::truncate;
use engine_builder::{KernelTuner, Precision, TimingCache, WorkspaceLimit};
use std::path::PathBuf;

pub async fn execute(artifact: PathBuf) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║            vit-forge · Artifact Inspector           ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let art = graph_ir::Artifact::open(&artifact).map_err(|e| {
        anyhow::anyhow!("failed to open artifact '{}': {e}", artifact.display())
    })?;
    let graph = art.graph()?;

    // ── Summary ────────────────────────────────────────────────
    println!("  Artifact: {}", artifact.display());
    println!("  {}", art.summary());
    println!("  {}", graph.summary());
    println!("  Bindings: {} → {}", graph.input_name(), graph.output_name());
    println!(
        "  Payload: {} tensors, {:.2} MB",
        art.num_tensors(),
        art.payload_bytes() as f64 / (1024.0 * 1024.0),
    );
    println!();

    // ── Per-Node Detail ────────────────────────────────────────
    println!(
        "  {:<4} {:<26} {:<16} {:>10} {:>10} {:>6}",
        "Idx", "Name", "Op", "Weights", "Activ.", "#W",
    );
    println!("  {}", "-".repeat(78));

    for node in graph.iter_nodes() {
        let w_kb = node.weight_bytes() as f64 / 1024.0;
        let a_kb = node.activation_bytes() as f64 / 1024.0;
        println!(
            "  {:<4} {:<26} {:<16} {:>8.1} KB {:>8.1} KB {:>4}",
            node.index,
            truncate(&node.name, 26),
            node.op.as_str(),
            w_kb,
            a_kb,
            node.weight_names.len(),
        );
    }
    println!();

    // ── Kernel Selection Preview ───────────────────────────────
    // Dry-runs the tuner at a few workspace limits against a throwaway
    // cache to show how the binding set shifts under memory pressure.
    let limits = [
        WorkspaceLimit::from_mb(1),
        WorkspaceLimit::from_mb(64),
        WorkspaceLimit::from_mb(512),
    ];

    println!("  Kernel selection at different workspace limits:");
    println!(
        "  {:<26} {:>22} {:>22} {:>22}",
        "Node",
        limits[0].to_string(),
        limits[1].to_string(),
        limits[2].to_string(),
    );
    println!("  {}", "-".repeat(96));

    for node in graph.iter_nodes() {
        let mut cells = Vec::new();
        for &limit in &limits {
            let mut tuner = KernelTuner::new(Precision::F32, limit);
            let mut cache = TimingCache::new("preview");
            match tuner.select(node, &mut cache) {
                Ok(rec) => cells.push(rec.kernel),
                Err(_) => cells.push("NONE".to_string()),
            }
        }
        println!(
            "  {:<26} {:>22} {:>22} {:>22}",
            truncate(&node.name, 26),
            cells[0],
            cells[1],
            cells[2],
        );
    }
    println!();

    Ok(())
}
