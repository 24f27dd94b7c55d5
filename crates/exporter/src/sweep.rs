// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Resolution-grid sweep: exports one artifact per height × width
//! combination.
//!
//! Inference servers pick the artifact closest to the incoming image's
//! aspect ratio, so deployments ship a small grid of resolutions. The
//! sweep runs combinations **sequentially** — each export is I/O-bound on
//! the same checkpoint file and the grid is small, so a pool would buy
//! nothing here.
//!
//! A failed combination does not abort the sweep; it is recorded and
//! reported at the end so a partial artifact set is always visible.

use crate::{ExportConfig, ExportError, ExportReport, Exporter};
use std::path::PathBuf;

/// Default sweep grid (pixels per side), multiples of patch size 14.
pub const DEFAULT_GRID: [usize; 4] = [126, 224, 364, 504];

/// Default opset for sweep exports.
pub const DEFAULT_SWEEP_OPSET: u32 = 15;

/// Configuration for a resolution sweep.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SweepConfig {
    /// Heights to export, in pixels.
    #[serde(default = "default_grid")]
    pub heights: Vec<usize>,
    /// Widths to export, in pixels.
    #[serde(default = "default_grid")]
    pub widths: Vec<usize>,
    /// Batch size for every export.
    #[serde(default = "default_batch")]
    pub batch_size: usize,
    /// Opset version for every export.
    #[serde(default = "default_opset")]
    pub opset_version: u32,
    /// Directory artifacts are written into.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    /// Fold the input normalization into the patch-embedding weights.
    #[serde(default = "default_true")]
    pub fold_constants: bool,
}

fn default_grid() -> Vec<usize> {
    DEFAULT_GRID.to_vec()
}

fn default_batch() -> usize {
    1
}

fn default_opset() -> u32 {
    DEFAULT_SWEEP_OPSET
}

fn default_out_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            heights: default_grid(),
            widths: default_grid(),
            batch_size: default_batch(),
            opset_version: default_opset(),
            out_dir: default_out_dir(),
            fold_constants: true,
        }
    }
}

/// One grid cell's outcome.
#[derive(Debug)]
pub struct SweepOutcome {
    /// Exported height in pixels.
    pub height: usize,
    /// Exported width in pixels.
    pub width: usize,
    /// The export result for this combination.
    pub result: Result<ExportReport, ExportError>,
}

/// Aggregate result of a sweep.
#[derive(Debug)]
pub struct SweepReport {
    /// Per-combination outcomes in execution order.
    pub outcomes: Vec<SweepOutcome>,
}

impl SweepReport {
    /// Number of successful exports.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Number of failed exports.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Returns a one-line description for logs and CLI output.
    pub fn summary(&self) -> String {
        format!(
            "sweep: {} exported, {} failed of {} combinations",
            self.succeeded(),
            self.failed(),
            self.outcomes.len(),
        )
    }
}

/// Runs exports across the resolution grid.
pub struct Sweep<'a> {
    exporter: &'a Exporter,
    config: SweepConfig,
}

impl<'a> Sweep<'a> {
    /// Creates a sweep over the given exporter.
    pub fn new(exporter: &'a Exporter, config: SweepConfig) -> Self {
        Self { exporter, config }
    }

    /// Runs every height × width combination sequentially.
    pub fn run(&self) -> SweepReport {
        let mut outcomes =
            Vec::with_capacity(self.config.heights.len() * self.config.widths.len());

        for &height in &self.config.heights {
            for &width in &self.config.widths {
                let cfg = ExportConfig {
                    model_dir: self.exporter.model_dir().to_path_buf(),
                    image_height: height,
                    image_width: width,
                    batch_size: self.config.batch_size,
                    opset_version: self.config.opset_version,
                    fold_constants: self.config.fold_constants,
                    output: Some(self.config.out_dir.join(format!(
                        "{}_{}-3-{height}-{width}.vitir",
                        self.exporter.manifest().name,
                        self.config.batch_size,
                    ))),
                };

                tracing::info!("sweep: exporting {height}x{width}");
                let result = self.exporter.export(&cfg);
                match &result {
                    Ok(report) => tracing::info!("sweep: {}", report.summary()),
                    Err(e) => {
                        tracing::error!("sweep: export {height}x{width} failed: {e}")
                    }
                }
                outcomes.push(SweepOutcome {
                    height,
                    width,
                    result,
                });
            }
        }

        let report = SweepReport { outcomes };
        tracing::info!("{}", report.summary());
        report
    }
}
