// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Export configuration loaded from TOML files or constructed
//! programmatically.
//!
//! # TOML Format
//! ```toml
//! model_dir = "./models/dinov2_vits14"
//! image_height = 504
//! image_width = 504
//! batch_size = 1
//! opset_version = 14
//! fold_constants = true
//! # output = "dinov2_vits14_1-3-504-504.vitir"   # optional
//! ```

use crate::ExportError;
use std::path::{Path, PathBuf};

/// Lowest operator-set version the artifact header may declare.
pub const OPSET_MIN: u32 = 11;

/// Highest operator-set version the artifact header may declare.
pub const OPSET_MAX: u32 = 18;

/// Configuration for a single export.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExportConfig {
    /// Directory containing `model.json` and `model.safetensors`.
    pub model_dir: PathBuf,
    /// Input image height in pixels; must be a multiple of the patch size.
    #[serde(default = "default_resolution")]
    pub image_height: usize,
    /// Input image width in pixels; must be a multiple of the patch size.
    #[serde(default = "default_resolution")]
    pub image_width: usize,
    /// Batch size the graph is exported for.
    #[serde(default = "default_batch")]
    pub batch_size: usize,
    /// Operator-set version recorded in the artifact header.
    #[serde(default = "default_opset")]
    pub opset_version: u32,
    /// Fold the input normalization into the patch-embedding weights.
    #[serde(default = "default_true")]
    pub fold_constants: bool,
    /// Output artifact path. When absent, a name encoding the shape is
    /// derived next to the current directory.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

fn default_resolution() -> usize {
    504
}

fn default_batch() -> usize {
    1
}

fn default_opset() -> u32 {
    14
}

fn default_true() -> bool {
    true
}

impl ExportConfig {
    /// Creates a config for the given model directory with defaults.
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            image_height: default_resolution(),
            image_width: default_resolution(),
            batch_size: default_batch(),
            opset_version: default_opset(),
            fold_constants: true,
            output: None,
        }
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ExportError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExportError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ExportError> {
        toml::from_str(toml_str)
            .map_err(|e| ExportError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, ExportError> {
        toml::to_string_pretty(self)
            .map_err(|e| ExportError::Config(format!("TOML serialise error: {e}")))
    }

    /// Checks the cheap preconditions before any weight I/O happens.
    ///
    /// # Errors
    /// - [`ExportError::Ir`] with `PatchMisaligned` if either image
    ///   dimension is not a multiple of `patch_size`.
    /// - [`ExportError::UnsupportedOpset`] if the opset is out of range.
    /// - [`ExportError::Config`] for a zero batch size.
    pub fn validate(&self, patch_size: usize) -> Result<(), ExportError> {
        if self.image_height % patch_size != 0 {
            return Err(graph_ir::IrError::PatchMisaligned {
                axis: "height",
                value: self.image_height,
                patch: patch_size,
            }
            .into());
        }
        if self.image_width % patch_size != 0 {
            return Err(graph_ir::IrError::PatchMisaligned {
                axis: "width",
                value: self.image_width,
                patch: patch_size,
            }
            .into());
        }
        if self.batch_size == 0 {
            return Err(ExportError::Config("batch_size must be at least 1".into()));
        }
        if !(OPSET_MIN..=OPSET_MAX).contains(&self.opset_version) {
            return Err(ExportError::UnsupportedOpset {
                version: self.opset_version,
                min: OPSET_MIN,
                max: OPSET_MAX,
            });
        }
        Ok(())
    }

    /// Resolves the output path, deriving the default shape-encoding name
    /// (`{model}_{batch}-3-{height}-{width}.vitir`) when none was given.
    pub fn output_path(&self, model_name: &str) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            PathBuf::from(format!(
                "{model_name}_{}-3-{}-{}.vitir",
                self.batch_size, self.image_height, self.image_width,
            ))
        })
    }
}
