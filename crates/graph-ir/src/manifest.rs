// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON model manifest parsing.
//!
//! The manifest (`model.json`) describes the source checkpoint's
//! architecture. Weight tensor names follow the standard ViT convention
//! (`patch_embed.proj.weight`, `blocks.{i}.attn.qkv.weight`, ...), so the
//! manifest only needs the hyperparameters.
//!
//! # Format
//! ```json
//! {
//!   "name": "dinov2_vits14",
//!   "architecture": "dinov2",
//!   "patch_size": 14,
//!   "embed_dim": 384,
//!   "depth": 12,
//!   "num_heads": 6,
//!   "mlp_ratio": 4.0,
//!   "layer_norm_eps": 1e-6,
//!   "num_register_tokens": 0,
//!   "dtype": "f32"
//! }
//! ```

use crate::{DType, IrError};
use std::path::Path;

/// Top-level model manifest, deserialized from `model.json`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    /// Checkpoint name (e.g., `"dinov2_vits14"`).
    pub name: String,
    /// Architecture family (e.g., `"dinov2"`, `"vit"`).
    pub architecture: String,
    /// Patch side length in pixels.
    pub patch_size: usize,
    /// Token embedding dimension.
    pub embed_dim: usize,
    /// Number of transformer blocks.
    pub depth: usize,
    /// Number of attention heads per block.
    pub num_heads: usize,
    /// Hidden-dim multiplier of the feed-forward network.
    #[serde(default = "default_mlp_ratio")]
    pub mlp_ratio: f64,
    /// Layer-norm epsilon.
    #[serde(default = "default_eps")]
    pub layer_norm_eps: f32,
    /// Number of register tokens prepended after the class token.
    #[serde(default)]
    pub num_register_tokens: usize,
    /// Data type of the stored weights (e.g., `"f32"`, `"f16"`).
    #[serde(default = "default_dtype")]
    pub dtype: String,
}

fn default_mlp_ratio() -> f64 {
    4.0
}

fn default_eps() -> f32 {
    1e-6
}

fn default_dtype() -> String {
    "f32".to_string()
}

impl ModelManifest {
    /// Loads a manifest from a JSON file path.
    pub fn from_file(path: &Path) -> Result<Self, IrError> {
        let content = std::fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&content)?;
        Ok(manifest)
    }

    /// Parses a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, IrError> {
        let manifest: Self = serde_json::from_str(json)?;
        Ok(manifest)
    }

    /// Validates that the manifest is internally consistent.
    ///
    /// Checks:
    /// - Patch size, depth, and embed dim are non-zero.
    /// - The embedding dimension divides evenly across attention heads.
    /// - The dtype string is recognised.
    /// - The feed-forward hidden dimension is a whole number.
    pub fn validate(&self) -> Result<(), IrError> {
        if self.patch_size == 0 {
            return Err(IrError::InvalidGraph("manifest patch_size is zero".into()));
        }
        if self.depth == 0 {
            return Err(IrError::InvalidGraph("manifest depth is zero".into()));
        }
        if self.embed_dim == 0 {
            return Err(IrError::InvalidGraph("manifest embed_dim is zero".into()));
        }
        if self.num_heads == 0 || self.embed_dim % self.num_heads != 0 {
            return Err(IrError::InvalidGraph(format!(
                "embed_dim {} is not divisible by num_heads {}",
                self.embed_dim, self.num_heads,
            )));
        }
        self.parse_dtype()?;

        let hidden = self.embed_dim as f64 * self.mlp_ratio;
        if hidden.fract() != 0.0 {
            return Err(IrError::InvalidGraph(format!(
                "mlp_ratio {} × embed_dim {} is not a whole number",
                self.mlp_ratio, self.embed_dim,
            )));
        }

        Ok(())
    }

    /// Parses the manifest dtype string into a [`DType`].
    pub fn parse_dtype(&self) -> Result<DType, IrError> {
        DType::from_str_loose(&self.dtype).ok_or_else(|| {
            IrError::InvalidGraph(format!("unsupported dtype '{}'", self.dtype))
        })
    }

    /// Feed-forward hidden dimension (`embed_dim × mlp_ratio`).
    pub fn mlp_hidden_dim(&self) -> usize {
        (self.embed_dim as f64 * self.mlp_ratio) as usize
    }

    /// Number of special (class + register) tokens prepended to the
    /// patch tokens inside the transformer.
    pub fn num_prefix_tokens(&self) -> usize {
        1 + self.num_register_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest_json() -> &'static str {
        r#"{
            "name": "dinov2_vits14",
            "architecture": "dinov2",
            "patch_size": 14,
            "embed_dim": 384,
            "depth": 12,
            "num_heads": 6,
            "mlp_ratio": 4.0,
            "layer_norm_eps": 1e-6,
            "dtype": "f32"
        }"#
    }

    #[test]
    fn test_parse_manifest() {
        let m = ModelManifest::from_json(sample_manifest_json()).unwrap();
        assert_eq!(m.name, "dinov2_vits14");
        assert_eq!(m.patch_size, 14);
        assert_eq!(m.embed_dim, 384);
        assert_eq!(m.depth, 12);
        assert_eq!(m.num_heads, 6);
        assert_eq!(m.num_register_tokens, 0);
    }

    #[test]
    fn test_validate_ok() {
        let m = ModelManifest::from_json(sample_manifest_json()).unwrap();
        m.validate().unwrap();
    }

    #[test]
    fn test_validate_bad_heads() {
        let json = r#"{
            "name": "bad", "architecture": "vit",
            "patch_size": 14, "embed_dim": 384,
            "depth": 12, "num_heads": 7
        }"#;
        let m = ModelManifest::from_json(json).unwrap();
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_validate_zero_patch() {
        let json = r#"{
            "name": "bad", "architecture": "vit",
            "patch_size": 0, "embed_dim": 384,
            "depth": 12, "num_heads": 6
        }"#;
        let m = ModelManifest::from_json(json).unwrap();
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_validate_bad_dtype() {
        let json = r#"{
            "name": "bad", "architecture": "vit",
            "patch_size": 14, "embed_dim": 384,
            "depth": 12, "num_heads": 6, "dtype": "i4"
        }"#;
        let m = ModelManifest::from_json(json).unwrap();
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_defaults() {
        let json = r#"{
            "name": "minimal", "architecture": "vit",
            "patch_size": 16, "embed_dim": 768,
            "depth": 12, "num_heads": 12
        }"#;
        let m = ModelManifest::from_json(json).unwrap();
        assert_eq!(m.mlp_ratio, 4.0);
        assert_eq!(m.layer_norm_eps, 1e-6);
        assert_eq!(m.dtype, "f32");
        assert_eq!(m.mlp_hidden_dim(), 3072);
        assert_eq!(m.num_prefix_tokens(), 1);
    }

    #[test]
    fn test_register_tokens() {
        let json = r#"{
            "name": "dinov2_vits14_reg", "architecture": "dinov2",
            "patch_size": 14, "embed_dim": 384,
            "depth": 12, "num_heads": 6, "num_register_tokens": 4
        }"#;
        let m = ModelManifest::from_json(json).unwrap();
        assert_eq!(m.num_prefix_tokens(), 5);
    }

    #[test]
    fn test_serde_roundtrip() {
        let m = ModelManifest::from_json(sample_manifest_json()).unwrap();
        let json = serde_json::to_string_pretty(&m).unwrap();
        let back = ModelManifest::from_json(&json).unwrap();
        assert_eq!(back.name, m.name);
        assert_eq!(back.embed_dim, m.embed_dim);
    }
}
