// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Node definitions for the vision-transformer IR.
//!
//! Each [`NodeDef`] describes a single computation in the exported graph:
//! its kind, shapes, weight references, and op-specific attributes.
//! Weight data is **not** stored here — only names (keys into the artifact
//! payload). The engine builder resolves them at compile time.

use crate::{DType, Shape};

/// The kind of computation a node performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// Per-channel affine normalization of raw `[0, 255]` pixel input.
    Normalize,
    /// Strided convolution that turns image patches into token embeddings.
    PatchEmbed,
    /// Learned position embedding added to the token sequence
    /// (prepends the class token).
    PositionEmbed,
    /// Layer normalization (scale + shift).
    LayerNorm,
    /// Multi-head self-attention (fused QKV projection + output projection).
    SelfAttention,
    /// Feed-forward network (two linear projections with GELU).
    FeedForward,
    /// Drops the leading class/register tokens, keeping patch tokens only.
    TokenExtract,
}

impl OpKind {
    /// Parses an op kind from a manifest/header string.
    ///
    /// Accepts both snake_case (`"self_attention"`) and common aliases
    /// (`"attn"`, `"mlp"`, `"ln"`).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "normalize" | "norm_input" => Some(Self::Normalize),
            "patch_embed" | "patchembed" | "patchify" => Some(Self::PatchEmbed),
            "position_embed" | "pos_embed" | "wpe" => Some(Self::PositionEmbed),
            "layer_norm" | "layernorm" | "ln" => Some(Self::LayerNorm),
            "self_attention" | "attention" | "attn" | "mha" => Some(Self::SelfAttention),
            "feed_forward" | "feedforward" | "ffn" | "mlp" => Some(Self::FeedForward),
            "token_extract" | "patch_tokens" => Some(Self::TokenExtract),
            _ => None,
        }
    }

    /// Returns a human-readable label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::PatchEmbed => "patch_embed",
            Self::PositionEmbed => "position_embed",
            Self::LayerNorm => "layer_norm",
            Self::SelfAttention => "self_attention",
            Self::FeedForward => "feed_forward",
            Self::TokenExtract => "token_extract",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Op-specific attributes.
///
/// Only the fields relevant to a node's [`OpKind`] are populated; the rest
/// stay `None` and are omitted from the serialized header.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NodeAttrs {
    /// Per-channel mean on the `[0, 255]` pixel scale (normalize).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<[f32; 3]>,
    /// Per-channel standard deviation on the `[0, 255]` pixel scale (normalize).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<[f32; 3]>,
    /// Patch side length in pixels (patch embed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_size: Option<usize>,
    /// Numerical epsilon (layer norm).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<f32>,
    /// Number of attention heads (self-attention).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_heads: Option<usize>,
    /// Number of leading tokens dropped (token extract).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_tokens: Option<usize>,
}

/// Metadata describing a single node in the exported graph.
///
/// A `NodeDef` does not own weight data — it stores references (tensor
/// names) into the artifact payload.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NodeDef {
    /// Unique identifier for this node (e.g., `"blocks.0.attn"`).
    pub name: String,
    /// The kind of computation this node performs.
    pub op: OpKind,
    /// Index in the execution order (0-based).
    pub index: usize,
    /// Names of weight tensors required by this node.
    pub weight_names: Vec<String>,
    /// Shapes of the weight tensors (parallel to `weight_names`).
    pub weight_shapes: Vec<Shape>,
    /// Data type of this node's weights.
    pub dtype: DType,
    /// Shape of the node's input activation.
    pub input_shape: Shape,
    /// Shape of the node's output activation.
    pub output_shape: Shape,
    /// Op-specific attributes.
    #[serde(default)]
    pub attrs: NodeAttrs,
}

impl NodeDef {
    /// Estimates the memory required for this node's weights in bytes.
    pub fn weight_bytes(&self) -> usize {
        self.weight_shapes
            .iter()
            .map(|s| s.size_bytes(self.dtype))
            .sum()
    }

    /// Estimates the memory required for this node's activations in bytes.
    ///
    /// Accounts for both the input and output activation buffers, since
    /// both must be live simultaneously during execution.
    pub fn activation_bytes(&self) -> usize {
        self.input_shape.size_bytes(self.dtype) + self.output_shape.size_bytes(self.dtype)
    }

    /// Rough floating-point operation count for this node.
    ///
    /// Used by the engine builder's kernel cost model. The estimate is
    /// intentionally coarse: weight elements × output positions dominated
    /// terms only.
    pub fn flops(&self) -> u64 {
        let weight_elems: usize = self
            .weight_shapes
            .iter()
            .map(Shape::num_elements)
            .sum();
        let out_elems = self.output_shape.num_elements();
        match self.op {
            // Matmul-dominated ops: 2 × weights × sequence positions.
            OpKind::PatchEmbed | OpKind::SelfAttention | OpKind::FeedForward => {
                let positions = self
                    .output_shape
                    .dim(1)
                    .unwrap_or(1)
                    .max(1);
                2 * weight_elems as u64 * positions as u64
                    / self.output_shape.dim(0).unwrap_or(1).max(1) as u64
            }
            // Elementwise ops: a handful of flops per element.
            OpKind::Normalize | OpKind::PositionEmbed | OpKind::TokenExtract => {
                2 * out_elems as u64
            }
            OpKind::LayerNorm => 8 * out_elems as u64,
        }
    }

    /// Returns a concise summary string for display.
    pub fn summary(&self) -> String {
        let weight_kb = self.weight_bytes() as f64 / 1024.0;
        format!(
            "[{}] {} ({}) — {} → {}, weights: {:.1} KB ({} tensors)",
            self.index,
            self.name,
            self.op,
            self.input_shape,
            self.output_shape,
            weight_kb,
            self.weight_names.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attn_node() -> NodeDef {
        NodeDef {
            name: "blocks.0.attn".into(),
            op: OpKind::SelfAttention,
            index: 3,
            weight_names: vec![
                "blocks.0.attn.qkv.weight".into(),
                "blocks.0.attn.qkv.bias".into(),
                "blocks.0.attn.proj.weight".into(),
                "blocks.0.attn.proj.bias".into(),
            ],
            weight_shapes: vec![
                Shape::matrix(1152, 384),
                Shape::vector(1152),
                Shape::matrix(384, 384),
                Shape::vector(384),
            ],
            dtype: DType::F32,
            input_shape: Shape::tokens(1, 1297, 384),
            output_shape: Shape::tokens(1, 1297, 384),
            attrs: NodeAttrs {
                num_heads: Some(6),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_op_kind_roundtrip() {
        for op in [
            OpKind::Normalize,
            OpKind::PatchEmbed,
            OpKind::PositionEmbed,
            OpKind::LayerNorm,
            OpKind::SelfAttention,
            OpKind::FeedForward,
            OpKind::TokenExtract,
        ] {
            assert_eq!(OpKind::from_str_loose(op.as_str()), Some(op));
        }
        assert_eq!(OpKind::from_str_loose("bogus"), None);
    }

    #[test]
    fn test_op_kind_aliases() {
        assert_eq!(OpKind::from_str_loose("attn"), Some(OpKind::SelfAttention));
        assert_eq!(OpKind::from_str_loose("mlp"), Some(OpKind::FeedForward));
        assert_eq!(OpKind::from_str_loose("LN"), Some(OpKind::LayerNorm));
    }

    #[test]
    fn test_weight_bytes() {
        let n = attn_node();
        let expected = (1152 * 384 + 1152 + 384 * 384 + 384) * 4;
        assert_eq!(n.weight_bytes(), expected);
    }

    #[test]
    fn test_activation_bytes() {
        let n = attn_node();
        assert_eq!(n.activation_bytes(), 2 * 1297 * 384 * 4);
    }

    #[test]
    fn test_flops_scale_with_sequence() {
        let n = attn_node();
        let mut short = attn_node();
        short.input_shape = Shape::tokens(1, 82, 384);
        short.output_shape = Shape::tokens(1, 82, 384);
        assert!(n.flops() > short.flops());
    }

    #[test]
    fn test_summary_contains_name_and_kind() {
        let s = attn_node().summary();
        assert!(s.contains("blocks.0.attn"));
        assert!(s.contains("self_attention"));
    }

    #[test]
    fn test_attrs_serde_skips_none() {
        let n = attn_node();
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("num_heads"));
        assert!(!json.contains("epsilon"));
    }
}
