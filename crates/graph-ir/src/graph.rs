// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor graph: the complete exported forward pass as a chain of nodes.
//!
//! # Type-State Pattern
//!
//! The graph transitions through states enforced at compile time:
//!
//! ```text
//! TensorGraph<Loaded>     — nodes assembled, not yet checked.
//!       │  .validate()
//!       ▼
//! TensorGraph<Validated>  — preconditions verified, ready for writing
//!                           or engine building.
//! ```
//!
//! This prevents the artifact writer and the engine builder from ever
//! receiving a graph whose image dimensions violate the patch-alignment
//! precondition. The transition consumes the old state and returns the new
//! one, so there is zero runtime cost — the marker types are `PhantomData`
//! (ZST).

use crate::{IrError, NodeDef};
use std::fmt;

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: graph has been assembled but not validated.
#[derive(Debug, Clone, Default)]
pub struct Loaded;

/// Marker: graph has been validated and is ready for export/compilation.
#[derive(Debug, Clone, Default)]
pub struct Validated;

/// Sealed trait for graph states.
pub trait GraphState: fmt::Debug + Clone {}
impl GraphState for Loaded {}
impl GraphState for Validated {}

// ── TensorGraph ────────────────────────────────────────────────────

/// The exported model represented as an ordered chain of nodes.
///
/// For vision transformers this is a linear chain from the image input to
/// the patch-token output. The generic parameter `S` encodes the
/// validation state at compile time.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TensorGraph<S: GraphState = Loaded> {
    /// Source model name (e.g., `"dinov2_vits14"`).
    pub name: String,
    /// Batch size the graph was exported for.
    pub batch_size: usize,
    /// Input image height in pixels.
    pub image_height: usize,
    /// Input image width in pixels.
    pub image_width: usize,
    /// Patch side length in pixels.
    pub patch_size: usize,
    /// Target operator-set version recorded for downstream consumers.
    pub opset_version: u32,
    /// Ordered list of node definitions.
    pub nodes: Vec<NodeDef>,
    /// State marker (zero-sized, compile-time only).
    #[serde(skip, default)]
    _state: std::marker::PhantomData<S>,
}

// ── Loaded state ───────────────────────────────────────────────────

impl TensorGraph<Loaded> {
    /// Creates a new graph in the `Loaded` state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        batch_size: usize,
        image_height: usize,
        image_width: usize,
        patch_size: usize,
        opset_version: u32,
        nodes: Vec<NodeDef>,
    ) -> Self {
        Self {
            name,
            batch_size,
            image_height,
            image_width,
            patch_size,
            opset_version,
            nodes,
            _state: std::marker::PhantomData,
        }
    }

    /// Validates the graph and transitions to the `Validated` state.
    ///
    /// # Checks
    /// - Image height and width are multiples of the patch size. This is
    ///   the cheap precondition checked before any expensive work.
    /// - The graph is non-empty and the batch size is non-zero.
    /// - Node indices are consecutive starting from 0.
    /// - No node has zero-element shapes.
    /// - Hidden-dim chain consistency: each node's output last dim should
    ///   match the next node's input last dim (logged, not fatal — the
    ///   patch-embed boundary legitimately changes rank).
    pub fn validate(self) -> Result<TensorGraph<Validated>, IrError> {
        if self.patch_size == 0 {
            return Err(IrError::InvalidGraph("patch size is zero".into()));
        }
        if self.image_height % self.patch_size != 0 {
            return Err(IrError::PatchMisaligned {
                axis: "height",
                value: self.image_height,
                patch: self.patch_size,
            });
        }
        if self.image_width % self.patch_size != 0 {
            return Err(IrError::PatchMisaligned {
                axis: "width",
                value: self.image_width,
                patch: self.patch_size,
            });
        }
        if self.batch_size == 0 {
            return Err(IrError::InvalidGraph("batch size is zero".into()));
        }
        if self.nodes.is_empty() {
            return Err(IrError::InvalidGraph("graph contains no nodes".into()));
        }

        // Check consecutive indices.
        for (i, node) in self.nodes.iter().enumerate() {
            if node.index != i {
                return Err(IrError::InvalidNode {
                    node: node.name.clone(),
                    detail: format!("expected index {i}, got {}", node.index),
                });
            }
        }

        // Check no zero-element shapes.
        for node in &self.nodes {
            if node.input_shape.num_elements() == 0 {
                return Err(IrError::InvalidNode {
                    node: node.name.clone(),
                    detail: "input shape has zero elements".into(),
                });
            }
            if node.output_shape.num_elements() == 0 {
                return Err(IrError::InvalidNode {
                    node: node.name.clone(),
                    detail: "output shape has zero elements".into(),
                });
            }
        }

        // Check channel consistency between consecutive nodes. Sequence
        // length changes at the token-extract boundary and rank changes at
        // patch-embed, but the trailing feature dimension must line up.
        for pair in self.nodes.windows(2) {
            let (current, next) = (&pair[0], &pair[1]);
            let out_last = current.output_shape.dims().last().copied();
            let in_last = next.input_shape.dims().last().copied();
            if let (Some(o), Some(i)) = (out_last, in_last) {
                if o != i {
                    tracing::warn!(
                        "channel mismatch between '{}' output (last dim {o}) and '{}' input (last dim {i})",
                        current.name,
                        next.name,
                    );
                }
            }
        }

        Ok(TensorGraph {
            name: self.name,
            batch_size: self.batch_size,
            image_height: self.image_height,
            image_width: self.image_width,
            patch_size: self.patch_size,
            opset_version: self.opset_version,
            nodes: self.nodes,
            _state: std::marker::PhantomData,
        })
    }
}

// ── Validated state ────────────────────────────────────────────────

impl TensorGraph<Validated> {
    /// Returns the total number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of patch tokens produced for the configured resolution.
    pub fn num_patch_tokens(&self) -> usize {
        (self.image_height / self.patch_size) * (self.image_width / self.patch_size)
    }

    /// Name of the tensor downstream consumers bind the image input to.
    pub fn input_name(&self) -> &'static str {
        crate::GRAPH_INPUT
    }

    /// Name of the tensor the patch tokens are bound to.
    pub fn output_name(&self) -> &'static str {
        crate::GRAPH_OUTPUT
    }

    /// Returns the total estimated memory for all weights in bytes.
    pub fn total_weight_bytes(&self) -> usize {
        self.nodes.iter().map(|n| n.weight_bytes()).sum()
    }

    /// Returns the estimated memory for the largest single node
    /// (weights + activations).
    pub fn max_node_bytes(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| n.weight_bytes() + n.activation_bytes())
            .max()
            .unwrap_or(0)
    }

    /// Returns an iterator over the nodes in execution order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = &NodeDef> {
        self.nodes.iter()
    }

    /// Returns a reference to a node by index.
    pub fn node(&self, index: usize) -> Option<&NodeDef> {
        self.nodes.get(index)
    }

    /// Demotes the graph back to the `Loaded` state.
    ///
    /// Used when embedding the graph in an artifact header, which is
    /// re-validated on read.
    pub fn to_loaded(&self) -> TensorGraph<Loaded> {
        TensorGraph {
            name: self.name.clone(),
            batch_size: self.batch_size,
            image_height: self.image_height,
            image_width: self.image_width,
            patch_size: self.patch_size,
            opset_version: self.opset_version,
            nodes: self.nodes.clone(),
            _state: std::marker::PhantomData,
        }
    }

    /// Returns a summary string describing the graph.
    pub fn summary(&self) -> String {
        let total_weight_mb = self.total_weight_bytes() as f64 / (1024.0 * 1024.0);
        format!(
            "Graph '{}': {}x3x{}x{}, {} nodes, {} patch tokens, {:.1} MB weights, opset {}",
            self.name,
            self.batch_size,
            self.image_height,
            self.image_width,
            self.num_nodes(),
            self.num_patch_tokens(),
            total_weight_mb,
            self.opset_version,
        )
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: GraphState> fmt::Display for TensorGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "TensorGraph '{}' ({} nodes, {}x{} @ patch {}):",
            self.name,
            self.nodes.len(),
            self.image_height,
            self.image_width,
            self.patch_size,
        )?;
        for node in &self.nodes {
            writeln!(f, "  {}", node.summary())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DType, NodeAttrs, OpKind, Shape};

    /// Helper: builds a short chain of token-shaped nodes.
    fn make_nodes(n: usize, channels: usize) -> Vec<NodeDef> {
        (0..n)
            .map(|i| NodeDef {
                name: format!("node.{i}"),
                op: OpKind::LayerNorm,
                index: i,
                weight_names: vec![format!("w.{i}")],
                weight_shapes: vec![Shape::vector(channels)],
                dtype: DType::F32,
                input_shape: Shape::tokens(1, 10, channels),
                output_shape: Shape::tokens(1, 10, channels),
                attrs: NodeAttrs::default(),
            })
            .collect()
    }

    fn graph(h: usize, w: usize, patch: usize) -> TensorGraph<Loaded> {
        TensorGraph::new("test".into(), 1, h, w, patch, 14, make_nodes(4, 384))
    }

    #[test]
    fn test_validate_ok() {
        let g = graph(504, 504, 14).validate().unwrap();
        assert_eq!(g.num_nodes(), 4);
        assert_eq!(g.num_patch_tokens(), 36 * 36);
    }

    #[test]
    fn test_io_tensor_names() {
        let g = graph(224, 224, 14).validate().unwrap();
        assert_eq!(g.input_name(), crate::GRAPH_INPUT);
        assert_eq!(g.output_name(), "unpooled_features");
    }

    #[test]
    fn test_rejects_misaligned_height() {
        let err = graph(500, 504, 14).validate().unwrap_err();
        match err {
            IrError::PatchMisaligned { axis, value, patch } => {
                assert_eq!(axis, "height");
                assert_eq!(value, 500);
                assert_eq!(patch, 14);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_misaligned_width() {
        let err = graph(504, 100, 14).validate().unwrap_err();
        assert!(matches!(
            err,
            IrError::PatchMisaligned { axis: "width", .. }
        ));
    }

    #[test]
    fn test_rejects_empty() {
        let g = TensorGraph::new("empty".into(), 1, 224, 224, 14, 14, vec![]);
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_batch() {
        let g = TensorGraph::new("b0".into(), 0, 224, 224, 14, 14, make_nodes(2, 64));
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_index() {
        let mut nodes = make_nodes(3, 64);
        nodes[1].index = 5; // Should be 1.
        let g = TensorGraph::new("bad".into(), 1, 224, 224, 14, 14, nodes);
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_shape() {
        let mut nodes = make_nodes(2, 64);
        nodes[0].input_shape = Shape::new(vec![0, 64]);
        let g = TensorGraph::new("zero".into(), 1, 224, 224, 14, 14, nodes);
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_total_weight_bytes() {
        let g = graph(224, 224, 14).validate().unwrap();
        // Four layer-norm scale vectors of 384 f32 elements.
        assert_eq!(g.total_weight_bytes(), 4 * 384 * 4);
    }

    #[test]
    fn test_summary() {
        let g = graph(224, 224, 14).validate().unwrap();
        let s = g.summary();
        assert!(s.contains("test"));
        assert!(s.contains("4 nodes"));
        assert!(s.contains("256 patch tokens"));
    }

    #[test]
    fn test_serde_roundtrip_revalidates() {
        let g = graph(224, 224, 14).validate().unwrap();
        let json = serde_json::to_string(&g).unwrap();
        let back: TensorGraph<Loaded> = serde_json::from_str(&json).unwrap();
        let back = back.validate().unwrap();
        assert_eq!(back.num_nodes(), g.num_nodes());
        assert_eq!(back.name, g.name);
    }

    #[test]
    fn test_display() {
        let g = graph(224, 224, 14);
        let display = format!("{g}");
        assert!(display.contains("node.0"));
        assert!(display.contains("node.3"));
    }
}
