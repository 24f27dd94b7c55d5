// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph assembly and artifact export.
//!
//! [`Exporter`] turns a checkpoint (manifest + SafeTensors weights) into a
//! validated [`TensorGraph`] for one concrete `(batch, height, width)` and
//! writes it out as a single-file artifact:
//!
//! 1. Check the cheap preconditions (patch alignment, opset range) before
//!    touching any weights.
//! 2. Assemble the node chain: `[normalize] → patch_embed → position_embed
//!    → depth × (ln, attn, ln, mlp) → ln → token_extract`.
//! 3. Collect the weight payload, folding the normalization into the
//!    patch-embedding conv and resampling the position embedding to the
//!    target grid.
//! 4. Write the artifact under the shape-encoding default name.

use crate::{ExportConfig, ExportError, Normalization, WeightStore};
use graph_ir::{
    graph::Validated, ArtifactWriter, DType, ModelManifest, NodeAttrs, NodeDef, OpKind, Shape,
    TensorData, TensorGraph, GRAPH_OUTPUT,
};
use std::collections::HashSet;
use std::path::PathBuf;

/// Default manifest filename inside a model directory.
pub const MANIFEST_FILE: &str = "model.json";

/// Outcome of a successful export.
#[derive(Debug, Clone)]
pub struct ExportReport {
    /// Path the artifact was written to.
    pub path: PathBuf,
    /// Final file size in bytes.
    pub file_bytes: u64,
    /// Number of nodes in the exported graph.
    pub num_nodes: usize,
    /// Number of patch tokens at the exported resolution.
    pub patch_tokens: usize,
    /// Whether the normalization was folded into the patch embedding.
    pub folded: bool,
}

impl ExportReport {
    /// Returns a one-line description for logs and CLI output.
    pub fn summary(&self) -> String {
        format!(
            "{} — {:.2} MB, {} nodes, {} patch tokens, normalization {}",
            self.path.display(),
            self.file_bytes as f64 / (1024.0 * 1024.0),
            self.num_nodes,
            self.patch_tokens,
            if self.folded { "folded" } else { "explicit" },
        )
    }
}

/// Exports a checkpoint to IR artifacts.
pub struct Exporter {
    manifest: ModelManifest,
    store: WeightStore,
    norm: Normalization,
}

impl Exporter {
    /// Opens the checkpoint under `model_dir` (`model.json` +
    /// `model.safetensors`).
    pub fn open(model_dir: &std::path::Path) -> Result<Self, ExportError> {
        let manifest = ModelManifest::from_file(&model_dir.join(MANIFEST_FILE))?;
        manifest.validate()?;
        let store = WeightStore::open(model_dir)?;
        Ok(Self::from_parts(manifest, store))
    }

    /// Builds an exporter from pre-constructed parts.
    ///
    /// Pair with [`WeightStore::synthetic`] for tests and demos.
    pub fn from_parts(manifest: ModelManifest, store: WeightStore) -> Self {
        Self {
            manifest,
            store,
            norm: Normalization::imagenet(),
        }
    }

    /// The checkpoint manifest.
    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    /// Directory the checkpoint was opened from.
    pub fn model_dir(&self) -> &std::path::Path {
        self.store.model_dir()
    }

    /// Runs the full export for one configuration.
    pub fn export(&self, config: &ExportConfig) -> Result<ExportReport, ExportError> {
        // Fail fast: alignment and opset are checked before any weight I/O.
        config.validate(self.manifest.patch_size)?;

        let fold = self.resolve_folding(config);
        let graph = self.build_graph(config, fold)?;
        tracing::info!("{}", graph.summary());

        let tensors = self.collect_tensors(&graph, fold)?;
        let path = config.output_path(&self.manifest.name);
        let file_bytes = ArtifactWriter::write(&path, &graph, &tensors)?;

        Ok(ExportReport {
            path,
            file_bytes,
            num_nodes: graph.num_nodes(),
            patch_tokens: graph.num_patch_tokens(),
            folded: fold,
        })
    }

    /// Folding needs f32 checkpoint weights; otherwise fall back to the
    /// explicit normalize node.
    fn resolve_folding(&self, config: &ExportConfig) -> bool {
        if !config.fold_constants {
            return false;
        }
        match self.manifest.parse_dtype() {
            Ok(DType::F32) => true,
            _ => {
                tracing::warn!(
                    "constant folding requires an f32 checkpoint (got '{}'); \
                     exporting an explicit normalize node instead",
                    self.manifest.dtype,
                );
                false
            }
        }
    }

    /// Assembles the validated node chain for one configuration.
    pub fn build_graph(
        &self,
        config: &ExportConfig,
        fold: bool,
    ) -> Result<TensorGraph<Validated>, ExportError> {
        let m = &self.manifest;
        let dtype = m.parse_dtype()?;
        let (batch, h, w) = (config.batch_size, config.image_height, config.image_width);
        let d = m.embed_dim;
        let patches = (h / m.patch_size) * (w / m.patch_size);
        let prefix = m.num_prefix_tokens();
        let seq = prefix + patches;
        let image = Shape::nchw(batch, 3, h, w);

        let mut nodes = Vec::with_capacity(4 * m.depth + 5);
        let mut idx = 0usize;
        let mut push = |nodes: &mut Vec<NodeDef>, node: NodeDef| {
            debug_assert_eq!(node.index, nodes.len());
            nodes.push(node);
        };

        if !fold {
            push(&mut nodes, self.norm.node(idx, image.clone()));
            idx += 1;
        }

        // Patch embedding: [B, 3, H, W] → [B, patches, D].
        push(
            &mut nodes,
            NodeDef {
                name: "patch_embed".into(),
                op: OpKind::PatchEmbed,
                index: idx,
                weight_names: vec![
                    "patch_embed.proj.weight".into(),
                    "patch_embed.proj.bias".into(),
                ],
                weight_shapes: vec![
                    Shape::new(vec![d, 3, m.patch_size, m.patch_size]),
                    Shape::vector(d),
                ],
                dtype,
                input_shape: image,
                output_shape: Shape::tokens(batch, patches, d),
                attrs: NodeAttrs {
                    patch_size: Some(m.patch_size),
                    ..Default::default()
                },
            },
        );
        idx += 1;

        // Class token + resampled position embedding: prepends the prefix
        // tokens, so the sequence grows from `patches` to `seq`.
        push(
            &mut nodes,
            NodeDef {
                name: "pos_embed".into(),
                op: OpKind::PositionEmbed,
                index: idx,
                weight_names: vec!["cls_token".into(), "pos_embed".into()],
                weight_shapes: vec![
                    Shape::tokens(1, 1, d),
                    Shape::tokens(1, seq, d),
                ],
                dtype,
                input_shape: Shape::tokens(batch, patches, d),
                output_shape: Shape::tokens(batch, seq, d),
                attrs: NodeAttrs::default(),
            },
        );
        idx += 1;

        let tok = Shape::tokens(batch, seq, d);
        for b in 0..m.depth {
            push(
                &mut nodes,
                layer_norm(&format!("blocks.{b}.norm1"), idx, d, &tok, m.layer_norm_eps, dtype),
            );
            idx += 1;

            push(
                &mut nodes,
                NodeDef {
                    name: format!("blocks.{b}.attn"),
                    op: OpKind::SelfAttention,
                    index: idx,
                    weight_names: vec![
                        format!("blocks.{b}.attn.qkv.weight"),
                        format!("blocks.{b}.attn.qkv.bias"),
                        format!("blocks.{b}.attn.proj.weight"),
                        format!("blocks.{b}.attn.proj.bias"),
                    ],
                    weight_shapes: vec![
                        Shape::matrix(3 * d, d),
                        Shape::vector(3 * d),
                        Shape::matrix(d, d),
                        Shape::vector(d),
                    ],
                    dtype,
                    input_shape: tok.clone(),
                    output_shape: tok.clone(),
                    attrs: NodeAttrs {
                        num_heads: Some(m.num_heads),
                        ..Default::default()
                    },
                },
            );
            idx += 1;

            push(
                &mut nodes,
                layer_norm(&format!("blocks.{b}.norm2"), idx, d, &tok, m.layer_norm_eps, dtype),
            );
            idx += 1;

            let hidden = m.mlp_hidden_dim();
            push(
                &mut nodes,
                NodeDef {
                    name: format!("blocks.{b}.mlp"),
                    op: OpKind::FeedForward,
                    index: idx,
                    weight_names: vec![
                        format!("blocks.{b}.mlp.fc1.weight"),
                        format!("blocks.{b}.mlp.fc1.bias"),
                        format!("blocks.{b}.mlp.fc2.weight"),
                        format!("blocks.{b}.mlp.fc2.bias"),
                    ],
                    weight_shapes: vec![
                        Shape::matrix(hidden, d),
                        Shape::vector(hidden),
                        Shape::matrix(d, hidden),
                        Shape::vector(d),
                    ],
                    dtype,
                    input_shape: tok.clone(),
                    output_shape: tok.clone(),
                    attrs: NodeAttrs::default(),
                },
            );
            idx += 1;
        }

        push(
            &mut nodes,
            layer_norm("norm", idx, d, &tok, m.layer_norm_eps, dtype),
        );
        idx += 1;

        // Drop class/register tokens; the graph output is the normalised
        // patch tokens ("unpooled features").
        push(
            &mut nodes,
            NodeDef {
                name: GRAPH_OUTPUT.into(),
                op: OpKind::TokenExtract,
                index: idx,
                weight_names: vec![],
                weight_shapes: vec![],
                dtype,
                input_shape: tok,
                output_shape: Shape::tokens(batch, patches, d),
                attrs: NodeAttrs {
                    drop_tokens: Some(prefix),
                    ..Default::default()
                },
            },
        );

        let graph = TensorGraph::new(
            m.name.clone(),
            batch,
            h,
            w,
            m.patch_size,
            config.opset_version,
            nodes,
        )
        .validate()?;
        Ok(graph)
    }

    /// Collects the weight payload for the graph, applying folding and
    /// position-embedding resampling.
    fn collect_tensors(
        &self,
        graph: &TensorGraph<Validated>,
        fold: bool,
    ) -> Result<Vec<TensorData>, ExportError> {
        let mut seen = HashSet::new();
        let mut tensors = Vec::new();

        for node in graph.iter_nodes() {
            for (name, shape) in node.weight_names.iter().zip(&node.weight_shapes) {
                if !seen.insert(name.clone()) {
                    continue;
                }
                let data = match (node.op, name.as_str()) {
                    (OpKind::PatchEmbed, _) if fold => continue, // handled below as a pair
                    (OpKind::PositionEmbed, "pos_embed") => {
                        self.resampled_pos_embed(graph, shape)?
                    }
                    _ => TensorData {
                        name: name.clone(),
                        dtype: node.dtype,
                        shape: shape.clone(),
                        data: self.store.fetch(name, shape, node.dtype)?,
                    },
                };
                tensors.push(data);
            }
        }

        if fold {
            tensors.extend(self.folded_patch_embed()?);
        }

        Ok(tensors)
    }

    /// Fetches the patch-embedding conv pair and folds the normalization in.
    fn folded_patch_embed(&self) -> Result<Vec<TensorData>, ExportError> {
        let p = self.manifest.patch_size;
        let d = self.manifest.embed_dim;
        let w_shape = Shape::new(vec![d, 3, p, p]);
        let b_shape = Shape::vector(d);

        let mut weight = self.store.fetch_f32("patch_embed.proj.weight", &w_shape)?;
        let mut bias = self.store.fetch_f32("patch_embed.proj.bias", &b_shape)?;
        self.norm.fold_into_conv(&mut weight, &mut bias, p)?;

        tracing::debug!(
            "folded normalization into patch embedding ({} kernel elements)",
            weight.len(),
        );
        Ok(vec![
            TensorData::from_f32("patch_embed.proj.weight", w_shape, &weight),
            TensorData::from_f32("patch_embed.proj.bias", b_shape, &bias),
        ])
    }

    /// Resamples the checkpoint position embedding to the target grid.
    ///
    /// DINOv2 checkpoints store `pos_embed` for the training resolution;
    /// exports at other resolutions bake a bilinearly interpolated grid, so
    /// the engine never needs dynamic interpolation.
    fn resampled_pos_embed(
        &self,
        graph: &TensorGraph<Validated>,
        target_shape: &Shape,
    ) -> Result<TensorData, ExportError> {
        let m = &self.manifest;
        let prefix = m.num_prefix_tokens();
        let d = m.embed_dim;
        let (gh, gw) = (
            graph.image_height / m.patch_size,
            graph.image_width / m.patch_size,
        );

        let (src_shape, src) = self.store.fetch_f32_dynamic("pos_embed", target_shape)?;
        let src_tokens = src_shape.dim(1).ok_or_else(|| ExportError::TensorMismatch {
            name: "pos_embed".into(),
            detail: format!("expected rank-3 shape, got {src_shape}"),
        })?;
        if src_shape.dims().last() != Some(&d) || src.len() != src_shape.num_elements() {
            return Err(ExportError::TensorMismatch {
                name: "pos_embed".into(),
                detail: format!("shape {src_shape} incompatible with embed_dim {d}"),
            });
        }
        let src_patches = src_tokens.checked_sub(prefix).ok_or_else(|| {
            ExportError::TensorMismatch {
                name: "pos_embed".into(),
                detail: format!("{src_tokens} tokens < {prefix} prefix tokens"),
            }
        })?;

        if src_patches == gh * gw {
            // Already the right grid (or synthetic) — no resampling needed.
            return Ok(TensorData::from_f32(
                "pos_embed",
                target_shape.clone(),
                &src,
            ));
        }

        let side = (src_patches as f64).sqrt() as usize;
        if side * side != src_patches {
            return Err(ExportError::TensorMismatch {
                name: "pos_embed".into(),
                detail: format!("{src_patches} patch positions is not a square grid"),
            });
        }
        tracing::info!(
            "resampling pos_embed {side}x{side} → {gh}x{gw} ({} prefix tokens kept)",
            prefix,
        );

        let mut out = Vec::with_capacity((prefix + gh * gw) * d);
        out.extend_from_slice(&src[..prefix * d]);
        let grid = &src[prefix * d..];
        for y in 0..gh {
            for x in 0..gw {
                // Map the target cell centre into the source grid.
                let sy = (y as f32 + 0.5) * side as f32 / gh as f32 - 0.5;
                let sx = (x as f32 + 0.5) * side as f32 / gw as f32 - 0.5;
                let y0 = sy.floor().clamp(0.0, (side - 1) as f32) as usize;
                let x0 = sx.floor().clamp(0.0, (side - 1) as f32) as usize;
                let y1 = (y0 + 1).min(side - 1);
                let x1 = (x0 + 1).min(side - 1);
                let fy = (sy - y0 as f32).clamp(0.0, 1.0);
                let fx = (sx - x0 as f32).clamp(0.0, 1.0);

                for c in 0..d {
                    let at = |yy: usize, xx: usize| grid[(yy * side + xx) * d + c];
                    let top = at(y0, x0) * (1.0 - fx) + at(y0, x1) * fx;
                    let bottom = at(y1, x0) * (1.0 - fx) + at(y1, x1) * fx;
                    out.push(top * (1.0 - fy) + bottom * fy);
                }
            }
        }

        Ok(TensorData::from_f32("pos_embed", target_shape.clone(), &out))
    }
}

/// Builds a layer-norm node.
fn layer_norm(
    name: &str,
    index: usize,
    dim: usize,
    tok: &Shape,
    eps: f32,
    dtype: DType,
) -> NodeDef {
    NodeDef {
        name: name.to_string(),
        op: OpKind::LayerNorm,
        index,
        weight_names: vec![format!("{name}.weight"), format!("{name}.bias")],
        weight_shapes: vec![Shape::vector(dim), Shape::vector(dim)],
        dtype,
        input_shape: tok.clone(),
        output_shape: tok.clone(),
        attrs: NodeAttrs {
            epsilon: Some(eps),
            ..Default::default()
        },
    }
}
