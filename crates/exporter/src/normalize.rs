// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Input normalization wrapping and constant folding.
//!
//! The deployed graph receives raw pixels in `[0, 255]`. The export wraps
//! the model with a per-channel affine normalization to the ImageNet
//! statistics before the first convolution, matching what the training
//! pipeline did. The constants therefore live on the 0–255 scale.
//!
//! When constant folding is enabled, the normalization never becomes a
//! runtime node: the affine is absorbed into the patch-embedding
//! convolution weights and bias, since
//!
//! ```text
//! conv((x - mean) / std, W, b) = conv(x, W / std, b - Σ W · mean / std)
//! ```

use crate::ExportError;
use graph_ir::{DType, NodeAttrs, NodeDef, OpKind, Shape};

/// Per-channel ImageNet mean on the `[0, 255]` pixel scale (RGB).
pub const IMAGENET_MEAN: [f32; 3] = [123.675, 116.28, 103.53];

/// Per-channel ImageNet standard deviation on the `[0, 255]` pixel scale (RGB).
pub const IMAGENET_STD: [f32; 3] = [58.395, 57.12, 57.375];

/// A per-channel affine input normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    /// Per-channel mean subtracted from the input.
    pub mean: [f32; 3],
    /// Per-channel standard deviation dividing the input.
    pub std: [f32; 3],
}

impl Default for Normalization {
    fn default() -> Self {
        Self::imagenet()
    }
}

impl Normalization {
    /// The standard ImageNet statistics used by DINOv2 and friends.
    pub fn imagenet() -> Self {
        Self {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    /// Builds the explicit normalize node (used when folding is disabled).
    ///
    /// The node is weightless; the constants travel in its attributes.
    pub fn node(&self, index: usize, image_shape: Shape) -> NodeDef {
        NodeDef {
            name: "normalize".into(),
            op: OpKind::Normalize,
            index,
            weight_names: vec![],
            weight_shapes: vec![],
            dtype: DType::F32,
            input_shape: image_shape.clone(),
            output_shape: image_shape,
            attrs: NodeAttrs {
                mean: Some(self.mean),
                std: Some(self.std),
                ..Default::default()
            },
        }
    }

    /// Folds this normalization into a patch-embedding convolution.
    ///
    /// `weight` is the conv kernel in `[out, 3, k, k]` row-major layout,
    /// `bias` its `[out]` bias. Both are rewritten in place.
    pub fn fold_into_conv(
        &self,
        weight: &mut [f32],
        bias: &mut [f32],
        kernel: usize,
    ) -> Result<(), ExportError> {
        let out_channels = bias.len();
        let per_filter = 3 * kernel * kernel;
        if weight.len() != out_channels * per_filter {
            return Err(ExportError::TensorMismatch {
                name: "patch_embed.proj.weight".into(),
                detail: format!(
                    "kernel has {} elements, expected {} ({} filters × 3 × {kernel}²)",
                    weight.len(),
                    out_channels * per_filter,
                    out_channels,
                ),
            });
        }

        for o in 0..out_channels {
            let filter = &mut weight[o * per_filter..(o + 1) * per_filter];
            let mut shift = 0.0f64;
            for c in 0..3 {
                let inv_std = 1.0 / self.std[c];
                for w in &mut filter[c * kernel * kernel..(c + 1) * kernel * kernel] {
                    shift += (*w * self.mean[c] * inv_std) as f64;
                    *w *= inv_std;
                }
            }
            bias[o] -= shift as f32;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference: normalize an input channel-wise, then convolve.
    fn conv_1x1(
        weight: &[f32],
        bias: &[f32],
        pixel: [f32; 3],
    ) -> Vec<f32> {
        // kernel = 1, one spatial position: out_o = Σ_c W[o,c] · x_c + b_o.
        bias.iter()
            .enumerate()
            .map(|(o, b)| {
                (0..3).map(|c| weight[o * 3 + c] * pixel[c]).sum::<f32>() + b
            })
            .collect()
    }

    #[test]
    fn test_fold_matches_explicit_normalize() {
        let norm = Normalization::imagenet();
        let weight = vec![0.5, -0.25, 0.125, 1.0, 0.0, -1.0];
        let bias = vec![0.1, -0.2];

        let pixel = [200.0, 128.0, 37.0];
        let normalized = [
            (pixel[0] - norm.mean[0]) / norm.std[0],
            (pixel[1] - norm.mean[1]) / norm.std[1],
            (pixel[2] - norm.mean[2]) / norm.std[2],
        ];
        let expected = conv_1x1(&weight, &bias, normalized);

        let mut folded_w = weight.clone();
        let mut folded_b = bias.clone();
        norm.fold_into_conv(&mut folded_w, &mut folded_b, 1).unwrap();
        let got = conv_1x1(&folded_w, &folded_b, pixel);

        for (e, g) in expected.iter().zip(&got) {
            assert!((e - g).abs() < 1e-4, "expected {e}, got {g}");
        }
    }

    #[test]
    fn test_fold_rejects_wrong_kernel_size() {
        let norm = Normalization::imagenet();
        let mut weight = vec![0.0; 5]; // Not out × 3 × k².
        let mut bias = vec![0.0; 2];
        assert!(norm.fold_into_conv(&mut weight, &mut bias, 1).is_err());
    }

    #[test]
    fn test_node_is_weightless_and_carries_constants() {
        let norm = Normalization::imagenet();
        let shape = Shape::nchw(1, 3, 224, 224);
        let node = norm.node(0, shape.clone());
        assert_eq!(node.op, OpKind::Normalize);
        assert!(node.weight_names.is_empty());
        assert_eq!(node.input_shape, shape);
        assert_eq!(node.attrs.mean, Some(IMAGENET_MEAN));
        assert_eq!(node.attrs.std, Some(IMAGENET_STD));
    }

    #[test]
    fn test_imagenet_constants() {
        let n = Normalization::default();
        assert_eq!(n.mean, [123.675, 116.28, 103.53]);
        assert_eq!(n.std, [58.395, 57.12, 57.375]);
    }
}
