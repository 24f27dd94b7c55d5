// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Checkpoint weight access with memory-mapped I/O.
//!
//! [`WeightStore`] provides two modes:
//!
//! 1. **File-backed** — opens `model.safetensors` via mmap and hands out
//!    tensor bytes on demand. This is the production path.
//! 2. **Synthetic** — generates deterministic pseudo-random weight data for
//!    tests and pipeline demos without requiring a real checkpoint.

use crate::ExportError;
use graph_ir::{DType, Shape};
use std::path::{Path, PathBuf};

/// Default SafeTensors filename inside a model directory.
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Serves checkpoint tensors to the graph exporter.
#[derive(Debug)]
pub struct WeightStore {
    /// Path to the model directory.
    model_dir: PathBuf,
    /// Memory-mapped SafeTensors file (absent in synthetic mode).
    mmap: Option<memmap2::Mmap>,
}

impl WeightStore {
    /// Opens the SafeTensors file under `model_dir`.
    pub fn open(model_dir: &Path) -> Result<Self, ExportError> {
        let weights_path = model_dir.join(WEIGHTS_FILE);
        let file = std::fs::File::open(&weights_path).map_err(|e| {
            ExportError::Weights(format!("cannot open '{}': {e}", weights_path.display()))
        })?;
        let mmap = unsafe { memmap2::Mmap::map(&file) }
            .map_err(|e| ExportError::Weights(format!("mmap failed: {e}")))?;

        // Parse the header once to fail early on a corrupt file.
        safetensors::SafeTensors::deserialize(&mmap)
            .map_err(|e| ExportError::Weights(format!("SafeTensors parse error: {e}")))?;

        tracing::info!(
            "weight store: mmap'd {} ({:.2} MB)",
            weights_path.display(),
            mmap.len() as f64 / (1024.0 * 1024.0),
        );

        Ok(Self {
            model_dir: model_dir.to_path_buf(),
            mmap: Some(mmap),
        })
    }

    /// Creates a store in synthetic mode (no file needed).
    ///
    /// Every requested tensor is fabricated with small deterministic values
    /// derived from its name, so repeated exports are reproducible.
    pub fn synthetic() -> Self {
        tracing::warn!("weight store: synthetic mode, weights are fabricated");
        Self {
            model_dir: PathBuf::from("<synthetic>"),
            mmap: None,
        }
    }

    /// Returns `true` if operating in file-backed mode.
    pub fn is_file_backed(&self) -> bool {
        self.mmap.is_some()
    }

    /// Returns the model directory path.
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Fetches a tensor's raw bytes, verifying shape and dtype.
    ///
    /// In synthetic mode the tensor is fabricated to the requested shape.
    pub fn fetch(
        &self,
        name: &str,
        shape: &Shape,
        dtype: DType,
    ) -> Result<Vec<u8>, ExportError> {
        match &self.mmap {
            Some(mmap) => {
                let tensors = safetensors::SafeTensors::deserialize(mmap)
                    .map_err(|e| ExportError::Weights(format!("SafeTensors error: {e}")))?;
                let view = tensors.tensor(name).map_err(|_| ExportError::MissingTensor {
                    name: name.to_string(),
                })?;

                if view.shape() != shape.dims() {
                    return Err(ExportError::TensorMismatch {
                        name: name.to_string(),
                        detail: format!(
                            "checkpoint shape {:?} != expected {shape}",
                            view.shape(),
                        ),
                    });
                }
                let found = convert_safetensor_dtype(view.dtype())?;
                if found != dtype {
                    return Err(ExportError::TensorMismatch {
                        name: name.to_string(),
                        detail: format!("checkpoint dtype {found} != expected {dtype}"),
                    });
                }
                Ok(view.data().to_vec())
            }
            None => Ok(synthetic_bytes(name, shape, dtype)),
        }
    }

    /// Fetches a tensor as f32 values (constant-folding path).
    pub fn fetch_f32(&self, name: &str, shape: &Shape) -> Result<Vec<f32>, ExportError> {
        let bytes = self.fetch(name, shape, DType::F32)?;
        Ok(bytes_to_f32(&bytes))
    }

    /// Fetches an f32 tensor using its on-disk shape.
    ///
    /// Used for tensors whose checkpoint shape depends on the training
    /// resolution (the position embedding). In synthetic mode the tensor is
    /// fabricated at `fallback` instead.
    pub fn fetch_f32_dynamic(
        &self,
        name: &str,
        fallback: &Shape,
    ) -> Result<(Shape, Vec<f32>), ExportError> {
        match &self.mmap {
            Some(mmap) => {
                let tensors = safetensors::SafeTensors::deserialize(mmap)
                    .map_err(|e| ExportError::Weights(format!("SafeTensors error: {e}")))?;
                let view = tensors.tensor(name).map_err(|_| ExportError::MissingTensor {
                    name: name.to_string(),
                })?;
                let found = convert_safetensor_dtype(view.dtype())?;
                if found != DType::F32 {
                    return Err(ExportError::TensorMismatch {
                        name: name.to_string(),
                        detail: format!("dtype {found} not supported for resampling"),
                    });
                }
                let shape = Shape::new(view.shape().to_vec());
                Ok((shape, bytes_to_f32(view.data())))
            }
            None => {
                let bytes = synthetic_bytes(name, fallback, DType::F32);
                Ok((fallback.clone(), bytes_to_f32(&bytes)))
            }
        }
    }
}

fn bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Converts a SafeTensors `Dtype` to our [`DType`].
fn convert_safetensor_dtype(st_dtype: safetensors::Dtype) -> Result<DType, ExportError> {
    match st_dtype {
        safetensors::Dtype::F32 => Ok(DType::F32),
        safetensors::Dtype::F16 => Ok(DType::F16),
        safetensors::Dtype::BF16 => Ok(DType::BF16),
        other => Err(ExportError::Weights(format!(
            "unsupported SafeTensors dtype: {other:?}"
        ))),
    }
}

/// Deterministic small values seeded by the tensor name.
///
/// Values stay in roughly `[-0.05, 0.05]` so folded constants remain
/// well-conditioned in tests.
fn synthetic_bytes(name: &str, shape: &Shape, dtype: DType) -> Vec<u8> {
    // FNV-1a over the name gives a stable per-tensor seed.
    let mut seed: u64 = 0xcbf2_9ce4_8422_2325;
    for b in name.bytes() {
        seed ^= b as u64;
        seed = seed.wrapping_mul(0x0000_0100_0000_01b3);
    }

    let n = shape.num_elements();
    let mut out = Vec::with_capacity(n * dtype.size_bytes());
    let mut state = seed;
    for _ in 0..n {
        // xorshift64*
        state ^= state >> 12;
        state ^= state << 25;
        state ^= state >> 27;
        let r = state.wrapping_mul(0x2545_f491_4f6c_dd1d);
        let v = ((r >> 40) as f32 / (1u32 << 24) as f32 - 0.5) * 0.1;
        match dtype {
            DType::F32 => out.extend_from_slice(&v.to_le_bytes()),
            // Synthetic halves: keep the upper f32 bit-pattern half.
            DType::F16 | DType::BF16 => {
                let bits = (v.to_bits() >> 16) as u16;
                out.extend_from_slice(&bits.to_le_bytes());
            }
        }
    }
    out
}
