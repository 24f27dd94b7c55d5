// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The single-file IR artifact format.
//!
//! An artifact bundles the validated graph with the raw weight payload so
//! that downstream consumers (the engine builder, other runtimes) need a
//! single file:
//!
//! ```text
//! ┌────────────┬─────────────┬──────────────────────┬─────────────────┐
//! │ "VITIR1"   │ header_len  │ JSON ArtifactHeader  │ tensor payload  │
//! │ 6 bytes    │ u64 LE      │ header_len bytes     │ rest of file    │
//! └────────────┴─────────────┴──────────────────────┴─────────────────┘
//! ```
//!
//! The layout mirrors the SafeTensors convention (length-prefixed JSON
//! header followed by raw data) so readers can extract tensor metadata
//! without touching the payload. The reader memory-maps the file and hands
//! out zero-copy byte slices.

use crate::graph::{Loaded, Validated};
use crate::{DType, IrError, Shape, TensorGraph};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// File magic: identifies a vit-forge IR artifact, revision 1.
pub const MAGIC: &[u8; 6] = b"VITIR1";

/// Header schema version, bumped on incompatible header changes.
pub const FORMAT_VERSION: u32 = 1;

/// Per-tensor metadata stored in the artifact header.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TensorInfo {
    /// Element data type.
    pub dtype: DType,
    /// Tensor shape.
    pub shape: Shape,
    /// `[start, end)` byte range within the payload section.
    pub data_offsets: [u64; 2],
}

/// The JSON header embedded in an artifact file.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ArtifactHeader {
    /// Header schema version.
    format_version: u32,
    /// The exported graph (re-validated on read).
    graph: TensorGraph<Loaded>,
    /// Tensor name → payload location.
    tensors: BTreeMap<String, TensorInfo>,
}

/// An in-memory tensor staged for writing.
#[derive(Debug, Clone)]
pub struct TensorData {
    /// Tensor name (key referenced by graph nodes).
    pub name: String,
    /// Element data type.
    pub dtype: DType,
    /// Tensor shape.
    pub shape: Shape,
    /// Raw little-endian element bytes.
    pub data: Vec<u8>,
}

impl TensorData {
    /// Builds an f32 tensor from a value slice.
    pub fn from_f32(name: impl Into<String>, shape: Shape, values: &[f32]) -> Self {
        let mut data = Vec::with_capacity(values.len() * 4);
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Self {
            name: name.into(),
            dtype: DType::F32,
            shape,
            data,
        }
    }
}

// ── Writer ─────────────────────────────────────────────────────────

/// Writes a validated graph plus its weight payload to a single file.
pub struct ArtifactWriter;

impl ArtifactWriter {
    /// Serializes the artifact to `path` and returns the file size in bytes.
    ///
    /// # Errors
    /// - [`IrError::WeightNotFound`] if a graph node references a tensor
    ///   that is not in `tensors`.
    /// - [`IrError::Artifact`] if a tensor's byte length disagrees with its
    ///   declared shape and dtype.
    pub fn write(
        path: &Path,
        graph: &TensorGraph<Validated>,
        tensors: &[TensorData],
    ) -> Result<u64, IrError> {
        // Every weight the graph references must be present.
        let available: std::collections::HashSet<&str> =
            tensors.iter().map(|t| t.name.as_str()).collect();
        for node in graph.iter_nodes() {
            for wname in &node.weight_names {
                if !available.contains(wname.as_str()) {
                    return Err(IrError::WeightNotFound {
                        name: wname.clone(),
                    });
                }
            }
        }

        // Lay out the payload and build the offset table.
        let mut table = BTreeMap::new();
        let mut offset = 0u64;
        for t in tensors {
            let expected = t.shape.size_bytes(t.dtype);
            if t.data.len() != expected {
                return Err(IrError::Artifact(format!(
                    "tensor '{}' has {} bytes but shape {} × {} requires {}",
                    t.name,
                    t.data.len(),
                    t.shape,
                    t.dtype,
                    expected,
                )));
            }
            if table.contains_key(&t.name) {
                return Err(IrError::Artifact(format!(
                    "duplicate tensor name '{}'",
                    t.name
                )));
            }
            let end = offset + t.data.len() as u64;
            table.insert(
                t.name.clone(),
                TensorInfo {
                    dtype: t.dtype,
                    shape: t.shape.clone(),
                    data_offsets: [offset, end],
                },
            );
            offset = end;
        }

        let header = ArtifactHeader {
            format_version: FORMAT_VERSION,
            graph: graph.to_loaded(),
            tensors: table,
        };
        let header_json = serde_json::to_vec(&header)?;

        let file = std::fs::File::create(path)?;
        let mut w = std::io::BufWriter::new(file);
        w.write_all(MAGIC)?;
        w.write_all(&(header_json.len() as u64).to_le_bytes())?;
        w.write_all(&header_json)?;
        for t in tensors {
            w.write_all(&t.data)?;
        }
        w.flush()?;

        let total = MAGIC.len() as u64 + 8 + header_json.len() as u64 + offset;
        tracing::info!(
            "wrote artifact '{}' ({:.2} MB, {} tensors)",
            path.display(),
            total as f64 / (1024.0 * 1024.0),
            tensors.len(),
        );
        Ok(total)
    }
}

// ── Reader ─────────────────────────────────────────────────────────

/// A memory-mapped IR artifact opened for reading.
pub struct Artifact {
    header: ArtifactHeader,
    mmap: memmap2::Mmap,
    data_start: usize,
}

impl Artifact {
    /// Opens and verifies an artifact file.
    ///
    /// Parses the magic, the length-prefixed JSON header, and bounds-checks
    /// every tensor's payload range. The graph itself is re-validated
    /// lazily by [`Artifact::graph`].
    pub fn open(path: &Path) -> Result<Self, IrError> {
        let file = std::fs::File::open(path)?;
        let mmap = unsafe { memmap2::Mmap::map(&file) }
            .map_err(|e| IrError::Artifact(format!("mmap failed: {e}")))?;

        if mmap.len() < MAGIC.len() + 8 {
            return Err(IrError::Artifact("file too short for header".into()));
        }
        if &mmap[..MAGIC.len()] != MAGIC {
            return Err(IrError::Artifact("bad magic, not a vit-forge artifact".into()));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&mmap[MAGIC.len()..MAGIC.len() + 8]);
        let header_len = u64::from_le_bytes(len_bytes) as usize;

        let header_start = MAGIC.len() + 8;
        let data_start = header_start
            .checked_add(header_len)
            .filter(|&end| end <= mmap.len())
            .ok_or_else(|| IrError::Artifact("header length exceeds file size".into()))?;

        let header: ArtifactHeader =
            serde_json::from_slice(&mmap[header_start..data_start])?;

        if header.format_version != FORMAT_VERSION {
            return Err(IrError::Artifact(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                header.format_version,
            )));
        }

        let payload_len = (mmap.len() - data_start) as u64;
        for (name, info) in &header.tensors {
            let [start, end] = info.data_offsets;
            if start > end || end > payload_len {
                return Err(IrError::Artifact(format!(
                    "tensor '{name}' offsets [{start}, {end}) exceed payload ({payload_len} bytes)"
                )));
            }
        }

        Ok(Self {
            header,
            mmap,
            data_start,
        })
    }

    /// Returns the embedded graph, re-validated.
    pub fn graph(&self) -> Result<TensorGraph<Validated>, IrError> {
        self.header.graph.clone().validate()
    }

    /// Returns the raw bytes of a tensor by name.
    pub fn tensor(&self, name: &str) -> Result<&[u8], IrError> {
        let info = self.tensor_info(name).ok_or_else(|| IrError::WeightNotFound {
            name: name.to_string(),
        })?;
        let [start, end] = info.data_offsets;
        Ok(&self.mmap[self.data_start + start as usize..self.data_start + end as usize])
    }

    /// Returns metadata for a tensor by name.
    pub fn tensor_info(&self, name: &str) -> Option<&TensorInfo> {
        self.header.tensors.get(name)
    }

    /// Iterates over tensor names in sorted order.
    pub fn tensor_names(&self) -> impl Iterator<Item = &str> {
        self.header.tensors.keys().map(String::as_str)
    }

    /// Number of tensors in the payload.
    pub fn num_tensors(&self) -> usize {
        self.header.tensors.len()
    }

    /// Total payload size in bytes.
    pub fn payload_bytes(&self) -> usize {
        self.mmap.len() - self.data_start
    }

    /// Returns a one-line description of the artifact.
    pub fn summary(&self) -> String {
        format!(
            "Artifact v{}: {} tensors, {:.2} MB payload",
            self.header.format_version,
            self.num_tensors(),
            self.payload_bytes() as f64 / (1024.0 * 1024.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NodeAttrs, NodeDef, OpKind};

    fn tiny_graph() -> TensorGraph<Validated> {
        let nodes = vec![NodeDef {
            name: "norm".into(),
            op: OpKind::LayerNorm,
            index: 0,
            weight_names: vec!["norm.weight".into(), "norm.bias".into()],
            weight_shapes: vec![Shape::vector(4), Shape::vector(4)],
            dtype: DType::F32,
            input_shape: Shape::tokens(1, 2, 4),
            output_shape: Shape::tokens(1, 2, 4),
            attrs: NodeAttrs {
                epsilon: Some(1e-6),
                ..Default::default()
            },
        }];
        TensorGraph::new("tiny".into(), 1, 28, 28, 14, 14, nodes)
            .validate()
            .unwrap()
    }

    fn tiny_tensors() -> Vec<TensorData> {
        vec![
            TensorData::from_f32("norm.weight", Shape::vector(4), &[1.0, 1.0, 1.0, 1.0]),
            TensorData::from_f32("norm.bias", Shape::vector(4), &[0.0, 0.5, -0.5, 0.0]),
        ]
    }

    #[test]
    fn test_write_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.vitir");

        let written = ArtifactWriter::write(&path, &tiny_graph(), &tiny_tensors()).unwrap();
        assert_eq!(written, std::fs::metadata(&path).unwrap().len());

        let artifact = Artifact::open(&path).unwrap();
        assert_eq!(artifact.num_tensors(), 2);
        assert_eq!(artifact.payload_bytes(), 32);

        let graph = artifact.graph().unwrap();
        assert_eq!(graph.name, "tiny");
        assert_eq!(graph.num_nodes(), 1);
    }

    #[test]
    fn test_tensor_bytes_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.vitir");
        ArtifactWriter::write(&path, &tiny_graph(), &tiny_tensors()).unwrap();

        let artifact = Artifact::open(&path).unwrap();
        let bytes = artifact.tensor("norm.bias").unwrap();
        let vals: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(vals, vec![0.0, 0.5, -0.5, 0.0]);
    }

    #[test]
    fn test_missing_weight_rejected_at_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.vitir");
        // Drop the bias tensor the graph references.
        let tensors = vec![tiny_tensors().remove(0)];
        let err = ArtifactWriter::write(&path, &tiny_graph(), &tensors).unwrap_err();
        assert!(matches!(err, IrError::WeightNotFound { .. }));
    }

    #[test]
    fn test_shape_length_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.vitir");
        let mut tensors = tiny_tensors();
        tensors[0].data.pop(); // Corrupt the byte length.
        assert!(ArtifactWriter::write(&path, &tiny_graph(), &tensors).is_err());
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.vitir");
        std::fs::write(&path, b"NOTANARTIFACTFILE_____").unwrap();
        assert!(matches!(
            Artifact::open(&path),
            Err(IrError::Artifact(_))
        ));
    }

    #[test]
    fn test_open_rejects_truncated_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trunc.vitir");
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&(1_000_000u64).to_le_bytes()); // Header longer than file.
        std::fs::write(&path, &bytes).unwrap();
        assert!(Artifact::open(&path).is_err());
    }

    #[test]
    fn test_unknown_tensor_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.vitir");
        ArtifactWriter::write(&path, &tiny_graph(), &tiny_tensors()).unwrap();
        let artifact = Artifact::open(&path).unwrap();
        assert!(matches!(
            artifact.tensor("nope"),
            Err(IrError::WeightNotFound { .. })
        ));
    }
}
