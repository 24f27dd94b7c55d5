// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The engine build pipeline with type-state–enforced ordering.
//!
//! ```text
//! EngineBuilder<Idle>
//!     │  .parse(&artifact)
//!     ▼
//! EngineBuilder<Parsed>
//!     │  .build(&mut cache)
//!     ▼
//!   Engine
//! ```
//!
//! Each state transition consumes the old value and returns a new one,
//! making invalid build sequences a compile error: an engine cannot be
//! built before an artifact has been parsed and validated.

use crate::codec::{Reader, Writer};
use crate::timing_cache::TimingCache;
use crate::tuner::{KernelTuner, TunerStats};
use crate::{BuildError, BuilderConfig, Precision, WorkspaceLimit};
use graph_ir::graph::Validated;
use graph_ir::{Artifact, DType, Shape, TensorGraph};
use half::f16;
use std::collections::BTreeSet;
use std::io::Write as _;
use std::path::Path;

const MAGIC: &[u8; 4] = b"VFEN";
const VERSION: u16 = 1;

// ── Type-state markers ─────────────────────────────────────────

/// Builder is created but no artifact is parsed.
#[derive(Debug)]
pub struct Idle;

/// Artifact is parsed and its graph validated.
#[derive(Debug)]
pub struct Parsed;

/// Sealed trait for builder states.
pub trait BuildState: std::fmt::Debug {}
impl BuildState for Idle {}
impl BuildState for Parsed {}

// ── Bindings ───────────────────────────────────────────────────

/// One node's compiled kernel assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelBinding {
    /// Node name this binding executes.
    pub node: String,
    /// Selected kernel identifier.
    pub kernel: String,
    /// Measured latency in nanoseconds.
    pub latency_ns: u64,
    /// Scratch memory the kernel requires, in bytes.
    pub workspace_bytes: u64,
}

// ── Engine ─────────────────────────────────────────────────────

/// A compiled, serializable engine: kernel bindings plus weight blobs
/// in the build precision.
#[derive(Debug)]
pub struct Engine {
    /// Source model name.
    pub name: String,
    /// Device the engine was tuned for.
    pub device: String,
    /// Weight/activation precision.
    pub precision: Precision,
    /// Name of the input binding runtimes feed the image into.
    pub input_name: String,
    /// Expected input shape (`batch × 3 × height × width`).
    pub input_shape: Shape,
    /// Name of the output binding the patch tokens come out of.
    pub output_name: String,
    /// Produced output shape (`batch × patch_tokens × channels`).
    pub output_shape: Shape,
    /// Per-node kernel assignments in execution order.
    pub bindings: Vec<KernelBinding>,
    /// Weight tensors, converted to the build precision.
    weights: Vec<(String, Vec<u8>)>,
}

impl Engine {
    /// Sum of per-node measured latencies, in nanoseconds.
    pub fn estimated_latency_ns(&self) -> u64 {
        self.bindings.iter().map(|b| b.latency_ns).sum()
    }

    /// Total weight payload size in bytes.
    pub fn weight_bytes(&self) -> usize {
        self.weights.iter().map(|(_, data)| data.len()).sum()
    }

    /// Looks up a weight blob by tensor name.
    pub fn weight(&self, name: &str) -> Option<&[u8]> {
        self.weights
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    /// Number of weight tensors carried by the engine.
    pub fn num_weights(&self) -> usize {
        self.weights.len()
    }

    /// Serializes the engine to its binary blob.
    pub fn serialize(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.raw(MAGIC);
        w.u16(VERSION);
        w.string(&self.name);
        w.string(&self.device);
        w.u8(self.precision.tag());
        w.string(&self.input_name);
        write_shape(&mut w, &self.input_shape);
        w.string(&self.output_name);
        write_shape(&mut w, &self.output_shape);

        w.u32(self.bindings.len() as u32);
        for b in &self.bindings {
            w.string(&b.node);
            w.string(&b.kernel);
            w.u64(b.latency_ns);
            w.u64(b.workspace_bytes);
        }

        w.u32(self.weights.len() as u32);
        for (name, data) in &self.weights {
            w.string(name);
            w.bytes(data);
        }
        w.finish()
    }

    /// Writes the serialized engine to disk. Returns the file size.
    pub fn write(&self, path: &Path) -> Result<u64, BuildError> {
        let blob = self.serialize();
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        file.write_all(&blob)?;
        file.flush()?;
        tracing::info!("wrote engine to {} ({} bytes)", path.display(), blob.len());
        Ok(blob.len() as u64)
    }

    /// Reads a serialized engine back from disk.
    pub fn read_from(path: &Path) -> Result<Self, BuildError> {
        let blob = std::fs::read(path)?;
        let mut r = Reader::new(&blob, "engine");
        r.expect_magic(MAGIC)?;

        let version = r.u16()?;
        if version != VERSION {
            return Err(BuildError::format(
                "engine",
                format!("format version {version}, expected {VERSION}"),
            ));
        }

        let name = r.string()?;
        let device = r.string()?;
        let precision = Precision::from_tag(r.u8()?)
            .ok_or_else(|| BuildError::format("engine", "unknown precision tag"))?;
        let input_name = r.string()?;
        let input_shape = read_shape(&mut r)?;
        let output_name = r.string()?;
        let output_shape = read_shape(&mut r)?;

        let num_bindings = r.u32()? as usize;
        let mut bindings = Vec::with_capacity(num_bindings);
        for _ in 0..num_bindings {
            bindings.push(KernelBinding {
                node: r.string()?,
                kernel: r.string()?,
                latency_ns: r.u64()?,
                workspace_bytes: r.u64()?,
            });
        }

        let num_weights = r.u32()? as usize;
        let mut weights = Vec::with_capacity(num_weights);
        for _ in 0..num_weights {
            let name = r.string()?;
            let data = r.bytes()?;
            weights.push((name, data));
        }

        Ok(Self {
            name,
            device,
            precision,
            input_name,
            input_shape,
            output_name,
            output_shape,
            bindings,
            weights,
        })
    }

    /// Returns a one-line description for logs and CLI output.
    pub fn summary(&self) -> String {
        let weight_mb = self.weight_bytes() as f64 / (1024.0 * 1024.0);
        format!(
            "Engine '{}': '{}' {} → '{}' {}, {} bindings, {:.1} MB weights ({}), est. {:.2} ms on '{}'",
            self.name,
            self.input_name,
            self.input_shape,
            self.output_name,
            self.output_shape,
            self.bindings.len(),
            weight_mb,
            self.precision,
            self.estimated_latency_ns() as f64 / 1_000_000.0,
            self.device,
        )
    }
}

fn write_shape(w: &mut Writer, shape: &Shape) {
    let dims = shape.dims();
    w.u8(dims.len() as u8);
    for &d in dims {
        w.u64(d as u64);
    }
}

fn read_shape(r: &mut Reader<'_>) -> Result<Shape, BuildError> {
    let rank = r.u8()? as usize;
    let mut dims = Vec::with_capacity(rank);
    for _ in 0..rank {
        dims.push(r.u64()? as usize);
    }
    Ok(Shape::new(dims))
}

// ── Builder ────────────────────────────────────────────────────

/// Compiles an artifact into an [`Engine`].
///
/// `S` is a type-state marker that enforces the pipeline ordering at
/// compile time. You cannot call `.build()` before `.parse()` — the
/// compiler catches it.
pub struct EngineBuilder<'a, S: BuildState = Idle> {
    config: BuilderConfig,
    workspace: WorkspaceLimit,
    _state: std::marker::PhantomData<S>,
    // Fields populated as the builder transitions through states:
    artifact: Option<&'a Artifact>,
    graph: Option<TensorGraph<Validated>>,
}

impl<'a> EngineBuilder<'a, Idle> {
    /// Creates a builder from the given configuration.
    ///
    /// Parses the workspace string up front so a bad size fails before
    /// any artifact I/O.
    pub fn new(config: BuilderConfig) -> Result<Self, BuildError> {
        let workspace = config.parse_workspace()?;
        tracing::info!("{}", config.summary());
        Ok(Self {
            config,
            workspace,
            _state: std::marker::PhantomData,
            artifact: None,
            graph: None,
        })
    }

    /// Parses and validates the artifact. Transitions to `Parsed`.
    pub fn parse(self, artifact: &'a Artifact) -> Result<EngineBuilder<'a, Parsed>, BuildError> {
        let graph = artifact.graph()?;
        tracing::info!("{}", graph.summary());

        Ok(EngineBuilder {
            config: self.config,
            workspace: self.workspace,
            _state: std::marker::PhantomData,
            artifact: Some(artifact),
            graph: Some(graph),
        })
    }
}

impl<'a> EngineBuilder<'a, Parsed> {
    /// Returns the validated graph.
    pub fn graph(&self) -> &TensorGraph<Validated> {
        self.graph.as_ref().expect("graph exists in Parsed state")
    }

    /// Tunes a kernel per node and assembles the engine.
    ///
    /// The timing cache is consulted before tuning and updated with every
    /// new measurement, so a warm cache makes the whole pass lookups.
    /// Returns the built engine and the tuner's hit/miss counters.
    pub fn build(self, cache: &mut TimingCache) -> Result<(Engine, TunerStats), BuildError> {
        let graph = self.graph.expect("graph exists in Parsed state");
        let artifact = self.artifact.expect("artifact exists in Parsed state");
        let precision = self.config.precision();
        let mut tuner = KernelTuner::new(precision, self.workspace);

        let mut bindings = Vec::with_capacity(graph.num_nodes());
        for node in graph.iter_nodes() {
            let rec = tuner.select(node, cache)?;
            tracing::debug!(
                "bound '{}' to {} ({} ns)",
                node.name,
                rec.kernel,
                rec.latency_ns,
            );
            bindings.push(KernelBinding {
                node: node.name.clone(),
                kernel: rec.kernel,
                latency_ns: rec.latency_ns,
                workspace_bytes: rec.workspace_bytes,
            });
        }

        // Collect weights once per tensor — nodes may share names across
        // the graph, the payload stores each blob a single time.
        let mut seen = BTreeSet::new();
        let mut weights = Vec::new();
        for node in graph.iter_nodes() {
            for name in &node.weight_names {
                if !seen.insert(name.clone()) {
                    continue;
                }
                let raw = artifact.tensor(name)?;
                let dtype = artifact
                    .tensor_info(name)
                    .map(|info| info.dtype)
                    .unwrap_or(DType::F32);
                weights.push((name.clone(), convert_weights(raw, dtype, precision)?));
            }
        }

        let stats = tuner.stats();
        tracing::info!("{}", stats.summary());

        let engine = Engine {
            name: graph.name.clone(),
            device: self.config.device.clone(),
            precision,
            input_name: graph.input_name().to_string(),
            input_shape: Shape::nchw(
                graph.batch_size,
                3,
                graph.image_height,
                graph.image_width,
            ),
            output_name: graph.output_name().to_string(),
            output_shape: Shape::tokens(
                graph.batch_size,
                graph.num_patch_tokens(),
                output_channels(&graph),
            ),
            bindings,
            weights,
        };
        tracing::info!("{}", engine.summary());
        Ok((engine, stats))
    }
}

/// Trailing feature dimension of the final node's output.
fn output_channels(graph: &TensorGraph<Validated>) -> usize {
    graph
        .nodes
        .last()
        .and_then(|n| n.output_shape.dims().last().copied())
        .unwrap_or(0)
}

/// Converts a raw f32 weight blob to the build precision.
///
/// Non-f32 source tensors pass through untouched — a checkpoint already
/// stored in half precision is not round-tripped.
fn convert_weights(raw: &[u8], dtype: DType, precision: Precision) -> Result<Vec<u8>, BuildError> {
    if precision != Precision::F16 || dtype != DType::F32 {
        return Ok(raw.to_vec());
    }
    if raw.len() % 4 != 0 {
        return Err(BuildError::format(
            "engine",
            format!("f32 tensor byte length {} not a multiple of 4", raw.len()),
        ));
    }

    let mut out = Vec::with_capacity(raw.len() / 2);
    for chunk in raw.chunks_exact(4) {
        let v = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        out.extend_from_slice(&f16::from_f32(v).to_le_bytes());
    }
    Ok(out)
}

impl<'a, S: BuildState> std::fmt::Debug for EngineBuilder<'a, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("state", &std::any::type_name::<S>())
            .field("workspace", &self.workspace.to_string())
            .field("precision", &self.config.precision())
            .field("has_artifact", &self.artifact.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_ir::{ArtifactWriter, NodeAttrs, NodeDef, OpKind, TensorData};

    /// Builds a two-node artifact on disk and opens it.
    fn test_artifact(dir: &Path) -> Artifact {
        let channels = 8;
        let nodes = vec![
            NodeDef {
                name: "norm".into(),
                op: OpKind::LayerNorm,
                index: 0,
                weight_names: vec!["norm.weight".into(), "norm.bias".into()],
                weight_shapes: vec![Shape::vector(channels), Shape::vector(channels)],
                dtype: DType::F32,
                input_shape: Shape::tokens(1, 5, channels),
                output_shape: Shape::tokens(1, 5, channels),
                attrs: NodeAttrs {
                    epsilon: Some(1e-6),
                    ..Default::default()
                },
            },
            NodeDef {
                name: "patch_tokens".into(),
                op: OpKind::TokenExtract,
                index: 1,
                weight_names: vec![],
                weight_shapes: vec![],
                dtype: DType::F32,
                input_shape: Shape::tokens(1, 5, channels),
                output_shape: Shape::tokens(1, 4, channels),
                attrs: NodeAttrs {
                    drop_tokens: Some(1),
                    ..Default::default()
                },
            },
        ];
        let graph = graph_ir::TensorGraph::new("tiny".into(), 1, 28, 28, 14, 14, nodes)
            .validate()
            .unwrap();

        let tensors = vec![
            TensorData::from_f32("norm.weight", Shape::vector(channels), &[1.0; 8]),
            TensorData::from_f32("norm.bias", Shape::vector(channels), &[0.5; 8]),
        ];
        let path = dir.join("tiny.vitir");
        ArtifactWriter::write(&path, &graph, &tensors).unwrap();
        Artifact::open(&path).unwrap()
    }

    #[test]
    fn test_parse_then_build() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = test_artifact(dir.path());
        let mut cache = TimingCache::new("generic");

        let builder = EngineBuilder::new(BuilderConfig::default()).unwrap();
        let parsed = builder.parse(&artifact).unwrap();
        assert_eq!(parsed.graph().num_nodes(), 2);

        let (engine, stats) = parsed.build(&mut cache).unwrap();
        assert_eq!(engine.bindings.len(), 2);
        assert_eq!(engine.num_weights(), 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 0);
        assert!(engine.estimated_latency_ns() > 0);
        assert_eq!(engine.input_name, graph_ir::GRAPH_INPUT);
        assert_eq!(engine.input_shape, Shape::nchw(1, 3, 28, 28));
        assert_eq!(engine.output_name, graph_ir::GRAPH_OUTPUT);
        assert_eq!(engine.output_shape, Shape::tokens(1, 4, 8));
    }

    #[test]
    fn test_warm_cache_build_is_all_hits() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = test_artifact(dir.path());
        let mut cache = TimingCache::new("generic");

        let cold = EngineBuilder::new(BuilderConfig::default())
            .unwrap()
            .parse(&artifact)
            .unwrap();
        cold.build(&mut cache).unwrap();

        let warm = EngineBuilder::new(BuilderConfig::default())
            .unwrap()
            .parse(&artifact)
            .unwrap();
        let (_, stats) = warm.build(&mut cache).unwrap();
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hits, 2);
    }

    #[test]
    fn test_fp16_halves_weight_payload() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = test_artifact(dir.path());
        let mut cache = TimingCache::new("generic");

        let (f32_engine, _) = EngineBuilder::new(BuilderConfig::default())
            .unwrap()
            .parse(&artifact)
            .unwrap()
            .build(&mut cache)
            .unwrap();

        let config = BuilderConfig {
            flags: vec![crate::BuilderFlag::Fp16],
            ..Default::default()
        };
        let (f16_engine, _) = EngineBuilder::new(config)
            .unwrap()
            .parse(&artifact)
            .unwrap()
            .build(&mut cache)
            .unwrap();

        assert_eq!(f16_engine.weight_bytes() * 2, f32_engine.weight_bytes());
        assert_eq!(f16_engine.precision, Precision::F16);

        // 1.0 and 0.5 are exactly representable in f16.
        let w = f16_engine.weight("norm.weight").unwrap();
        let first = f16::from_le_bytes([w[0], w[1]]);
        assert_eq!(first.to_f32(), 1.0);
    }

    #[test]
    fn test_engine_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = test_artifact(dir.path());
        let mut cache = TimingCache::new("generic");

        let (engine, _) = EngineBuilder::new(BuilderConfig::default())
            .unwrap()
            .parse(&artifact)
            .unwrap()
            .build(&mut cache)
            .unwrap();

        let path = dir.path().join("tiny.engine");
        let written = engine.write(&path).unwrap();
        assert_eq!(written, std::fs::metadata(&path).unwrap().len());

        let back = Engine::read_from(&path).unwrap();
        assert_eq!(back.name, engine.name);
        assert_eq!(back.precision, engine.precision);
        assert_eq!(back.bindings, engine.bindings);
        assert_eq!(back.input_name, engine.input_name);
        assert_eq!(back.input_shape, engine.input_shape);
        assert_eq!(back.output_name, engine.output_name);
        assert_eq!(back.weight("norm.bias"), engine.weight("norm.bias"));
    }

    #[test]
    fn test_read_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.engine");
        std::fs::write(&path, b"definitely not an engine").unwrap();
        assert!(matches!(
            Engine::read_from(&path),
            Err(BuildError::Format { .. })
        ));
    }

    #[test]
    fn test_bad_workspace_fails_before_parse() {
        let config = BuilderConfig {
            workspace: "plenty".into(),
            ..Default::default()
        };
        assert!(matches!(
            EngineBuilder::new(config),
            Err(BuildError::Config(_))
        ));
    }
}
