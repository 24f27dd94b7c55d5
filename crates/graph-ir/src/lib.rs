// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # graph-ir
//!
//! A portable intermediate representation (IR) for vision-transformer
//! export artifacts.
//!
//! Rather than depending on a heavyweight graph-exchange framework, this
//! crate defines a minimal IR that captures what the engine builder and
//! downstream runtimes need:
//!
//! - [`OpKind`] — the kind of computation each node performs.
//! - [`NodeDef`] — a single node's metadata, weight references, and shape info.
//! - [`TensorGraph`] — the exported forward pass as an ordered chain of
//!   nodes, with a **type-state pattern** (`Loaded` → `Validated`).
//! - [`ModelManifest`] — the JSON descriptor of the source checkpoint.
//! - [`Artifact`] / [`ArtifactWriter`] — the single-file on-disk format
//!   bundling the graph header with the raw weight payload.
//!
//! # Artifact Layout
//! ```text
//! ┌────────┬────────────┬──────────────────┬───────────────────┐
//! │ magic  │ header len │ JSON header      │ raw tensor data   │
//! │ 6 B    │ u64 LE     │ graph + offsets  │ back to back      │
//! └────────┴────────────┴──────────────────┴───────────────────┘
//! ```
//!
//! # Example
//! ```no_run
//! use graph_ir::Artifact;
//! use std::path::Path;
//!
//! let artifact = Artifact::open(Path::new("dinov2_vits14_1-3-504-504.vitir")).unwrap();
//! let graph = artifact.graph().unwrap();
//! println!("{}", graph.summary());
//! ```

pub mod artifact;
mod dtype;
mod error;
pub mod graph;
mod manifest;
mod node;
mod shape;

pub use artifact::{Artifact, ArtifactWriter, TensorData, TensorInfo};
pub use dtype::DType;
pub use error::IrError;
pub use graph::TensorGraph;
pub use manifest::ModelManifest;
pub use node::{NodeAttrs, NodeDef, OpKind};
pub use shape::Shape;

/// Name of the graph's sole input tensor in exported artifacts.
pub const GRAPH_INPUT: &str = "input";

/// Name of the graph's sole output tensor: the normalised patch tokens.
pub const GRAPH_OUTPUT: &str = "unpooled_features";
