// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # exporter
//!
//! Converts a pretrained vision-transformer checkpoint into a portable
//! IR artifact.
//!
//! The export stage wraps the model's forward pass with the fixed ImageNet
//! normalization (the deployed model receives raw `[0, 255]` pixels), builds
//! the node chain for a concrete batch size and resolution, and writes a
//! single-file artifact that the engine builder consumes.
//!
//! Pipeline position:
//! ```text
//! model.json + model.safetensors → [exporter] → {name}.vitir → engine-builder
//! ```
//!
//! - [`ExportConfig`] — resolution, batch size, opset, output naming.
//! - [`Exporter`] — manifest + weights → validated graph → artifact.
//! - [`Sweep`] — sequential export across a grid of resolutions.
//! - [`WeightStore`] — SafeTensors access with a synthetic fallback.

mod config;
mod error;
mod export;
mod normalize;
mod sweep;
mod weights;

pub use config::{ExportConfig, OPSET_MAX, OPSET_MIN};
pub use error::ExportError;
pub use export::{ExportReport, Exporter};
pub use normalize::{Normalization, IMAGENET_MEAN, IMAGENET_STD};
pub use sweep::{Sweep, SweepConfig, SweepReport};
pub use weights::WeightStore;
