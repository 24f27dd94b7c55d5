// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the export stage.

/// Errors that can occur while exporting a model to an IR artifact.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The requested opset version is outside the supported range.
    #[error("unsupported opset version {version} (supported: {min}..={max})")]
    UnsupportedOpset { version: u32, min: u32, max: u32 },

    /// The SafeTensors weight file could not be opened or parsed.
    #[error("failed to load weights: {0}")]
    Weights(String),

    /// A tensor required by the graph is missing from the checkpoint.
    #[error("checkpoint is missing tensor '{name}'")]
    MissingTensor { name: String },

    /// A checkpoint tensor has an unexpected shape or dtype.
    #[error("tensor '{name}' mismatch: {detail}")]
    TensorMismatch { name: String, detail: String },

    /// Configuration error (bad TOML, invalid field values).
    #[error("configuration error: {0}")]
    Config(String),

    /// An IR-level failure (validation, artifact I/O).
    #[error(transparent)]
    Ir(#[from] graph_ir::IrError),

    /// A filesystem failure outside artifact writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
