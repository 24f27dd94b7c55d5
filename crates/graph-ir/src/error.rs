// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for IR construction and artifact I/O.

/// Errors that can occur when working with graph representations.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// A file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The manifest or artifact header JSON is malformed.
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// An image dimension is not a multiple of the patch size.
    #[error("image {axis} must be a multiple of patch size {patch}, but got {value}")]
    PatchMisaligned {
        axis: &'static str,
        value: usize,
        patch: usize,
    },

    /// A weight tensor referenced by a node was not found in the payload.
    #[error("weight tensor not found: {name}")]
    WeightNotFound { name: String },

    /// A node definition is invalid (e.g., incompatible shapes).
    #[error("invalid node '{node}': {detail}")]
    InvalidNode { node: String, detail: String },

    /// The graph chain is empty or otherwise malformed.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// The artifact file does not follow the expected binary layout.
    #[error("malformed artifact: {0}")]
    Artifact(String),
}
