// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for engine compilation and cache management.

/// Errors that can occur while building engines or managing timing caches.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The input artifact is unreadable or invalid.
    #[error("artifact error: {0}")]
    Artifact(#[from] graph_ir::IrError),

    /// A filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialized cache or engine blob does not follow its layout.
    #[error("malformed {kind}: {detail}")]
    Format { kind: &'static str, detail: String },

    /// Two caches cannot be combined (device or version disagree) and
    /// mismatch tolerance is off.
    #[error("timing cache mismatch: {0}")]
    CacheMismatch(String),

    /// No kernel candidate fits within the workspace limit.
    #[error("no kernel for node '{node}' fits in {limit_mb} MB workspace")]
    NoKernel { node: String, limit_mb: u64 },

    /// Configuration error (bad TOML, unknown flag, bad size string).
    #[error("configuration error: {0}")]
    Config(String),
}

impl BuildError {
    /// Shorthand for a malformed-blob error.
    pub(crate) fn format(kind: &'static str, detail: impl Into<String>) -> Self {
        BuildError::Format {
            kind,
            detail: detail.into(),
        }
    }
}
