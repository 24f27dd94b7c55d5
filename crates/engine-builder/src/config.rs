// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Builder configuration: precision flags, workspace limit, cache policy.
//!
//! The workspace limit bounds the scratch memory the kernel tuner may
//! assume per node; candidates that need more are filtered out before
//! timing. It parses from human-readable strings for CLI ergonomics.

use crate::BuildError;
use std::fmt;
use std::path::Path;

/// Default workspace limit: half a gigabyte.
pub const DEFAULT_WORKSPACE: &str = "512M";

/// Default directory the merged timing cache is written into.
pub const DEFAULT_CACHE_DIR: &str = "/app/timing_caches";

/// Default directory holding the seeded initial caches.
pub const DEFAULT_INIT_CACHE_DIR: &str = "/app/timing_caches_init";

/// Optional builder behaviors, toggled per build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuilderFlag {
    /// Allow half-precision kernels and store weights as f16.
    Fp16,
}

impl BuilderFlag {
    /// Parses a flag name, tolerant of case and separators.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "fp16" | "half" => Some(BuilderFlag::Fp16),
            _ => None,
        }
    }
}

/// Numeric precision the tuner selects kernels for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    F32,
    F16,
}

impl Precision {
    /// Tag byte used in fingerprints and serialized blobs.
    pub fn tag(&self) -> u8 {
        match self {
            Precision::F32 => 0,
            Precision::F16 => 1,
        }
    }

    /// Inverse of [`tag`](Self::tag).
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Precision::F32),
            1 => Some(Precision::F16),
            _ => None,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::F32 => write!(f, "fp32"),
            Precision::F16 => write!(f, "fp16"),
        }
    }
}

/// Scratch-memory ceiling per node during tuning.
///
/// # Parsing
/// Supports human-readable strings with SI-style suffixes:
/// - `"512M"` or `"512MB"` → 512 × 1024² bytes
/// - `"1G"` or `"1GB"` → 1 × 1024³ bytes
/// - `"2048K"` or `"2048KB"` → 2048 × 1024 bytes
/// - `"1073741824"` → raw byte count
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WorkspaceLimit {
    bytes: u64,
}

impl WorkspaceLimit {
    /// Creates a limit from a byte count.
    pub fn from_bytes(bytes: u64) -> Self {
        Self { bytes }
    }

    /// Creates a limit from megabytes.
    pub fn from_mb(mb: u64) -> Self {
        Self {
            bytes: mb * 1024 * 1024,
        }
    }

    /// Returns the limit in bytes.
    pub fn as_bytes(&self) -> u64 {
        self.bytes
    }

    /// Returns the limit in megabytes (truncated).
    pub fn as_mb(&self) -> u64 {
        self.bytes / (1024 * 1024)
    }

    /// Parses a human-readable size string. Case-insensitive.
    pub fn parse(s: &str) -> Result<Self, BuildError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(BuildError::Config("empty workspace string".into()));
        }

        let s_upper = s.to_uppercase();
        let (num_str, multiplier) = if s_upper.ends_with("GB") {
            (&s[..s.len() - 2], 1024 * 1024 * 1024)
        } else if s_upper.ends_with('G') {
            (&s[..s.len() - 1], 1024 * 1024 * 1024)
        } else if s_upper.ends_with("MB") {
            (&s[..s.len() - 2], 1024 * 1024)
        } else if s_upper.ends_with('M') {
            (&s[..s.len() - 1], 1024 * 1024)
        } else if s_upper.ends_with("KB") {
            (&s[..s.len() - 2], 1024)
        } else if s_upper.ends_with('K') {
            (&s[..s.len() - 1], 1024)
        } else if s_upper.ends_with('B') {
            (&s[..s.len() - 1], 1)
        } else {
            (s, 1)
        };

        let value: u64 = num_str.trim().parse().map_err(|_| {
            BuildError::Config(format!(
                "invalid workspace string: '{s}' — expected a number followed by an optional suffix (M, G, K)"
            ))
        })?;

        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| BuildError::Config(format!("workspace overflow: '{s}'")))?;

        if bytes == 0 {
            return Err(BuildError::Config(format!("zero workspace: '{s}'")));
        }

        Ok(Self { bytes })
    }
}

impl Default for WorkspaceLimit {
    fn default() -> Self {
        Self::from_mb(512)
    }
}

impl fmt::Display for WorkspaceLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bytes >= 1024 * 1024 * 1024 && self.bytes % (1024 * 1024 * 1024) == 0 {
            write!(f, "{} GB", self.bytes / (1024 * 1024 * 1024))
        } else if self.bytes >= 1024 * 1024 && self.bytes % (1024 * 1024) == 0 {
            write!(f, "{} MB", self.bytes / (1024 * 1024))
        } else {
            write!(f, "{} B", self.bytes)
        }
    }
}

/// Configuration for one engine build.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BuilderConfig {
    /// Optional builder flags. Empty means full-precision everything.
    #[serde(default)]
    pub flags: Vec<BuilderFlag>,

    /// Workspace limit as a human-readable string, e.g. `"512M"`.
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// Tolerate device/version mismatches when loading a cache: a
    /// mismatched cache degrades to an empty one instead of failing
    /// the build.
    #[serde(default = "default_true")]
    pub ignore_cache_mismatch: bool,

    /// Device tag recorded in the timing cache. Measurements only
    /// transfer between identical devices.
    #[serde(default = "default_device")]
    pub device: String,

    /// Directory the merged runtime cache lives in.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Directory seeded initial caches are read from.
    #[serde(default = "default_init_cache_dir")]
    pub init_cache_dir: String,
}

fn default_workspace() -> String {
    DEFAULT_WORKSPACE.to_string()
}

fn default_true() -> bool {
    true
}

fn default_device() -> String {
    "generic".to_string()
}

fn default_cache_dir() -> String {
    DEFAULT_CACHE_DIR.to_string()
}

fn default_init_cache_dir() -> String {
    DEFAULT_INIT_CACHE_DIR.to_string()
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            flags: Vec::new(),
            workspace: default_workspace(),
            ignore_cache_mismatch: true,
            device: default_device(),
            cache_dir: default_cache_dir(),
            init_cache_dir: default_init_cache_dir(),
        }
    }
}

impl BuilderConfig {
    /// Loads a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, BuildError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parses a configuration from a TOML string.
    pub fn from_toml(text: &str) -> Result<Self, BuildError> {
        toml::from_str(text).map_err(|e| BuildError::Config(e.to_string()))
    }

    /// Whether the FP16 flag is set.
    pub fn fp16(&self) -> bool {
        self.flags.contains(&BuilderFlag::Fp16)
    }

    /// Precision implied by the flag set.
    pub fn precision(&self) -> Precision {
        if self.fp16() {
            Precision::F16
        } else {
            Precision::F32
        }
    }

    /// Parses the workspace string into a byte limit.
    pub fn parse_workspace(&self) -> Result<WorkspaceLimit, BuildError> {
        WorkspaceLimit::parse(&self.workspace)
    }

    /// Returns a one-line description for logs and CLI output.
    pub fn summary(&self) -> String {
        format!(
            "builder: precision={} workspace={} device={} tolerate_mismatch={}",
            self.precision(),
            self.workspace,
            self.device,
            self.ignore_cache_mismatch,
        )
    }
}
