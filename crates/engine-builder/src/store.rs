// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Timing-cache persistence across runs.
//!
//! Deployments ship a **seeded** cache (tuned on a reference device)
//! alongside the **runtime** cache that accumulates local measurements.
//! On startup [`CacheStore::initialize`] folds the seed into the runtime
//! directory: copied wholesale when the runtime cache is absent or
//! oversized, combined entry-by-entry otherwise. Failures are logged and
//! swallowed — a missing or unreadable seed must never block a build, it
//! only makes the first one slower.
//!
//! After each build [`CacheStore::merge`] folds the fresh measurements
//! back into the runtime cache file: copied wholesale when the file is
//! absent or has grown past [`MAX_CACHE_BYTES`], combined entry-by-entry
//! otherwise.

use crate::{BuildError, BuilderConfig, TimingCache};
use std::path::{Path, PathBuf};

/// File name of the persisted timing cache inside its directory.
pub const CACHE_FILE: &str = "vitforge.timing";

/// Runtime caches larger than this are assumed degenerate and replaced
/// instead of combined.
pub const MAX_CACHE_BYTES: u64 = 100 * 1024 * 1024;

/// How a fresh cache was folded into the persisted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The fresh cache replaced the file (absent or oversized).
    Seeded {
        /// Size of the written cache file.
        bytes: u64,
    },
    /// The fresh cache was combined with the existing file.
    Combined {
        /// Whether every fresh entry was absorbed (false on device
        /// mismatch — nothing merges then).
        fully: bool,
        /// Size of the written cache file.
        bytes: u64,
    },
}

/// Manages the runtime and seeded timing-cache directories.
#[derive(Debug, Clone)]
pub struct CacheStore {
    cache_dir: PathBuf,
    init_cache_dir: PathBuf,
    device: String,
    ignore_mismatch: bool,
}

impl CacheStore {
    /// Creates a store from explicit directories.
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        init_cache_dir: impl Into<PathBuf>,
        device: impl Into<String>,
        ignore_mismatch: bool,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            init_cache_dir: init_cache_dir.into(),
            device: device.into(),
            ignore_mismatch,
        }
    }

    /// Creates a store from a builder configuration.
    pub fn from_config(config: &BuilderConfig) -> Self {
        Self::new(
            &config.cache_dir,
            &config.init_cache_dir,
            &config.device,
            config.ignore_cache_mismatch,
        )
    }

    /// Path of the runtime cache file.
    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILE)
    }

    /// Path of the seeded cache file.
    pub fn init_path(&self) -> PathBuf {
        self.init_cache_dir.join(CACHE_FILE)
    }

    /// Seeds the runtime cache from the shipped initial cache.
    ///
    /// The seed replaces the runtime cache when that file is absent,
    /// empty, or larger than [`MAX_CACHE_BYTES`]; otherwise the two are
    /// combined and the result rewritten. Best-effort by contract: every
    /// failure is logged and swallowed, so a broken seed degrades to a
    /// cold first build instead of an error.
    pub fn initialize(&self) {
        if let Err(e) = self.try_initialize() {
            tracing::error!("timing cache initialization failed (continuing cold): {e}");
        }
    }

    fn try_initialize(&self) -> Result<(), BuildError> {
        std::fs::create_dir_all(&self.cache_dir)?;

        let dest = self.cache_path();
        let seed = self.init_path();

        let dest_bytes = match std::fs::metadata(&dest) {
            Ok(meta) => Some(meta.len()),
            Err(_) => None,
        };
        let replace = match dest_bytes {
            None => true,
            Some(0) => true,
            Some(len) if len > MAX_CACHE_BYTES => {
                tracing::warn!(
                    "runtime cache at {} is {len} bytes (limit {MAX_CACHE_BYTES}), replacing with seed",
                    dest.display(),
                );
                true
            }
            Some(_) => false,
        };

        if replace {
            if !seed.exists() {
                tracing::info!("no seeded cache at {}, starting cold", seed.display());
                std::fs::write(&dest, [])?;
                return Ok(());
            }
            let bytes = std::fs::copy(&seed, &dest)?;
            tracing::info!(
                "seeded runtime cache from {} ({bytes} bytes)",
                seed.display(),
            );
            return Ok(());
        }

        if !seed.exists() {
            tracing::debug!("runtime cache present, no seed to fold in");
            return Ok(());
        }

        let mut merged = load_cache_file(&dest, &self.device, self.ignore_mismatch)?;
        let seeded = load_cache_file(&seed, &self.device, self.ignore_mismatch)?;
        let fully = merged.combine(&seeded, self.ignore_mismatch)?;
        let blob = merged.to_bytes();
        std::fs::write(&dest, &blob)?;
        tracing::info!(
            "combined seeded cache into {} ({} entries{})",
            dest.display(),
            merged.len(),
            if fully { "" } else { ", seed skipped on device mismatch" },
        );
        Ok(())
    }

    /// Loads the runtime cache. A missing file yields an empty cache.
    pub fn load(&self) -> Result<TimingCache, BuildError> {
        load_cache_file(&self.cache_path(), &self.device, self.ignore_mismatch)
    }

    /// Folds freshly measured entries back into the runtime cache file.
    ///
    /// - File absent or larger than [`MAX_CACHE_BYTES`]: the fresh cache
    ///   replaces it wholesale.
    /// - Otherwise: both caches are combined, keeping the lower-latency
    ///   record per entry, and the result rewritten.
    pub fn merge(&self, fresh: &TimingCache) -> Result<MergeOutcome, BuildError> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let path = self.cache_path();

        let existing_bytes = match std::fs::metadata(&path) {
            Ok(meta) => Some(meta.len()),
            Err(_) => None,
        };

        let replace = match existing_bytes {
            None => true,
            Some(0) => true,
            Some(len) if len > MAX_CACHE_BYTES => {
                tracing::warn!(
                    "runtime cache at {} is {len} bytes (limit {MAX_CACHE_BYTES}), replacing",
                    path.display(),
                );
                true
            }
            Some(_) => false,
        };

        if replace {
            let blob = fresh.to_bytes();
            std::fs::write(&path, &blob)?;
            tracing::info!(
                "wrote timing cache to {} ({} entries, {} bytes)",
                path.display(),
                fresh.len(),
                blob.len(),
            );
            return Ok(MergeOutcome::Seeded {
                bytes: blob.len() as u64,
            });
        }

        let mut merged = load_cache_file(&path, &self.device, self.ignore_mismatch)?;
        let fully = merged.combine(fresh, self.ignore_mismatch)?;
        let blob = merged.to_bytes();
        std::fs::write(&path, &blob)?;
        tracing::info!(
            "combined timing cache at {} ({} entries, {} bytes)",
            path.display(),
            merged.len(),
            blob.len(),
        );
        Ok(MergeOutcome::Combined {
            fully,
            bytes: blob.len() as u64,
        })
    }
}

/// Reads a cache file, treating a missing file as empty.
pub(crate) fn load_cache_file(
    path: &Path,
    device: &str,
    ignore_mismatch: bool,
) -> Result<TimingCache, BuildError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    TimingCache::from_bytes(&bytes, device, ignore_mismatch)
}
