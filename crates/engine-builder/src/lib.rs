// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # engine-builder
//!
//! Compiles a portable IR artifact into a serialized engine binary, using
//! a persistent **timing cache** to skip kernel re-tuning across builds.
//!
//! Pipeline position:
//! ```text
//! {name}.vitir → [engine-builder] → {name}.engine + merged timing cache
//! ```
//!
//! - [`BuilderConfig`] — precision flags, workspace limit, cache policy.
//! - [`TimingCache`] — per-operation kernel measurements, serialized to a
//!   stable binary blob that survives across builds.
//! - [`KernelTuner`] — picks a kernel per node; cache hits skip tuning.
//! - [`EngineBuilder`] — type-state build pipeline (`Idle → Parsed`)
//!   producing an [`Engine`].
//! - [`CacheStore`] — merges the runtime cache with a seeded initial
//!   cache across runs (copy if absent/oversized, combine otherwise).
//! - [`compile_artifact`] — the one-call artifact → engine conversion.

mod codec;
mod config;
mod convert;
mod engine;
mod error;
mod store;
mod timing_cache;
mod tuner;

pub use config::{
    BuilderConfig, BuilderFlag, Precision, WorkspaceLimit, DEFAULT_CACHE_DIR,
    DEFAULT_INIT_CACHE_DIR, DEFAULT_WORKSPACE,
};
pub use convert::{compile_artifact, CompileReport};
pub use engine::{Engine, EngineBuilder, Idle, KernelBinding, Parsed};
pub use error::BuildError;
pub use store::{CacheStore, MergeOutcome, CACHE_FILE, MAX_CACHE_BYTES};
pub use timing_cache::{fingerprint, TimingCache, TimingRecord};
pub use tuner::{KernelTuner, TunerStats};
