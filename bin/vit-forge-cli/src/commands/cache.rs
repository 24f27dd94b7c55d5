// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `vit-forge cache` command: manage the persisted timing caches.

use clap::{Args, Subcommand};
use engine_builder::{CacheStore, MergeOutcome, TimingCache};
use std::path::PathBuf;

/// Options shared by every cache action.
#[derive(Args)]
pub struct CacheOpts {
    /// Directory the runtime timing cache lives in.
    #[arg(long, default_value = engine_builder::DEFAULT_CACHE_DIR)]
    pub cache_dir: String,

    /// Directory seeded initial caches are read from.
    #[arg(long, default_value = engine_builder::DEFAULT_INIT_CACHE_DIR)]
    pub init_cache_dir: String,

    /// Device tag the cache is keyed on.
    #[arg(short, long, default_value = "generic")]
    pub device: String,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Seed the runtime cache from the shipped initial cache.
    Init {
        #[command(flatten)]
        opts: CacheOpts,
    },

    /// Merge another cache file into the runtime cache.
    Merge {
        /// Cache file whose measurements are folded in.
        #[arg(short, long)]
        from: PathBuf,

        #[command(flatten)]
        opts: CacheOpts,
    },

    /// Print the runtime cache contents.
    Show {
        #[command(flatten)]
        opts: CacheOpts,
    },
}

impl CacheOpts {
    fn store(&self) -> CacheStore {
        CacheStore::new(&self.cache_dir, &self.init_cache_dir, &self.device, true)
    }
}

pub async fn execute(action: CacheAction) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║             vit-forge · Timing Caches               ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    match action {
        CacheAction::Init { opts } => {
            let store = opts.store();
            println!("  Seed:    {}", store.init_path().display());
            println!("  Runtime: {}", store.cache_path().display());
            println!();

            store.initialize();
            let cache = store.load()?;
            println!("  {}", cache.summary());
        }

        CacheAction::Merge { from, opts } => {
            let store = opts.store();
            let bytes = std::fs::read(&from).map_err(|e| {
                anyhow::anyhow!("cannot read cache '{}': {e}", from.display())
            })?;
            let fresh = TimingCache::from_bytes(&bytes, &opts.device, false)?;
            println!("  Merging {} ({} entries)", from.display(), fresh.len());

            match store.merge(&fresh)? {
                MergeOutcome::Seeded { bytes } => {
                    println!("  Runtime cache replaced ({bytes} bytes).")
                }
                MergeOutcome::Combined { fully, bytes } => {
                    println!(
                        "  Combined into runtime cache ({bytes} bytes){}.",
                        if fully { "" } else { " — device mismatch, nothing absorbed" },
                    )
                }
            }
            println!("  {}", store.load()?.summary());
        }

        CacheAction::Show { opts } => {
            let store = opts.store();
            let cache = store.load()?;
            println!("  File: {}", store.cache_path().display());
            println!("  {}", cache.summary());
        }
    }

    println!();
    Ok(())
}
