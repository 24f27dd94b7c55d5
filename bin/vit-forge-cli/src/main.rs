// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # vit-forge
//!
//! Command-line interface for the vit-forge export and build pipeline.
//!
//! ## Usage
//! ```bash
//! # Export a single artifact
//! vit-forge export --model ./models/dinov2_vits14 --height 504 --width 504
//!
//! # Export the full resolution grid
//! vit-forge sweep --model ./models/dinov2_vits14 --out-dir ./artifacts
//!
//! # Compile an artifact into an engine
//! vit-forge build --artifact dinov2_vits14_1-3-504-504.vitir --fp16
//!
//! # Manage the persisted timing caches
//! vit-forge cache init
//! vit-forge cache show
//!
//! # Inspect an artifact
//! vit-forge inspect --artifact dinov2_vits14_1-3-504-504.vitir
//! ```

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "vit-forge",
    about = "Vision-transformer artifact exporter and engine builder",
    version,
    author
)]
struct Cli {
    /// Path to a TOML configuration file (overrides CLI arguments).
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a checkpoint into a portable IR artifact.
    Export {
        /// Path to the model directory (model.json + model.safetensors).
        #[arg(short, long)]
        model: std::path::PathBuf,

        /// Input image height in pixels (multiple of the patch size).
        #[arg(long, default_value_t = 504)]
        height: usize,

        /// Input image width in pixels (multiple of the patch size).
        #[arg(long, default_value_t = 504)]
        width: usize,

        /// Batch size the graph is exported for.
        #[arg(short, long, default_value_t = 1)]
        batch: usize,

        /// Operator-set version recorded in the artifact header.
        #[arg(long, default_value_t = 14)]
        opset: u32,

        /// Keep the normalization as an explicit node instead of folding
        /// it into the patch-embedding weights.
        #[arg(long)]
        no_fold: bool,

        /// Output artifact path (default: shape-encoding name in cwd).
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },

    /// Export one artifact per height × width combination.
    Sweep {
        /// Path to the model directory.
        #[arg(short, long)]
        model: std::path::PathBuf,

        /// Comma-separated heights in pixels (default: 126,224,364,504).
        #[arg(long)]
        heights: Option<String>,

        /// Comma-separated widths in pixels (default: same as heights).
        #[arg(long)]
        widths: Option<String>,

        /// Batch size for every export.
        #[arg(short, long, default_value_t = 1)]
        batch: usize,

        /// Operator-set version for every export.
        #[arg(long, default_value_t = 15)]
        opset: u32,

        /// Directory artifacts are written into.
        #[arg(short, long, default_value = ".")]
        out_dir: std::path::PathBuf,
    },

    /// Compile an artifact into a serialized engine.
    Build {
        /// Path to the input artifact.
        #[arg(short, long)]
        artifact: std::path::PathBuf,

        /// Output engine path (default: artifact path with `.engine`).
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,

        /// Allow half-precision kernels and store weights as f16.
        #[arg(long)]
        fp16: bool,

        /// Workspace limit per node (e.g., "512M", "1G").
        #[arg(short, long, default_value = engine_builder::DEFAULT_WORKSPACE)]
        workspace: String,

        /// Device tag recorded in the timing cache.
        #[arg(short, long, default_value = "generic")]
        device: String,

        /// Directory the runtime timing cache lives in.
        #[arg(long, default_value = engine_builder::DEFAULT_CACHE_DIR)]
        cache_dir: String,

        /// Fail instead of degrading when the cache device/version
        /// mismatches.
        #[arg(long)]
        strict_cache: bool,
    },

    /// Manage the persisted timing caches.
    Cache {
        #[command(subcommand)]
        action: commands::cache::CacheAction,
    },

    /// Inspect an artifact: graph, nodes, and memory estimates.
    Inspect {
        /// Path to the artifact file.
        #[arg(short, long)]
        artifact: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging based on verbosity.
    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Export {
            model,
            height,
            width,
            batch,
            opset,
            no_fold,
            output,
        } => {
            commands::export::execute(
                cli.config, model, height, width, batch, opset, no_fold, output,
            )
            .await
        }
        Commands::Sweep {
            model,
            heights,
            widths,
            batch,
            opset,
            out_dir,
        } => commands::sweep::execute(cli.config, model, heights, widths, batch, opset, out_dir)
            .await,
        Commands::Build {
            artifact,
            output,
            fp16,
            workspace,
            device,
            cache_dir,
            strict_cache,
        } => {
            commands::build::execute(
                cli.config,
                artifact,
                output,
                fp16,
                workspace,
                device,
                cache_dir,
                strict_cache,
            )
            .await
        }
        Commands::Cache { action } => commands::cache::execute(action).await,
        Commands::Inspect { artifact } => commands::inspect::execute(artifact).await,
    }
}
