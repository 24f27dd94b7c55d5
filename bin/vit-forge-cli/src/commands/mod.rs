// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommand implementations for the `vit-forge` CLI.

pub mod build;
pub mod cache;
pub mod export;
pub mod inspect;
pub mod sweep;

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// Verbosity maps to a default filter (`warn` → `info` → `debug` →
/// `trace`); an explicit `RUST_LOG` always wins.
pub fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Parses a comma-separated list of pixel sizes.
pub(crate) fn parse_size_list(s: &str) -> anyhow::Result<Vec<usize>> {
    s.split(',')
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| anyhow::anyhow!("invalid size '{part}' in list '{s}'"))
        })
        .collect()
}

/// Truncates a string with ellipsis.
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_list() {
        assert_eq!(
            parse_size_list("126, 224,364").unwrap(),
            vec![126, 224, 364]
        );
        assert!(parse_size_list("126,abc").is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 30), "short");
        assert_eq!(truncate("a-very-long-node-name", 10), "a-very-...");
    }
}
