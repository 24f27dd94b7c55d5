// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Persistent kernel timing cache.
//!
//! Tuning a kernel for a node is the expensive part of an engine build.
//! The cache keys each (node shape, precision) fingerprint to the winning
//! kernel and its measured latency, so a warm build skips tuning
//! entirely. Caches are device-specific: measurements taken on one device
//! are meaningless on another, so the blob carries a device tag and
//! loading checks it.
//!
//! An empty byte buffer deserializes to an empty cache — a freshly
//! `touch`ed cache file is valid by construction.

use crate::codec::{Reader, Writer};
use crate::{BuildError, Precision};
use graph_ir::NodeDef;
use std::collections::BTreeMap;

const MAGIC: &[u8; 4] = b"VFTC";
const VERSION: u16 = 1;

/// One cached tuning measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingRecord {
    /// Name of the winning kernel.
    pub kernel: String,
    /// Measured latency in nanoseconds.
    pub latency_ns: u64,
    /// Scratch memory the kernel requires, in bytes.
    pub workspace_bytes: u64,
}

/// Fingerprints a node for cache lookup.
///
/// FNV-1a over the tuning-relevant parts of the node: op kind, input and
/// output shapes, dtype, and the build precision. Deliberately not the
/// node name or layer index — two layer-norm nodes with the same shapes
/// share one entry. FNV is used instead of the stdlib hasher because the
/// value is persisted and must be stable across runs and compiler
/// versions.
pub fn fingerprint(node: &NodeDef, precision: Precision) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    let mut eat = |bytes: &[u8]| {
        for &b in bytes {
            hash ^= b as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    };

    eat(node.op.as_str().as_bytes());
    eat(&[precision.tag()]);
    eat(node.dtype.to_string().as_bytes());
    for &d in node.input_shape.dims() {
        eat(&(d as u64).to_le_bytes());
    }
    eat(&[0xff]); // separator between shapes
    for &d in node.output_shape.dims() {
        eat(&(d as u64).to_le_bytes());
    }
    hash
}

/// A device-tagged map of fingerprints to tuning measurements.
#[derive(Debug, Clone)]
pub struct TimingCache {
    device: String,
    records: BTreeMap<u64, TimingRecord>,
}

impl TimingCache {
    /// Creates an empty cache for the given device.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            records: BTreeMap::new(),
        }
    }

    /// Deserializes a cache blob.
    ///
    /// An empty buffer yields an empty cache. A corrupt blob, a newer
    /// format version, or a foreign device tag is tolerated when
    /// `ignore_mismatch` is set: the cache degrades to empty with a
    /// warning, matching the behavior of a build on a machine whose
    /// seeded cache came from different hardware. With tolerance off the
    /// same conditions are hard errors.
    pub fn from_bytes(
        bytes: &[u8],
        device: &str,
        ignore_mismatch: bool,
    ) -> Result<Self, BuildError> {
        if bytes.is_empty() {
            return Ok(Self::new(device));
        }

        match Self::decode(bytes, device) {
            Ok(cache) => Ok(cache),
            Err(e) if ignore_mismatch => {
                tracing::warn!("ignoring unusable timing cache: {e}");
                Ok(Self::new(device))
            }
            Err(e) => Err(e),
        }
    }

    fn decode(bytes: &[u8], device: &str) -> Result<Self, BuildError> {
        let mut r = Reader::new(bytes, "timing cache");
        r.expect_magic(MAGIC)?;

        let version = r.u16()?;
        if version != VERSION {
            return Err(BuildError::CacheMismatch(format!(
                "format version {version}, expected {VERSION}"
            )));
        }

        let cache_device = r.string()?;
        if cache_device != device {
            return Err(BuildError::CacheMismatch(format!(
                "cache built for device '{cache_device}', this build targets '{device}'"
            )));
        }

        let count = r.u32()? as usize;
        let mut records = BTreeMap::new();
        for _ in 0..count {
            let key = r.u64()?;
            let kernel = r.string()?;
            let latency_ns = r.u64()?;
            let workspace_bytes = r.u64()?;
            records.insert(
                key,
                TimingRecord {
                    kernel,
                    latency_ns,
                    workspace_bytes,
                },
            );
        }

        Ok(Self {
            device: cache_device,
            records,
        })
    }

    /// Serializes the cache to its binary blob.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.raw(MAGIC);
        w.u16(VERSION);
        w.string(&self.device);
        w.u32(self.records.len() as u32);
        for (key, rec) in &self.records {
            w.u64(*key);
            w.string(&rec.kernel);
            w.u64(rec.latency_ns);
            w.u64(rec.workspace_bytes);
        }
        w.finish()
    }

    /// Looks up a measurement by fingerprint.
    pub fn get(&self, key: u64) -> Option<&TimingRecord> {
        self.records.get(&key)
    }

    /// Inserts a measurement, replacing any previous entry.
    pub fn insert(&mut self, key: u64, record: TimingRecord) {
        self.records.insert(key, record);
    }

    /// Merges another cache into this one.
    ///
    /// For keys present in both, the lower-latency record wins. A device
    /// mismatch merges nothing: when `ignore_mismatch` is set the other
    /// cache is skipped with a warning and `Ok(false)` is returned,
    /// otherwise the mismatch is a hard error.
    pub fn combine(
        &mut self,
        other: &TimingCache,
        ignore_mismatch: bool,
    ) -> Result<bool, BuildError> {
        if other.device != self.device {
            if !ignore_mismatch {
                return Err(BuildError::CacheMismatch(format!(
                    "cannot combine cache for device '{}' into '{}'",
                    other.device, self.device,
                )));
            }
            tracing::warn!(
                "not combining cache for device '{}' into '{}'",
                other.device,
                self.device,
            );
            return Ok(false);
        }

        for (key, rec) in &other.records {
            match self.records.get(key) {
                Some(existing) if existing.latency_ns <= rec.latency_ns => {}
                _ => {
                    self.records.insert(*key, rec.clone());
                }
            }
        }
        Ok(true)
    }

    /// The device tag this cache was built on.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Number of cached measurements.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the cache holds no measurements.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns a one-line description for logs and CLI output.
    pub fn summary(&self) -> String {
        format!(
            "timing cache: {} entries, device '{}'",
            self.records.len(),
            self.device,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_ir::{DType, NodeAttrs, NodeDef, OpKind, Shape};

    fn node(op: OpKind, input: Shape, output: Shape) -> NodeDef {
        NodeDef {
            name: "test".to_string(),
            op,
            index: 0,
            weight_names: vec![],
            weight_shapes: vec![],
            dtype: DType::F32,
            input_shape: input,
            output_shape: output,
            attrs: NodeAttrs::default(),
        }
    }

    fn record(kernel: &str, latency_ns: u64) -> TimingRecord {
        TimingRecord {
            kernel: kernel.to_string(),
            latency_ns,
            workspace_bytes: 1024,
        }
    }

    #[test]
    fn test_fingerprint_stable_and_shape_sensitive() {
        let a = node(
            OpKind::LayerNorm,
            Shape::tokens(1, 256, 384),
            Shape::tokens(1, 256, 384),
        );
        let b = node(
            OpKind::LayerNorm,
            Shape::tokens(1, 1296, 384),
            Shape::tokens(1, 1296, 384),
        );

        assert_eq!(
            fingerprint(&a, Precision::F32),
            fingerprint(&a, Precision::F32)
        );
        assert_ne!(
            fingerprint(&a, Precision::F32),
            fingerprint(&b, Precision::F32)
        );
        assert_ne!(
            fingerprint(&a, Precision::F32),
            fingerprint(&a, Precision::F16)
        );
    }

    #[test]
    fn test_fingerprint_ignores_name_and_index() {
        let mut a = node(
            OpKind::SelfAttention,
            Shape::tokens(1, 256, 384),
            Shape::tokens(1, 256, 384),
        );
        let mut b = a.clone();
        a.name = "blocks.0.attn".to_string();
        b.name = "blocks.7.attn".to_string();
        b.index = 7;
        assert_eq!(
            fingerprint(&a, Precision::F32),
            fingerprint(&b, Precision::F32)
        );
    }

    #[test]
    fn test_empty_bytes_is_empty_cache() {
        let cache = TimingCache::from_bytes(&[], "dev", false).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.device(), "dev");
    }

    #[test]
    fn test_roundtrip() {
        let mut cache = TimingCache::new("orin");
        cache.insert(42, record("ln.vectorized", 1200));
        cache.insert(7, record("attn.flash", 88_000));

        let bytes = cache.to_bytes();
        let back = TimingCache::from_bytes(&bytes, "orin", false).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.get(42).unwrap().kernel, "ln.vectorized");
        assert_eq!(back.get(7).unwrap().latency_ns, 88_000);
    }

    #[test]
    fn test_device_mismatch_errors_without_tolerance() {
        let cache = TimingCache::new("orin");
        let bytes = cache.to_bytes();
        let err = TimingCache::from_bytes(&bytes, "xavier", false).unwrap_err();
        assert!(matches!(err, BuildError::CacheMismatch(_)));
    }

    #[test]
    fn test_device_mismatch_degrades_with_tolerance() {
        let mut cache = TimingCache::new("orin");
        cache.insert(1, record("k", 10));
        let bytes = cache.to_bytes();
        let loaded = TimingCache::from_bytes(&bytes, "xavier", true).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.device(), "xavier");
    }

    #[test]
    fn test_corrupt_blob_degrades_with_tolerance() {
        let garbage = b"not a cache at all";
        assert!(TimingCache::from_bytes(garbage, "dev", false).is_err());
        let loaded = TimingCache::from_bytes(garbage, "dev", true).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_combine_keeps_faster_record() {
        let mut a = TimingCache::new("dev");
        a.insert(1, record("slow", 500));
        a.insert(2, record("only-a", 100));

        let mut b = TimingCache::new("dev");
        b.insert(1, record("fast", 200));
        b.insert(3, record("only-b", 300));

        assert!(a.combine(&b, false).unwrap());
        assert_eq!(a.len(), 3);
        assert_eq!(a.get(1).unwrap().kernel, "fast");
        assert_eq!(a.get(2).unwrap().kernel, "only-a");
        assert_eq!(a.get(3).unwrap().kernel, "only-b");
    }

    #[test]
    fn test_combine_skips_foreign_device_with_tolerance() {
        let mut a = TimingCache::new("orin");
        let mut b = TimingCache::new("xavier");
        b.insert(1, record("k", 10));
        assert!(!a.combine(&b, true).unwrap());
        assert!(a.is_empty());
    }

    #[test]
    fn test_combine_foreign_device_errors_when_strict() {
        let mut a = TimingCache::new("orin");
        let mut b = TimingCache::new("xavier");
        b.insert(1, record("k", 10));
        let err = a.combine(&b, false).unwrap_err();
        assert!(matches!(err, BuildError::CacheMismatch(_)));
        assert!(a.is_empty());
    }
}
