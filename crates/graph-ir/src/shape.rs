// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shape descriptors and dimension utilities.

use std::fmt;

/// Describes the dimensionality of a weight or activation tensor.
///
/// Shapes are immutable once created and provide convenience methods for
/// computing element counts and byte footprints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Creates a new shape from the given dimensions.
    ///
    /// # Examples
    /// ```
    /// use graph_ir::Shape;
    /// let s = Shape::new(vec![2, 3, 4]);
    /// assert_eq!(s.rank(), 3);
    /// assert_eq!(s.num_elements(), 24);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Creates a 1-D shape.
    pub fn vector(len: usize) -> Self {
        Self { dims: vec![len] }
    }

    /// Creates a 2-D shape (matrix).
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            dims: vec![rows, cols],
        }
    }

    /// Creates a 3-D token shape `[batch, tokens, channels]`.
    pub fn tokens(batch: usize, tokens: usize, channels: usize) -> Self {
        Self {
            dims: vec![batch, tokens, channels],
        }
    }

    /// Creates a 4-D image shape `[batch, channels, height, width]`.
    pub fn nchw(batch: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            dims: vec![batch, channels, height, width],
        }
    }

    /// Returns the number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the total number of elements.
    ///
    /// For a scalar shape (rank 0), returns 1.
    pub fn num_elements(&self) -> usize {
        if self.dims.is_empty() {
            1
        } else {
            self.dims.iter().product()
        }
    }

    /// Returns the dimensions as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the size of a specific dimension, or `None` if out of bounds.
    pub fn dim(&self, index: usize) -> Option<usize> {
        self.dims.get(index).copied()
    }

    /// Computes the memory footprint in bytes for a given [`crate::DType`].
    pub fn size_bytes(&self, dtype: super::DType) -> usize {
        self.num_elements() * dtype.size_bytes()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;

    #[test]
    fn test_new_and_rank() {
        let s = Shape::new(vec![1, 3, 504, 504]);
        assert_eq!(s.rank(), 4);
        assert_eq!(s.num_elements(), 3 * 504 * 504);
    }

    #[test]
    fn test_constructors() {
        assert_eq!(Shape::vector(384).dims(), &[384]);
        assert_eq!(Shape::matrix(384, 1152).dims(), &[384, 1152]);
        assert_eq!(Shape::tokens(1, 1296, 384).dims(), &[1, 1296, 384]);
        assert_eq!(Shape::nchw(1, 3, 224, 224).dims(), &[1, 3, 224, 224]);
    }

    #[test]
    fn test_size_bytes() {
        let s = Shape::matrix(2, 3);
        assert_eq!(s.size_bytes(DType::F32), 24);
        assert_eq!(s.size_bytes(DType::F16), 12);
    }

    #[test]
    fn test_dim_access() {
        let s = Shape::nchw(1, 3, 126, 252);
        assert_eq!(s.dim(2), Some(126));
        assert_eq!(s.dim(4), None);
    }

    #[test]
    fn test_display() {
        let s = Shape::tokens(1, 81, 384);
        assert_eq!(s.to_string(), "[1, 81, 384]");
    }

    #[test]
    fn test_serde_transparent() {
        let s = Shape::matrix(2, 3);
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, "[2,3]");
        let back: Shape = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
