//! Feature vectors and their similarity
//!
//! A [`Feature`] is an immutable embedding produced by some model. Two
//! features are compared by cosine similarity: both vectors are L2-normalized
//! independently and their dot product is the score, so scaling either
//! vector never changes the result.
//!
//! Across the worker boundary a feature travels as a raw little-endian
//! `f32` blob (no header) plus its model name and version, see
//! [`Feature::to_blob`] and [`Feature::from_blob`].

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bytes used by one encoded component.
const F32_BYTES: usize = std::mem::size_of::<f32>();

/// An embedding vector plus the model that produced it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Feature {
    /// Vector components
    pub raw: Vec<f32>,
    /// Model name that produced the vector
    pub model: String,
    /// Model version
    pub version: i32,
}

impl Feature {
    /// Create a feature from its components.
    pub fn new(raw: Vec<f32>, model: impl Into<String>, version: i32) -> Self {
        Feature {
            raw,
            model: model.into(),
            version,
        }
    }

    /// Number of components. Always equal to `raw.len()`.
    pub fn dimension(&self) -> usize {
        self.raw.len()
    }

    /// True when every component is zero (normalization is undefined).
    pub fn is_zero(&self) -> bool {
        self.raw.iter().all(|x| *x == 0.0)
    }

    /// True when no component is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.raw.iter().all(|x| x.is_finite())
    }

    /// Cosine similarity between `self` and `other`.
    ///
    /// Range: [-1, 1], higher = more similar.
    /// Returns 0.0 if either vector has zero norm.
    pub fn compare(&self, other: &Feature) -> f32 {
        debug_assert_eq!(
            self.dimension(),
            other.dimension(),
            "Dimension mismatch in similarity computation"
        );
        cosine_similarity(&self.raw, &other.raw)
    }

    /// Encode the components as a little-endian `f32` blob.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut blob = vec![0u8; self.raw.len() * F32_BYTES];
        LittleEndian::write_f32_into(&self.raw, &mut blob);
        blob
    }

    /// Decode a blob produced by [`Feature::to_blob`].
    ///
    /// Fails with `Protocol` if the blob length is not a multiple of 4.
    pub fn from_blob(blob: &[u8], model: impl Into<String>, version: i32) -> Result<Self> {
        if blob.len() % F32_BYTES != 0 {
            return Err(Error::Protocol(format!(
                "feature blob length {} is not a multiple of {}",
                blob.len(),
                F32_BYTES
            )));
        }
        let mut raw = vec![0f32; blob.len() / F32_BYTES];
        LittleEndian::read_f32_into(blob, &mut raw);
        Ok(Feature::new(raw, model, version))
    }

    /// Decode a blob and check it against an expected dimension.
    pub fn from_blob_with_dimension(
        blob: &[u8],
        model: impl Into<String>,
        version: i32,
        dimension: usize,
    ) -> Result<Self> {
        let feature = Self::from_blob(blob, model, version)?;
        if feature.dimension() != dimension {
            return Err(Error::Protocol(format!(
                "dimension mismatch: expected {}, got {}",
                dimension,
                feature.dimension()
            )));
        }
        Ok(feature)
    }
}

/// Cosine similarity: dot(a/|a|, b/|b|)
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x / norm_a) * (y / norm_b))
        .sum()
}

/// L2 norm (Euclidean length)
fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn feature(raw: Vec<f32>) -> Feature {
        Feature::new(raw, "test-model", 1)
    }

    #[test]
    fn test_identical_vectors() {
        let v = feature(vec![1.0, 2.0, 3.0]);
        assert!((v.compare(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_opposite_vectors() {
        let a = feature(vec![1.0, 0.0]);
        let b = feature(vec![-1.0, 0.0]);
        assert!((a.compare(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_vectors() {
        let a = feature(vec![1.0, 0.0]);
        let b = feature(vec![0.0, 1.0]);
        assert!(a.compare(&b).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_handling() {
        let zero = feature(vec![0.0, 0.0, 0.0]);
        let nonzero = feature(vec![1.0, 2.0, 3.0]);
        assert!(zero.is_zero());
        assert!(!nonzero.is_zero());
        assert_eq!(zero.compare(&nonzero), 0.0);
        assert_eq!(nonzero.compare(&zero), 0.0);
    }

    #[test]
    fn test_non_finite_components() {
        assert!(feature(vec![1.0, -2.0]).is_finite());
        assert!(!feature(vec![f32::NAN, 1.0]).is_finite());
        assert!(!feature(vec![1.0, f32::INFINITY]).is_finite());
        assert!(!feature(vec![f32::NEG_INFINITY]).is_finite());
    }

    #[test]
    fn test_blob_layout_is_little_endian() {
        let f = feature(vec![1.0, -2.5]);
        let blob = f.to_blob();
        assert_eq!(blob.len(), 8);
        assert_eq!(&blob[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&blob[4..8], &(-2.5f32).to_le_bytes());

        let decoded = Feature::from_blob(&blob, "test-model", 1).unwrap();
        assert_eq!(decoded, f);
    }

    #[test]
    fn test_blob_bad_length_is_protocol_error() {
        let err = Feature::from_blob(&[0u8; 7], "m", 1).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_blob_dimension_mismatch() {
        let blob = feature(vec![1.0, 2.0, 3.0]).to_blob();
        let err = Feature::from_blob_with_dimension(&blob, "m", 1, 4).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(Feature::from_blob_with_dimension(&blob, "m", 1, 3).is_ok());
    }

    #[test]
    fn test_empty_blob_is_empty_feature() {
        let f = Feature::from_blob(&[], "m", 1).unwrap();
        assert_eq!(f.dimension(), 0);
    }

    proptest! {
        #[test]
        fn prop_compare_is_scale_invariant(
            a in prop::collection::vec(-10.0f32..10.0, 8),
            b in prop::collection::vec(-10.0f32..10.0, 8),
            scale in 0.01f32..100.0,
        ) {
            let fa = feature(a.clone());
            let fb = feature(b);
            prop_assume!(!fa.is_zero() && !fb.is_zero());
            let scaled = feature(a.iter().map(|x| x * scale).collect());
            prop_assert!((fa.compare(&fb) - scaled.compare(&fb)).abs() < 1e-4);
        }

        #[test]
        fn prop_compare_is_bounded(
            a in prop::collection::vec(-10.0f32..10.0, 16),
            b in prop::collection::vec(-10.0f32..10.0, 16),
        ) {
            let score = feature(a).compare(&feature(b));
            prop_assert!((-1.0001..=1.0001).contains(&score));
        }
    }
}
