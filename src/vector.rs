//! Packed-embedding encoding and distance math for the brute-force
//! vector index (see `storage::schema` module doc comment for why this
//! is plain BLOBs rather than a `vec0` virtual table).

use crate::embedder::EMBEDDING_DIMENSIONS;

/// Pack a 384-float embedding into little-endian bytes for storage.
#[must_use]
pub fn pack(embedding: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(embedding.len() * 4);
    for f in embedding {
        out.extend_from_slice(&f.to_le_bytes());
    }
    out
}

/// Unpack little-endian bytes back into a float vector.
///
/// Returns an empty vector if `bytes` isn't a multiple of 4 bytes long,
/// rather than panicking — a corrupt row should degrade, not crash a
/// search.
#[must_use]
pub fn unpack(bytes: &[u8]) -> Vec<f32> {
    if bytes.len() % 4 != 0 {
        return Vec::new();
    }
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine-like distance: `1 - cosine_similarity`, in `[0, 2]`.
///
/// Zero vectors (e.g. a padded-out embedding) are treated as maximally
/// distant rather than producing NaN.
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 2.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..len {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    1.0 - similarity.clamp(-1.0, 1.0)
}

/// Sanity-check that an embedding has the fixed contract dimensionality.
#[must_use]
pub fn is_well_formed(embedding: &[f32]) -> bool {
    embedding.len() == EMBEDDING_DIMENSIONS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_roundtrip() {
        let v: Vec<f32> = (0..384).map(|i| i as f32 * 0.5).collect();
        let packed = pack(&v);
        assert_eq!(packed.len(), 384 * 4);
        let unpacked = unpack(&packed);
        assert_eq!(unpacked, v);
    }

    #[test]
    fn test_unpack_malformed_bytes_is_empty() {
        assert!(unpack(&[1, 2, 3]).is_empty());
    }

    #[test]
    fn test_cosine_distance_identical_is_zero() {
        let v = vec![1.0, 2.0, 3.0];
        assert!(cosine_distance(&v, &v) < 1e-5);
    }

    #[test]
    fn test_cosine_distance_orthogonal_is_one() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_distance_zero_vector_is_maximal() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_distance(&a, &b), 2.0);
    }
}
