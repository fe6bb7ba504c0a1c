//! Embedding provider trait and vector helpers.
//!
//! Concrete providers (OpenAI-compatible, Ollama, local fastembed) live in
//! the application crate; the core only needs to know a provider's model
//! name and dimensionality, and how vectors are stored and compared.

/// Metadata every embedding backend exposes.
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, e.g. `"text-embedding-3-small"`.
    fn model_name(&self) -> &str;
    /// Vector dimensionality, e.g. `1536`.
    fn dims(&self) -> usize;
}

/// A query vector tagged with the model that produced it.
///
/// Stores only compare it against vectors from the same model and of the
/// same length; anything else is stale and left out of vector search.
#[derive(Debug, Clone, Copy)]
pub struct QueryEmbedding<'a> {
    pub model: &'a str,
    pub vector: &'a [f32],
}

/// Encode a vector as little-endian `f32` bytes (`len × 4` bytes).
///
/// ```rust
/// use hr_assistant_core::embedding::{blob_to_vec, vec_to_blob};
///
/// let v = vec![0.5f32, -1.0];
/// assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode bytes written by [`vec_to_blob`]. Trailing partial values are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-magnitude operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, na, nb), (x, y)| {
            (d + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_layout_is_little_endian() {
        let blob = vec_to_blob(&[1.0]);
        assert_eq!(blob, 1.0f32.to_le_bytes().to_vec());
        assert_eq!(blob_to_vec(&[0, 0, 128, 63, 7]), vec![1.0]);
    }

    #[test]
    fn test_cosine_identical_and_opposite() {
        let v = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
