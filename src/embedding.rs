//! Deterministic lexical embedding.
//!
//! Used for two things: the query vector handed to the vector-similarity
//! collaborator in resolution stage 4, and the semantic half of the ranker's
//! text score. It is *not* a neural embedding model; feature hashing over
//! tokens gives a stable, offline baseline so identical inputs always produce
//! identical vectors.

use blake3::Hasher;

/// Default embedding dimensionality for lexical embeddings.
pub const DEFAULT_EMBEDDING_DIM: usize = 64;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "for", "on", "in", "to", "is", "are", "was", "what", "when", "which",
    "me", "my", "our", "and", "or", "with", "at", "by", "it", "this", "that", "do", "does", "did",
    "show", "find", "get", "please",
];

/// Lowercased alphanumeric tokens, stopwords removed.
pub fn content_tokens(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_ascii_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
}

/// Create a deterministic lexical embedding for a piece of text.
#[must_use]
pub fn lexical_embedding(text: &str) -> Vec<f32> {
    lexical_embedding_with_dim(text, DEFAULT_EMBEDDING_DIM)
}

/// Create a deterministic lexical embedding with a custom dimension.
#[must_use]
pub fn lexical_embedding_with_dim(text: &str, dim: usize) -> Vec<f32> {
    if dim == 0 {
        return Vec::new();
    }

    let mut vec = vec![0.0f32; dim];
    let mut count = 0u32;

    for token in content_tokens(text) {
        let mut h = Hasher::new();
        h.update(token.as_bytes());
        let hash = h.finalize();
        let bytes = hash.as_bytes();

        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&bytes[..8]);
        let bucket = u64::from_le_bytes(bucket_bytes);

        #[allow(clippy::cast_possible_truncation)]
        let idx = (bucket % dim as u64) as usize;
        let sign = if (bytes[8] & 1) == 0 { 1.0f32 } else { -1.0f32 };
        vec[idx] += sign;
        count = count.saturating_add(1);
    }

    if count == 0 {
        return vec;
    }

    let norm2: f64 = vec.iter().map(|&x| f64::from(x) * f64::from(x)).sum();
    if norm2 > 0.0 {
        #[allow(clippy::cast_possible_truncation)]
        let inv = norm2.sqrt().recip() as f32;
        for x in &mut vec {
            *x *= inv;
        }
    }

    vec
}

/// Cosine similarity of two vectors; 0.0 on empty, zero-norm, or mismatched input.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let xf = f64::from(x);
        let yf = f64::from(y);
        dot += xf * yf;
        norm_a += xf * xf;
        norm_b += yf * yf;
    }

    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }

    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if sim.is_finite() {
        #[allow(clippy::cast_possible_truncation)]
        let sim = sim as f32;
        sim
    } else {
        0.0
    }
}
