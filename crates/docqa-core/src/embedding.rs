//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, plus pure helper functions for the vector text format and
//! distance computation.
//!
//! An unavailable embedding is `None`, not an error: callers store chunks
//! without a vector and retrieval falls back to substring search.
//!
//! Concrete provider implementations (OpenAI, disabled) live in the `docqa`
//! app crate.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality `D` (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed one text. `None` when the provider is unconfigured, returned no
    /// data, or failed.
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// Serialize a vector in the text form accepted by the vector store:
/// `[v0,v1,...]`, no whitespace.
///
/// ```rust
/// use docqa_core::embedding::{format_for_vector_store, parse_vector};
///
/// let v = vec![0.25f32, -1.0, 3.5];
/// let text = format_for_vector_store(&v);
/// assert_eq!(text, "[0.25,-1,3.5]");
/// assert_eq!(parse_vector(&text).unwrap(), v);
/// ```
pub fn format_for_vector_store(vec: &[f32]) -> String {
    let mut out = String::with_capacity(vec.len() * 10 + 2);
    out.push('[');
    for (i, v) in vec.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&v.to_string());
    }
    out.push(']');
    out
}

/// Parse the `[v0,v1,...]` text form back into a vector.
///
/// Tolerates whitespace around components, which is how the store echoes
/// vectors back in some versions.
pub fn parse_vector(text: &str) -> Result<Vec<f32>> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .with_context(|| format!("vector literal must be bracketed: {:.40}", trimmed))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| {
            let part = part.trim();
            if part.is_empty() {
                bail!("empty component in vector literal");
            }
            part.parse::<f32>()
                .with_context(|| format!("invalid vector component: {}", part))
        })
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine distance as pgvector's `<=>` defines it: `1 - cosine_similarity`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b) as f64
}

/// Euclidean distance, pgvector's `<->`.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x - *y) as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}
