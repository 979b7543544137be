//! Deterministic local text embedding.
//!
//! Wraps a [`StaticModel`] (Model2Vec) behind a lazily-initialized,
//! process-wide singleton. Model2Vec averages pre-computed static word
//! vectors rather than running neural inference, so embedding is a
//! synchronous, sub-millisecond, fully local operation — no network
//! call, no async runtime required.
//!
//! The bundled `minishlab/potion-base-8M` checkpoint emits 256-dim
//! vectors. This engine's vector index is fixed at 384 dimensions (see
//! `DESIGN.md`), so every embedding is normalized on the way out:
//! zero-padded if the model emits fewer than 384 floats, truncated if
//! it emits more. This keeps the on-disk vector format independent of
//! which underlying checkpoint happens to be loaded.

use crate::error::{Error, Result};
use model2vec_rs::model::StaticModel;
use std::sync::OnceLock;

/// Fixed output dimensionality of every embedding this engine stores.
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// Default Model2Vec checkpoint.
const DEFAULT_MODEL: &str = "minishlab/potion-base-8M";

struct Embedder {
    model: StaticModel,
}

impl Embedder {
    fn load() -> Result<Self> {
        let model = StaticModel::from_pretrained(DEFAULT_MODEL, None, None, None)
            .map_err(|e| Error::Embedding(format!("failed to load '{DEFAULT_MODEL}': {e}")))?;
        Ok(Self { model })
    }
}

static EMBEDDER: OnceLock<Option<Embedder>> = OnceLock::new();

fn embedder() -> Option<&'static Embedder> {
    EMBEDDER
        .get_or_init(|| match Embedder::load() {
            Ok(e) => Some(e),
            Err(e) => {
                tracing::warn!(error = %e, "embedding model unavailable, falling back to lexical-only search");
                None
            }
        })
        .as_ref()
}

/// Whether the embedding model loaded successfully.
///
/// When `false`, callers should degrade gracefully to lexical-only
/// search rather than failing the whole operation.
#[must_use]
pub fn is_available() -> bool {
    embedder().is_some()
}

/// Normalize a raw embedding to exactly [`EMBEDDING_DIMENSIONS`] floats.
fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    v.resize(EMBEDDING_DIMENSIONS, 0.0);
    v
}

/// Embed a single piece of text.
///
/// Returns `Ok(None)` rather than an error when the model failed to
/// load — this is the expected "lexical-only" degradation path, not a
/// failure of the write the caller is trying to perform.
pub fn embed(text: &str) -> Result<Option<Vec<f32>>> {
    let Some(embedder) = embedder() else {
        return Ok(None);
    };

    let out = embedder.model.encode(&[text.to_string()]);
    let raw = out
        .into_iter()
        .next()
        .ok_or_else(|| Error::Embedding("model returned no embeddings".into()))?;

    Ok(Some(normalize(raw)))
}

/// Embed a batch of texts in one call.
///
/// Returns `Ok(None)` under the same degradation rule as [`embed`].
pub fn embed_batch(texts: &[String]) -> Result<Option<Vec<Vec<f32>>>> {
    if texts.is_empty() {
        return Ok(Some(Vec::new()));
    }

    let Some(embedder) = embedder() else {
        return Ok(None);
    };

    let out = embedder.model.encode(texts);
    Ok(Some(out.into_iter().map(normalize).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pads_short_vector() {
        let v = normalize(vec![1.0, 2.0, 3.0]);
        assert_eq!(v.len(), EMBEDDING_DIMENSIONS);
        assert_eq!(v[0], 1.0);
        assert_eq!(v[3], 0.0);
    }

    #[test]
    fn test_normalize_truncates_long_vector() {
        let v = normalize(vec![1.0; 1000]);
        assert_eq!(v.len(), EMBEDDING_DIMENSIONS);
    }

    #[test]
    fn test_embed_batch_empty_is_ok() {
        let result = embed_batch(&[]).unwrap();
        assert_eq!(result, Some(Vec::new()));
    }
}
