//! Cache-backed document embeddings.
//!
//! Wraps an [`EmbeddingProvider`] with a [`LocalFileStore`] namespace. Each
//! chunk text is keyed by its SHA-256 digest; a hit returns the stored bytes
//! decoded as-is, a miss goes to the provider and is written back. Entries
//! are never invalidated: a changed file reusing an old name still hits the
//! cache for any chunk whose text did not change.
//!
//! A stored blob only counts as a hit when it holds exactly
//! `provider.dims()` floats. Anything else (a truncated write, a vector from
//! another model) is re-embedded and overwritten.
//!
//! Query embeddings bypass the cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::embedding::{blob_to_vec, vec_to_blob, EmbeddingProvider};
use crate::error::{EmbeddingError, IngestError};
use crate::file_store::LocalFileStore;
use crate::models::sha256_hex;

/// Counters for one [`CachedEmbeddings::embed_documents`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbedStats {
    /// Texts that did not need a provider call.
    pub cache_hits: usize,
    /// Distinct texts sent to the provider.
    pub embedded: usize,
}

pub struct CachedEmbeddings {
    provider: Arc<dyn EmbeddingProvider>,
    store: LocalFileStore,
    batch_size: usize,
}

impl CachedEmbeddings {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, store: LocalFileStore, batch_size: usize) -> Self {
        Self {
            provider,
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed `texts`, consulting the cache first. Output order matches input.
    ///
    /// Identical texts within one call are embedded once.
    pub async fn embed_documents(
        &self,
        texts: &[String],
    ) -> Result<(Vec<Vec<f32>>, EmbedStats), IngestError> {
        let keys: Vec<String> = texts.iter().map(|t| sha256_hex(t.as_bytes())).collect();
        let mut found: HashMap<&str, Vec<f32>> = HashMap::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut misses: Vec<usize> = Vec::new();
        let mut stats = EmbedStats::default();
        let dims = self.provider.dims();

        for (i, key) in keys.iter().enumerate() {
            if !seen.insert(key.as_str()) {
                continue;
            }
            match self.store.get(key).await? {
                Some(bytes) if bytes.len() == dims * 4 => {
                    tracing::debug!(key = %key, "embedding cache hit");
                    found.insert(key, blob_to_vec(&bytes));
                }
                Some(bytes) => {
                    tracing::warn!(
                        key = %key,
                        bytes = bytes.len(),
                        expected = dims * 4,
                        "cached embedding has the wrong size, re-embedding"
                    );
                    misses.push(i);
                }
                None => misses.push(i),
            }
        }

        for batch in misses.chunks(self.batch_size) {
            let batch_texts: Vec<String> = batch.iter().map(|&i| texts[i].clone()).collect();
            let vectors = self.provider.embed_documents(&batch_texts).await?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    got: vectors.len(),
                }
                .into());
            }
            if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
                return Err(EmbeddingError::DimensionMismatch {
                    model: self.provider.model_name().to_string(),
                    expected: dims,
                    got: bad.len(),
                }
                .into());
            }
            for (&i, vector) in batch.iter().zip(vectors) {
                self.store.set(&keys[i], &vec_to_blob(&vector)).await?;
                found.insert(&keys[i], vector);
            }
            stats.embedded += batch.len();
        }

        let mut out = Vec::with_capacity(texts.len());
        for key in &keys {
            // Every key was either found in the store or embedded above.
            let vector = found.get(key.as_str()).cloned().unwrap_or_default();
            out.push(vector);
        }
        stats.cache_hits = texts.len() - misses.len();

        Ok((out, stats))
    }
}
