//! In-memory similarity index and the retriever handle built on it.
//!
//! The index is brute-force cosine similarity over every stored vector,
//! which is plenty for the few hundred chunks one uploaded document yields.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::error::EmbeddingError;
use crate::models::{Chunk, FileIdentity, ScoredChunk, UploadedFile};

/// `(chunk, vector)` pairs in source order.
#[derive(Debug, Default)]
pub struct VectorIndex {
    entries: Vec<(Chunk, Vec<f32>)>,
}

impl VectorIndex {
    /// Build an index from parallel chunk and vector lists.
    ///
    /// Extra items on either side are dropped; the pipeline always passes
    /// lists of equal length.
    pub fn from_parts(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Self {
        Self {
            entries: chunks.into_iter().zip(vectors).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|(chunk, _)| chunk)
    }

    /// The `k` chunks most similar to `query`, best first. Ties keep source order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|(chunk, vector)| ScoredChunk {
                chunk: chunk.clone(),
                score: cosine_similarity(query, vector),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }
}

/// Query handle over one document's index.
///
/// Shared behind an [`Arc`]: the ingest memo and every session that selected
/// the same file hold the same retriever.
pub struct Retriever {
    file: FileIdentity,
    index: VectorIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    k: usize,
}

impl Retriever {
    pub fn new(
        file: FileIdentity,
        index: VectorIndex,
        embedder: Arc<dyn EmbeddingProvider>,
        k: usize,
    ) -> Self {
        Self {
            file,
            index,
            embedder,
            k: k.max(1),
        }
    }

    pub fn file(&self) -> &FileIdentity {
        &self.file
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn default_k(&self) -> usize {
        self.k
    }

    /// Embed `query` and return the default number of nearest chunks.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>, EmbeddingError> {
        self.retrieve_k(query, self.k).await
    }

    /// Embed `query` and return the `k` nearest chunks.
    pub async fn retrieve_k(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, EmbeddingError> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_query(query).await?;
        if query_vec.len() != self.embedder.dims() {
            return Err(EmbeddingError::DimensionMismatch {
                model: self.embedder.model_name().to_string(),
                expected: self.embedder.dims(),
                got: query_vec.len(),
            });
        }
        Ok(self.index.search(&query_vec, k))
    }

    /// Nearest chunks to an already-embedded query.
    pub fn search_by_vector(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        self.index.search(query, k)
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("file", &self.file)
            .field("chunks", &self.index.len())
            .field("model", &self.embedder.model_name())
            .field("k", &self.k)
            .finish()
    }
}

/// `docgpt search`: ingest a file and print the chunks nearest to `query`.
pub async fn run_search(config: &Config, path: &std::path::Path, query: &str, k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let pipeline = crate::ingest::IngestPipeline::from_config(config)?;
    let upload = UploadedFile::from_path(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let retriever = pipeline
        .ingest(upload)
        .await
        .with_context(|| format!("Failed to ingest {}", path.display()))?;

    let results = retriever
        .retrieve_k(query, k.unwrap_or(retriever.default_k()))
        .await
        .context("Failed to embed query")?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (rank, hit) in results.iter().enumerate() {
        println!(
            "{}. [{:.4}] chunk {} of {}",
            rank + 1,
            hit.score,
            hit.chunk.index,
            retriever.file().name
        );
        for line in snippet(&hit.chunk.text, 240).lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Maps a text to a fixed direction keyed by its first letter.
    struct LetterEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|t| match t.chars().next() {
                    Some('a') => vec![1.0, 0.0, 0.0],
                    Some('b') => vec![0.0, 1.0, 0.0],
                    _ => vec![0.0, 0.0, 1.0],
                })
                .collect())
        }
    }

    fn identity() -> FileIdentity {
        FileIdentity {
            name: "a.txt".to_string(),
            content_hash: "hash".to_string(),
        }
    }

    fn index() -> VectorIndex {
        VectorIndex::from_parts(
            vec![Chunk::new(0, "apple"), Chunk::new(1, "banana"), Chunk::new(2, "cherry")],
            vec![vec![1.0, 0.0, 0.0], vec![0.6, 0.8, 0.0], vec![0.0, 0.0, 1.0]],
        )
    }

    #[test]
    fn search_ranks_by_similarity() {
        let hits = index().search(&[0.0, 1.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "banana");
        assert_eq!(hits[1].chunk.text, "apple");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn search_with_large_k_returns_everything() {
        assert_eq!(index().search(&[1.0, 0.0, 0.0], 10).len(), 3);
    }

    #[test]
    fn from_parts_pairs_in_order() {
        let idx = index();
        let texts: Vec<&str> = idx.chunks().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["apple", "banana", "cherry"]);
    }

    #[tokio::test]
    async fn retriever_embeds_the_query() {
        let retriever = Retriever::new(identity(), index(), Arc::new(LetterEmbedder), 1);
        let hits = retriever.retrieve("about cherries? no, apples").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "apple");
    }

    #[tokio::test]
    async fn empty_index_returns_nothing_without_embedding() {
        let retriever = Retriever::new(
            identity(),
            VectorIndex::default(),
            Arc::new(crate::embedding::DisabledProvider),
            4,
        );
        assert!(retriever.retrieve("anything").await.unwrap().is_empty());
    }

    /// Advertises three dimensions but answers with two.
    struct ShortEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn query_vector_of_the_wrong_size_is_an_error() {
        let retriever = Retriever::new(identity(), index(), Arc::new(ShortEmbedder), 2);
        let err = retriever.retrieve("apple").await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch { expected: 3, got: 2, .. }
        ));
    }

    #[test]
    fn snippet_marks_truncation() {
        assert_eq!(snippet("short", 10), "short");
        assert_eq!(snippet("abcdef", 3), "abc…");
    }
}
