//! Ingestion pipeline orchestration.
//!
//! Coordinates the flow for one uploaded file:
//!
//! ```text
//! upload ──▶ persist ──▶ load ──▶ split ──▶ embed (cached) ──▶ index ──▶ Retriever
//!            files/<name>                   embeddings/<name>/<sha256>
//! ```
//!
//! The whole pipeline is memoized by [`FileIdentity`] (name + content
//! digest) for the life of the [`IngestPipeline`]. The identity is computed
//! from the owned upload bytes before anything else happens, and every later
//! step reads the persisted copy, so the upload is consumed exactly once.
//! Memo entries are never evicted; failed ingestions are not memoized.
//!
//! Persist + embed for a given file name run under a per-name lock so two
//! sessions uploading `report.pdf` at once cannot interleave writes of the
//! same scratch file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};

use crate::chunk::split_text;
use crate::config::{ChunkingConfig, Config};
use crate::embed_cache::{CachedEmbeddings, EmbedStats};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::IngestError;
use crate::extract;
use crate::file_store::{persist_upload, sanitize_file_name, LocalFileStore};
use crate::models::{FileIdentity, UploadedFile};
use crate::search::{Retriever, VectorIndex};

/// Outcome of one [`IngestPipeline::ingest_with_report`] call.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub retriever: Arc<Retriever>,
    /// `true` when the retriever came from the in-process memo.
    pub memoized: bool,
    pub chunks: usize,
    pub embed_stats: EmbedStats,
    pub stored_at: Option<PathBuf>,
}

pub struct IngestPipeline {
    files_dir: PathBuf,
    embeddings_dir: PathBuf,
    chunking: ChunkingConfig,
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    top_k: usize,
    memo: Mutex<HashMap<FileIdentity, Arc<Retriever>>>,
    name_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IngestPipeline {
    pub fn new(config: &Config, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            files_dir: config.cache.files_dir(),
            embeddings_dir: config.cache.embeddings_dir(),
            chunking: config.chunking.clone(),
            provider,
            batch_size: config.embedding.batch_size,
            top_k: config.retrieval.top_k,
            memo: Mutex::new(HashMap::new()),
            name_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Build a pipeline with the provider named in `config.embedding`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = create_provider(&config.embedding)
            .context("Failed to create embedding provider")?;
        Ok(Self::new(config, provider))
    }

    /// Run the pipeline (or reuse a memoized result) and return the retriever.
    pub async fn ingest(&self, file: UploadedFile) -> Result<Arc<Retriever>, IngestError> {
        Ok(self.ingest_with_report(file).await?.retriever)
    }

    /// Like [`ingest`](Self::ingest), also reporting what work was done.
    pub async fn ingest_with_report(&self, file: UploadedFile) -> Result<IngestReport, IngestError> {
        let (identity, bytes) = file.into_parts();

        if let Some(report) = self.memo_hit(&identity) {
            return Ok(report);
        }

        let safe_name = sanitize_file_name(&identity.name)?;
        let name_lock = self.name_lock(&safe_name);
        let _guard = name_lock.lock().await;

        // Another session may have finished the same file while we waited.
        if let Some(report) = self.memo_hit(&identity) {
            return Ok(report);
        }

        let stored_at = persist_upload(&self.files_dir, &safe_name, &bytes).await?;
        drop(bytes);

        let text = load_text(&stored_at).await?;
        let chunks = split_text(&text, &self.chunking);

        let cache = CachedEmbeddings::new(
            self.provider.clone(),
            LocalFileStore::new(self.embeddings_dir.join(&safe_name)),
            self.batch_size,
        );
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let (vectors, embed_stats) = cache.embed_documents(&texts).await?;

        let chunk_count = chunks.len();
        let index = VectorIndex::from_parts(chunks, vectors);
        let retriever = Arc::new(Retriever::new(
            identity.clone(),
            index,
            self.provider.clone(),
            self.top_k,
        ));

        tracing::info!(
            file = %identity.name,
            chunks = chunk_count,
            cache_hits = embed_stats.cache_hits,
            embedded = embed_stats.embedded,
            "file ingested"
        );

        lock(&self.memo).insert(identity, retriever.clone());

        Ok(IngestReport {
            retriever,
            memoized: false,
            chunks: chunk_count,
            embed_stats,
            stored_at: Some(stored_at),
        })
    }

    /// The memoized retriever for `identity`, if this pipeline built one.
    pub fn cached(&self, identity: &FileIdentity) -> Option<Arc<Retriever>> {
        lock(&self.memo).get(identity).cloned()
    }

    /// Number of distinct files memoized so far.
    pub fn memoized_files(&self) -> usize {
        lock(&self.memo).len()
    }

    fn memo_hit(&self, identity: &FileIdentity) -> Option<IngestReport> {
        let retriever = self.cached(identity)?;
        tracing::debug!(file = %identity.name, "ingest memo hit");
        Some(IngestReport {
            chunks: retriever.index().len(),
            retriever,
            memoized: true,
            embed_stats: EmbedStats::default(),
            stored_at: None,
        })
    }

    fn name_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.name_locks)
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

/// Extraction is CPU-bound (PDF parsing in particular), so it runs off the
/// async worker threads.
async fn load_text(path: &Path) -> Result<String, IngestError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || extract::load_file(&path)).await?
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `docgpt ingest`: run the pipeline for one file and print a summary.
pub async fn run_ingest(config: &Config, path: &Path) -> Result<()> {
    let pipeline = IngestPipeline::from_config(config)?;
    let upload = UploadedFile::from_path(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let report = pipeline
        .ingest_with_report(upload)
        .await
        .with_context(|| format!("Failed to ingest {}", path.display()))?;

    let file = report.retriever.file();
    println!("Ingested {}", file.name);
    println!("  sha256:     {}", file.content_hash);
    if let Some(stored_at) = &report.stored_at {
        println!("  stored at:  {}", stored_at.display());
    }
    println!("  chunks:     {}", report.chunks);
    println!("  cache hits: {}", report.embed_stats.cache_hits);
    println!("  embedded:   {}", report.embed_stats.embedded);
    println!("ok");

    Ok(())
}
