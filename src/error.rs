//! Error taxonomy for the ingestion pipeline and the chat session.
//!
//! Library entry points return these typed errors so callers can tell a bad
//! upload apart from a provider outage. The CLI wraps them in
//! [`anyhow::Error`] with context at the command boundary.

use thiserror::Error;

/// The uploaded payload could not be turned into text.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("file is not valid UTF-8 text: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Failure reported by (or while talking to) an embedding provider.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled")]
    Disabled,
    #[error("{0} environment variable not set")]
    MissingApiKey(&'static str),
    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid {provider} response: {reason}")]
    InvalidResponse {
        provider: &'static str,
        reason: String,
    },
    #[error("provider returned {got} embeddings for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
    #[error("{model} returned a {got}-dimensional vector, expected {expected}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        got: usize,
    },
}

/// Any failure that aborts ingestion of one file.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    EmbeddingProvider(#[from] EmbeddingError),
    #[error("scratch storage error: {0}")]
    Io(#[from] std::io::Error),
    #[error("text extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Failure of a single chat turn.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no file selected; upload a document first")]
    NoFileSelected,
    #[error("file selection is not available in this session")]
    FileSelectionUnsupported,
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("reply failed")]
    Reply(#[source] anyhow::Error),
    #[error("unknown session {0}")]
    UnknownSession(uuid::Uuid),
}
