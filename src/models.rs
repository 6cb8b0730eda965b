//! Core data models used throughout DocumentGPT.
//!
//! These types represent the uploaded file, the chunks derived from it, and
//! the role-tagged messages that make up a chat transcript.

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// A file handed over by the front end.
///
/// The payload is owned and consumed exactly once: the ingestion pipeline
/// takes `UploadedFile` by value, so nothing can read the bytes a second time.
#[derive(Debug)]
pub struct UploadedFile {
    name: String,
    bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Drain a reader into an upload. The reader is not touched again.
    pub fn from_reader(name: impl Into<String>, mut reader: impl Read) -> std::io::Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self::new(name, bytes))
    }

    /// Read a file from disk, naming the upload after its final path component.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("path has no file name: {}", path.display()),
                )
            })?;
        let file = std::fs::File::open(path)?;
        Self::from_reader(name, file)
    }

    /// Split the upload into its identity and the owned payload.
    pub fn into_parts(self) -> (FileIdentity, Vec<u8>) {
        let identity = FileIdentity {
            content_hash: sha256_hex(&self.bytes),
            name: self.name,
        };
        (identity, self.bytes)
    }
}

/// Stable identity of an upload: its name plus a digest of its content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub name: String,
    pub content_hash: String,
}

/// A span of document text produced by the splitter.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub hash: String,
}

impl Chunk {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            index,
            hash: sha256_hex(text.as_bytes()),
            text,
        }
    }
}

/// A chunk returned by the retriever together with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Who authored a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Human,
    Ai,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Ai => "ai",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub role: Role,
}

impl Message {
    pub fn new(text: impl Into<String>, role: Role) -> Self {
        Self {
            text: text.into(),
            role,
        }
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
