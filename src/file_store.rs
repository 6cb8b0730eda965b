//! Local scratch storage.
//!
//! Two things live under the cache root:
//!
//! ```text
//! .cache/
//! ├── files/<file-name>                  raw upload bytes, last write wins
//! └── embeddings/<file-name>/<sha256>    one cached vector per chunk text
//! ```
//!
//! [`LocalFileStore`] is a flat byte store: one file per key inside a
//! directory. Writes go through a temporary file and a rename, so readers
//! see either the old value or the new one, never a torn write.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// Reduce an upload name to a single safe path component.
///
/// Directory parts are dropped (`"../../etc/passwd"` becomes `"passwd"`),
/// and names that would resolve to a directory are rejected.
pub fn sanitize_file_name(name: &str) -> io::Result<String> {
    let normalized = name.replace('\\', "/");
    let base = Path::new(&normalized)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if base.is_empty() || base == "." || base == ".." {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("invalid upload name: {:?}", name),
        ));
    }
    Ok(base)
}

/// Write upload bytes to `<files_dir>/<name>`, replacing any previous file
/// with the same name. Returns the path of the durable copy.
pub async fn persist_upload(files_dir: &Path, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    let file_name = sanitize_file_name(name)?;
    tokio::fs::create_dir_all(files_dir).await?;
    let path = files_dir.join(&file_name);
    write_atomic(&path, bytes).await?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "persisted upload");
    Ok(path)
}

/// Byte store keyed by file name inside one directory.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Fetch the value stored under `key`, or `None` if it was never set.
    pub async fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        let path = self.key_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Store `value` under `key`, creating the directory on first use.
    pub async fn set(&self, key: &str, value: &[u8]) -> io::Result<()> {
        let path = self.key_path(key)?;
        tokio::fs::create_dir_all(&self.root).await?;
        write_atomic(&path, value).await
    }

    /// List stored keys in sorted order.
    pub async fn keys(&self) -> io::Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().await?.is_file() && !name.ends_with(TMP_SUFFIX) {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn key_path(&self, key: &str) -> io::Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid store key: {:?}", key),
            ));
        }
        Ok(self.root.join(key))
    }
}

const TMP_SUFFIX: &str = ".tmp";

async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(
        ".{}.{}{}",
        file_name,
        uuid::Uuid::new_v4().simple(),
        TMP_SUFFIX
    ));
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}
