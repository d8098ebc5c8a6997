//! Binary artifact storage addressed by relative path.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;

use super::StorageError;

/// Append-only store for generated files.
///
/// Paths are relative and `/`-separated, e.g. `reports/12/standard-report.pdf`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` at `path`. Fails with `AlreadyExists` rather than overwriting.
    async fn save(&self, data: Bytes, path: &str) -> Result<String, StorageError>;

    /// Read a blob and its guessed content type.
    async fn get(&self, path: &str) -> Result<(Bytes, String), StorageError>;

    /// Remove a blob. Returns false when nothing was there.
    async fn delete(&self, path: &str) -> Result<bool, StorageError>;

    /// All blob paths under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    async fn exists(&self, path: &str) -> Result<bool, StorageError>;
}

/// Content type for a stored file name.
pub fn content_type_for(path: &str) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// `name` or `name-n` with the extension kept, for collision avoidance.
pub fn candidate_name(file_name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return file_name.to_string();
    }
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}-{}.{}", stem, attempt, ext),
        _ => format!("{}-{}", file_name, attempt),
    }
}

/// Blob store on the local filesystem under a root directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let rel = normalize(path)?;
        Ok(self.root.join(rel))
    }
}

/// Reject absolute paths and parent traversal; strip `.` segments.
fn normalize(path: &str) -> Result<PathBuf, StorageError> {
    let mut out = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(StorageError::InvalidPath(path.to_string())),
        }
    }
    if out.as_os_str().is_empty() {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(out)
}

fn to_key(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Write `data` into a file just created at `full`. On failure the file is
/// removed so the path stays free.
async fn fill_new<W>(mut file: W, data: &[u8], full: &Path) -> Result<(), StorageError>
where
    W: AsyncWrite + Unpin,
{
    let mut written = file.write_all(data).await;
    if written.is_ok() {
        written = file.flush().await;
    }

    if let Err(e) = written {
        drop(file);
        if let Err(rm) = fs::remove_file(full).await {
            warn!(path = %full.display(), error = %rm, "cannot remove partially written blob");
        }
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn save(&self, data: Bytes, path: &str) -> Result<String, StorageError> {
        let rel = normalize(path)?;
        let full = self.root.join(&rel);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(to_key(&rel)));
            }
            Err(e) => return Err(e.into()),
        };

        fill_new(file, &data, &full).await?;
        Ok(to_key(&rel))
    }

    async fn get(&self, path: &str) -> Result<(Bytes, String), StorageError> {
        let full = self.resolve(path)?;
        match fs::read(&full).await {
            Ok(data) => Ok((Bytes::from(data), content_type_for(path))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::Missing {
                entity: "blob",
                id: path.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<bool, StorageError> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let start = if prefix.is_empty() {
            PathBuf::new()
        } else {
            normalize(prefix)?
        };

        let mut found = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(self.root.join(&dir)).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let rel = dir.join(entry.file_name());
                if entry.file_type().await?.is_dir() {
                    pending.push(rel);
                } else {
                    found.push(to_key(&rel));
                }
            }
        }

        found.sort();
        Ok(found)
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let full = self.resolve(path)?;
        Ok(fs::try_exists(&full).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let full = dir.path().join("standard-report.pdf");
        std::fs::write(&full, b"").unwrap();

        let broken = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
            .build();
        let err = fill_new(broken, b"%PDF-1.7", &full).await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert!(!full.exists());

        // The path is free again for a later save.
        let store = LocalBlobStore::new(dir.path());
        store
            .save(Bytes::from_static(b"%PDF-1.7"), "standard-report.pdf")
            .await
            .unwrap();
    }

    #[test]
    fn test_candidate_names() {
        assert_eq!(candidate_name("standard-report.pdf", 0), "standard-report.pdf");
        assert_eq!(candidate_name("standard-report.pdf", 2), "standard-report-2.pdf");
        assert_eq!(candidate_name("archive.tar.gz", 1), "archive.tar-1.gz");
        assert_eq!(candidate_name("README", 1), "README-1");
        assert_eq!(candidate_name(".hidden", 1), ".hidden-1");
    }

    #[tokio::test]
    async fn test_save_get_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let key = store
            .save(Bytes::from_static(b"<html/>"), "reports/3/./standard-report.html")
            .await
            .unwrap();
        assert_eq!(key, "reports/3/standard-report.html");
        store
            .save(Bytes::from_static(b"png"), "charts/3/latency.png")
            .await
            .unwrap();

        let (data, content_type) = store.get(&key).await.unwrap();
        assert_eq!(&data[..], b"<html/>");
        assert_eq!(content_type, "text/html");

        assert_eq!(
            store.list("").await.unwrap(),
            vec!["charts/3/latency.png", "reports/3/standard-report.html"]
        );
        assert_eq!(store.list("charts").await.unwrap().len(), 1);
        assert!(store.list("media").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        store.save(Bytes::from_static(b"a"), "reports/1/r.csv").await.unwrap();
        let err = store
            .save(Bytes::from_static(b"b"), "reports/1/r.csv")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));

        let (data, _) = store.get("reports/1/r.csv").await.unwrap();
        assert_eq!(&data[..], b"a");
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        for bad in ["../outside.txt", "/etc/passwd", "reports/../../x", ""] {
            let err = store.save(Bytes::from_static(b"x"), bad).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidPath(_)), "{bad} accepted");
        }
    }

    #[tokio::test]
    async fn test_delete_reports_absence() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        store.save(Bytes::from_static(b"x"), "charts/1/a.png").await.unwrap();
        assert!(store.exists("charts/1/a.png").await.unwrap());
        assert!(store.delete("charts/1/a.png").await.unwrap());
        assert!(!store.delete("charts/1/a.png").await.unwrap());
        assert!(!store.exists("charts/1/a.png").await.unwrap());
    }
}
