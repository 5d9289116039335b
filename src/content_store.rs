//! Blob-fetch capability used to read signer results.
//!
//! A missing blob is a normal answer (`Ok(None)`), not an error: signer
//! results appear over time while signing is in progress.

use crate::error::{PaygenError, Result};
use crate::ports::PortFuture;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub trait ContentStore: Send + Sync {
    /// Read the whole blob at `url`, or `None` when it does not exist yet.
    fn cat<'a>(&'a self, url: &'a str) -> PortFuture<'a, Option<Vec<u8>>>;
}

impl<T> ContentStore for Arc<T>
where
    T: ContentStore + ?Sized,
{
    fn cat<'a>(&'a self, url: &'a str) -> PortFuture<'a, Option<Vec<u8>>> {
        (**self).cat(url)
    }
}

/// Content store backed by a local directory.
///
/// `gs://bucket/path` maps to `<root>/bucket/path`, `file://` URLs are read
/// as-is and anything else is taken relative to the root.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a store URL to the local file that backs it.
    ///
    /// # Errors
    /// Returns `PaygenError::ConfigError` for URL schemes the store cannot map.
    pub fn resolve(&self, url: &str) -> Result<PathBuf> {
        match url::Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "file" => parsed.to_file_path().map_err(|()| {
                PaygenError::ConfigError(format!("Invalid file URL: {url}"))
            }),
            Ok(parsed) if parsed.scheme() == "gs" => {
                let bucket = parsed.host_str().unwrap_or_default();
                let object = parsed.path().trim_start_matches('/');
                Ok(self.root.join(bucket).join(object))
            }
            Ok(parsed) => Err(PaygenError::ConfigError(format!(
                "Unsupported content store scheme '{}' in {url}",
                parsed.scheme()
            ))),
            Err(_) => Ok(self.root.join(url.trim_start_matches('/'))),
        }
    }
}

impl ContentStore for FsContentStore {
    fn cat<'a>(&'a self, url: &'a str) -> PortFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            let path = self.resolve(url)?;
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    debug!(url, path = %path.display(), "blob not present yet");
                    Ok(None)
                }
                Err(err) => Err(PaygenError::IoError(err)),
            }
        })
    }
}

#[derive(Debug, Default)]
struct ScriptedBlob {
    frames: VecDeque<Option<Vec<u8>>>,
    current: Option<Vec<u8>>,
    reads: usize,
}

/// In-memory content store.
///
/// Each URL can be given a script of successive answers so a blob can appear,
/// change or stay malformed across poll cycles. Once the script is exhausted
/// the last answer keeps being returned.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    blobs: Arc<Mutex<HashMap<String, ScriptedBlob>>>,
}

impl MemoryContentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        let mut blobs = self.blobs.lock().await;
        let blob = blobs.entry(url.into()).or_default();
        blob.frames.clear();
        blob.current = Some(body.into());
    }

    /// Queue answers returned by successive reads, `None` meaning absent.
    pub async fn script<I, B>(&self, url: impl Into<String>, frames: I)
    where
        I: IntoIterator<Item = Option<B>>,
        B: Into<Vec<u8>>,
    {
        let mut blobs = self.blobs.lock().await;
        let blob = blobs.entry(url.into()).or_default();
        blob.frames
            .extend(frames.into_iter().map(|frame| frame.map(Into::into)));
    }

    /// Number of reads served for `url`.
    pub async fn reads(&self, url: &str) -> usize {
        self.blobs
            .lock()
            .await
            .get(url)
            .map_or(0, |blob| blob.reads)
    }
}

impl ContentStore for MemoryContentStore {
    fn cat<'a>(&'a self, url: &'a str) -> PortFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            let mut blobs = self.blobs.lock().await;
            let blob = blobs.entry(url.to_string()).or_default();
            blob.reads = blob.reads.saturating_add(1);
            if let Some(frame) = blob.frames.pop_front() {
                blob.current = frame;
            }
            Ok(blob.current.clone())
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_store_maps_gs_urls_under_root() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = FsContentStore::new(temp_dir.path());
        let target = temp_dir.path().join("releases/beta/u1.json");
        tokio::fs::create_dir_all(target.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&target, b"{}").await.unwrap();

        assert_eq!(store.resolve("gs://releases/beta/u1.json").unwrap(), target);
        let body = store.cat("gs://releases/beta/u1.json").await.unwrap();
        assert_eq!(body, Some(b"{}".to_vec()));
    }

    #[tokio::test]
    async fn fs_store_reports_missing_blob_as_none() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = FsContentStore::new(temp_dir.path());
        let body = store.cat("gs://releases/absent.json").await.unwrap();
        assert!(body.is_none());
    }

    #[test]
    fn fs_store_rejects_unknown_schemes() {
        let store = FsContentStore::new("/tmp");
        assert!(matches!(
            store.resolve("https://example.com/x.json"),
            Err(PaygenError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn memory_store_plays_script_then_sticks_to_last_frame() {
        let store = MemoryContentStore::new();
        store
            .script("u1.json", [None, Some("a"), Some("b")])
            .await;

        assert_eq!(store.cat("u1.json").await.unwrap(), None);
        assert_eq!(store.cat("u1.json").await.unwrap(), Some(b"a".to_vec()));
        assert_eq!(store.cat("u1.json").await.unwrap(), Some(b"b".to_vec()));
        assert_eq!(store.cat("u1.json").await.unwrap(), Some(b"b".to_vec()));
        assert_eq!(store.reads("u1.json").await, 4);
    }
}
