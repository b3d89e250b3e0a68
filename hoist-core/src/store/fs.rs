use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{ByteStream, ObjectStoreClient, StoreError};

/// Object store backed by a local directory tree: objects land at
/// `root/bucket/key`. Useful for tests and for running the engine without a
/// cloud account; the bucket directory must already exist (a missing bucket
/// is a permanent NotFound, matching a real store).
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }
}

#[async_trait]
impl ObjectStoreClient for FsObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut content: ByteStream,
        size_bytes: u64,
    ) -> Result<(), StoreError> {
        let bucket_dir = self.root.join(bucket);
        if !bucket_dir.is_dir() {
            return Err(StoreError::NotFound(format!("bucket: {bucket}")));
        }

        let dest = self.object_path(bucket, key);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io_error(e, parent))?;
        }

        // Write to a sibling temp file, then rename. A retried PUT of the
        // same key never leaves a half-written object visible.
        let tmp = {
            let mut os = dest.clone().into_os_string();
            os.push(".hoist-partial");
            PathBuf::from(os)
        };
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| map_io_error(e, &tmp))?;

        let written = tokio::io::copy(&mut content, &mut file)
            .await
            .map_err(|e| map_io_error(e, &tmp))?;
        file.flush().await.map_err(|e| map_io_error(e, &tmp))?;
        drop(file);

        if written != size_bytes {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::Unknown(format!(
                "short write for {bucket}/{key}: expected {size_bytes} bytes, wrote {written}"
            )));
        }

        fs::rename(&tmp, &dest)
            .await
            .map_err(|e| map_io_error(e, &dest))?;

        Ok(())
    }
}

fn map_io_error(err: io::Error, path: &Path) -> StoreError {
    let path = path.display();
    match err.kind() {
        io::ErrorKind::NotFound => StoreError::NotFound(path.to_string()),
        io::ErrorKind::PermissionDenied => StoreError::AccessDenied(path.to_string()),
        io::ErrorKind::TimedOut => StoreError::Timeout(format!("{path}: {err}")),
        _ => StoreError::Unknown(format!("{path}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreErrorKind;

    fn stream(data: &'static [u8]) -> ByteStream {
        Box::new(data)
    }

    #[tokio::test]
    async fn put_writes_object_under_bucket() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("media")).unwrap();
        let store = FsObjectStore::new(tmp.path());

        store
            .put_object("media", "clips/a.txt", stream(b"hello"), 5)
            .await
            .unwrap();

        let body = std::fs::read(tmp.path().join("media/clips/a.txt")).unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn missing_bucket_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(tmp.path());

        let err = store
            .put_object("nope", "a.txt", stream(b"x"), 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::NotFound);
    }

    #[tokio::test]
    async fn repeated_put_overwrites_cleanly() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("b")).unwrap();
        let store = FsObjectStore::new(tmp.path());

        store.put_object("b", "k", stream(b"first"), 5).await.unwrap();
        store.put_object("b", "k", stream(b"first"), 5).await.unwrap();

        let body = std::fs::read(tmp.path().join("b/k")).unwrap();
        assert_eq!(body, b"first");
        // No partial file left behind
        assert!(!tmp.path().join("b/k.hoist-partial").exists());
    }

    #[tokio::test]
    async fn size_mismatch_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("b")).unwrap();
        let store = FsObjectStore::new(tmp.path());

        let err = store
            .put_object("b", "k", stream(b"abc"), 99)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Unknown);
        assert!(!tmp.path().join("b/k").exists());
    }
}
