use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use super::IsolateStore;
use crate::error::{ServiceError, ServiceResult};

/// Filesystem-backed isolate store with git-style 2-char sharding.
///
/// Layout: `<root>/objects/<first 2 hex chars>/<remaining hex chars>`
pub struct FsIsolateStore {
    objects_dir: PathBuf,
}

impl FsIsolateStore {
    /// Create a store rooted at `root`. Creates `root/objects/` if needed.
    pub fn new(root: impl AsRef<Path>) -> ServiceResult<Self> {
        let objects_dir = root.as_ref().join("objects");
        fs::create_dir_all(&objects_dir)?;
        Ok(Self { objects_dir })
    }

    fn blob_path(&self, digest: &str) -> ServiceResult<PathBuf> {
        if digest.len() < 3 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ServiceError::NotFound(format!("invalid isolate digest: {digest}")));
        }
        Ok(self.objects_dir.join(&digest[..2]).join(&digest[2..]))
    }

    /// Store `data` and return its hex SHA-256 digest. Deduplicates automatically.
    pub fn put(&self, data: &[u8]) -> ServiceResult<String> {
        let digest = hex::encode(Sha256::digest(data));
        let path = self.blob_path(&digest)?;
        if path.exists() {
            return Ok(digest);
        }

        let shard_dir = self.objects_dir.join(&digest[..2]);
        fs::create_dir_all(&shard_dir)?;

        // Write to a temp file in the shard, then rename into place.
        let mut tmp = NamedTempFile::new_in(&shard_dir)?;
        tmp.write_all(data)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        Ok(digest)
    }

    /// Store a JSON manifest mapping file names to stored digests.
    pub fn put_manifest<'a>(
        &self,
        files: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> ServiceResult<String> {
        let files: serde_json::Map<String, serde_json::Value> = files
            .into_iter()
            .map(|(name, digest)| (name.to_string(), serde_json::json!({ "h": digest })))
            .collect();
        let manifest = serde_json::json!({ "files": files });
        self.put(&serde_json::to_vec(&manifest)?)
    }
}

#[async_trait]
impl IsolateStore for FsIsolateStore {
    async fn retrieve(&self, digest: &str) -> ServiceResult<Vec<u8>> {
        let path = self.blob_path(digest)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ServiceError::NotFound(format!("isolate {digest}"))
            } else {
                ServiceError::Io(e)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, FsIsolateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsIsolateStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_then_retrieve() {
        let (_dir, store) = make_store();
        let digest = store.put(b"chartjson").unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(store.retrieve(&digest).await.unwrap(), b"chartjson");
    }

    #[test]
    fn test_put_dedupes() {
        let (dir, store) = make_store();
        let d1 = store.put(b"duplicate me").unwrap();
        let d2 = store.put(b"duplicate me").unwrap();
        assert_eq!(d1, d2);

        let shard = dir.path().join("objects").join(&d1[..2]);
        assert_eq!(std::fs::read_dir(shard).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_missing_is_not_found() {
        let (_dir, store) = make_store();
        let missing = hex::encode(Sha256::digest(b"missing"));
        assert!(matches!(
            store.retrieve(&missing).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            store.retrieve("../etc").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_manifest() {
        let (_dir, store) = make_store();
        let chartjson = store.put(b"{}").unwrap();
        let manifest = store
            .put_manifest([("chartjson-output.json", chartjson.as_str())])
            .unwrap();

        let bytes = store.retrieve(&manifest).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["files"]["chartjson-output.json"]["h"], chartjson);
    }
}
