//! Bucket-oriented storage over local filesystem or S3.
//!
//! All pipeline artifacts live in one of five logical buckets. The store
//! maps each bucket to a key prefix inside a single backing location, so
//! switching between a local directory and an S3 bucket is a config change
//! only.

mod naming;

pub use naming::{stamped_name, FileRole, NameRegistry};

use crate::models::{Result, SkilltagError, StorageBackend, StorageConfig};
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Logical homes for pipeline artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Validated uploads, stored verbatim.
    Input,
    /// Preprocessed datasets the pipeline actually consumes.
    Intermediate,
    /// Tagged results.
    Output,
    /// Rows that fall outside the configured sector.
    MiscOutput,
    /// Resumable run state.
    Checkpoint,
}

impl Bucket {
    pub const ALL: [Bucket; 5] = [
        Bucket::Input,
        Bucket::Intermediate,
        Bucket::Output,
        Bucket::MiscOutput,
        Bucket::Checkpoint,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Intermediate => "intermediate",
            Self::Output => "output",
            Self::MiscOutput => "misc_output",
            Self::Checkpoint => "checkpoint",
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Storage handle shared across the pipeline.
#[derive(Clone)]
pub struct BucketStore {
    object_store: Arc<dyn ObjectStore>,
    names: Arc<NameRegistry>,
}

impl std::fmt::Debug for BucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BucketStore")
    }
}

impl BucketStore {
    /// Build a store from config. Local backends get their root directory
    /// created up front since the filesystem backend requires it to exist.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let object_store: Arc<dyn ObjectStore> = match config.backend {
            StorageBackend::Local => {
                std::fs::create_dir_all(&config.root)
                    .map_err(|e| SkilltagError::io("creating storage root", e))?;
                Arc::new(LocalFileSystem::new_with_prefix(&config.root).map_err(|e| {
                    SkilltagError::storage("local", config.root.display().to_string(), e.to_string())
                })?)
            }
            StorageBackend::S3 => {
                let bucket = config.bucket.as_deref().ok_or_else(|| {
                    SkilltagError::storage("s3", "-", "S3 backend requires storage.bucket")
                })?;
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_virtual_hosted_style_request(false)
                        .with_allow_http(true);
                }
                Arc::new(builder.build().map_err(|e| {
                    SkilltagError::storage("s3", bucket, e.to_string())
                })?)
            }
        };
        Ok(Self {
            object_store,
            names: Arc::new(NameRegistry::new()),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            object_store: Arc::new(object_store::memory::InMemory::new()),
            names: Arc::new(NameRegistry::new()),
        }
    }

    fn key(bucket: Bucket, name: &str) -> ObjectPath {
        ObjectPath::from(format!("{}/{name}", bucket.prefix()))
    }

    /// Store bytes under a stamped, collision-free name. Returns the stored
    /// name so callers can refer to the artifact later.
    pub async fn store_stamped(
        &self,
        bucket: Bucket,
        base_name: &str,
        role: FileRole,
        bytes: Bytes,
    ) -> Result<String> {
        let stamped = stamped_name(base_name, role, Utc::now());
        let stored = self.names.reserve(&stamped);
        self.put(bucket, &stored, bytes).await?;
        Ok(stored)
    }

    /// Store several artifacts concurrently. Fails with the name of the
    /// first artifact that could not be written.
    pub async fn store_stamped_batch(
        &self,
        bucket: Bucket,
        role: FileRole,
        artifacts: Vec<(String, Bytes)>,
    ) -> Result<Vec<String>> {
        let writes = artifacts.into_iter().map(|(base, bytes)| async move {
            self.store_stamped(bucket, &base, role, bytes)
                .await
                .map_err(|e| (base, e))
        });
        let mut stored = Vec::new();
        for result in futures::future::join_all(writes).await {
            match result {
                Ok(name) => stored.push(name),
                Err((base, e)) => {
                    return Err(SkilltagError::storage(
                        bucket.prefix(),
                        base,
                        format!("batch write failed: {e}"),
                    ))
                }
            }
        }
        Ok(stored)
    }

    pub async fn put(&self, bucket: Bucket, name: &str, bytes: Bytes) -> Result<()> {
        let path = Self::key(bucket, name);
        debug!(bucket = %bucket, name, size = bytes.len(), "Writing artifact");
        self.object_store
            .put(&path, PutPayload::from(bytes))
            .await
            .map_err(|e| SkilltagError::storage(bucket.prefix(), name, e.to_string()))?;
        Ok(())
    }

    pub async fn get(&self, bucket: Bucket, name: &str) -> Result<Bytes> {
        let path = Self::key(bucket, name);
        let result = self
            .object_store
            .get(&path)
            .await
            .map_err(|e| SkilltagError::storage(bucket.prefix(), name, e.to_string()))?;
        result
            .bytes()
            .await
            .map_err(|e| SkilltagError::storage(bucket.prefix(), name, e.to_string()))
    }

    /// Like `get`, but a missing object is `None` rather than an error.
    /// Backend faults other than not-found still surface.
    pub async fn get_opt(&self, bucket: Bucket, name: &str) -> Result<Option<Bytes>> {
        let path = Self::key(bucket, name);
        match self.object_store.get(&path).await {
            Ok(result) => {
                let bytes = result
                    .bytes()
                    .await
                    .map_err(|e| SkilltagError::storage(bucket.prefix(), name, e.to_string()))?;
                Ok(Some(bytes))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(SkilltagError::storage(bucket.prefix(), name, e.to_string())),
        }
    }

    /// List stored names in a bucket, sorted.
    pub async fn list(&self, bucket: Bucket) -> Result<Vec<String>> {
        let prefix = ObjectPath::from(bucket.prefix());
        let mut stream = self.object_store.list(Some(&prefix));
        let mut names = Vec::new();
        while let Some(meta) = stream.next().await {
            let meta = meta
                .map_err(|e| SkilltagError::storage(bucket.prefix(), "-", e.to_string()))?;
            if let Some(name) = meta.location.filename() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Read the first stored file whose name starts with `stem`. Used when
    /// resuming: the caller knows the base name but not the stored stamp.
    pub async fn read_first_match(&self, bucket: Bucket, stem: &str) -> Result<(String, Bytes)> {
        let names = self.list(bucket).await?;
        let name = names
            .into_iter()
            .find(|n| n.starts_with(stem))
            .ok_or_else(|| {
                SkilltagError::storage(
                    bucket.prefix(),
                    stem,
                    "no stored file matches this name",
                )
            })?;
        let bytes = self.get(bucket, &name).await?;
        Ok((name, bytes))
    }

    pub async fn delete(&self, bucket: Bucket, name: &str) -> Result<()> {
        let path = Self::key(bucket, name);
        self.object_store
            .delete(&path)
            .await
            .map_err(|e| SkilltagError::storage(bucket.prefix(), name, e.to_string()))?;
        Ok(())
    }

    /// Delete everything in every bucket, pausing between deletes so the
    /// backend is never hammered with a burst of delete calls. Callers must
    /// hold explicit permission before invoking this.
    pub async fn reset_all(&self, pace: Duration) -> Result<usize> {
        let mut deleted = 0usize;
        for bucket in Bucket::ALL {
            for name in self.list(bucket).await? {
                self.delete(bucket, &name).await?;
                deleted += 1;
                if !pace.is_zero() {
                    tokio::time::sleep(pace).await;
                }
            }
        }
        info!(deleted, "Storage reset complete");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = BucketStore::in_memory();
        store
            .put(Bucket::Input, "a.csv", Bytes::from_static(b"x,y\n1,2\n"))
            .await
            .unwrap();
        let bytes = store.get(Bucket::Input, "a.csv").await.unwrap();
        assert_eq!(bytes.as_ref(), b"x,y\n1,2\n");
    }

    #[tokio::test]
    async fn get_opt_separates_absence_from_presence() {
        let store = BucketStore::in_memory();
        assert!(store.get_opt(Bucket::Input, "a.csv").await.unwrap().is_none());
        store
            .put(Bucket::Input, "a.csv", Bytes::from_static(b"x\n"))
            .await
            .unwrap();
        let bytes = store.get_opt(Bucket::Input, "a.csv").await.unwrap();
        assert_eq!(bytes.as_deref(), Some(b"x\n".as_slice()));
    }

    #[tokio::test]
    async fn buckets_are_isolated() {
        let store = BucketStore::in_memory();
        store
            .put(Bucket::Input, "a.csv", Bytes::from_static(b"in"))
            .await
            .unwrap();
        store
            .put(Bucket::Output, "a.csv", Bytes::from_static(b"out"))
            .await
            .unwrap();
        assert_eq!(store.get(Bucket::Input, "a.csv").await.unwrap().as_ref(), b"in");
        assert_eq!(store.get(Bucket::Output, "a.csv").await.unwrap().as_ref(), b"out");
        assert_eq!(store.list(Bucket::Input).await.unwrap(), vec!["a.csv"]);
    }

    #[tokio::test]
    async fn same_base_name_stored_twice_gets_distinct_names() {
        let store = BucketStore::in_memory();
        let first = store
            .store_stamped(Bucket::Input, "courses.csv", FileRole::Input, Bytes::from_static(b"1"))
            .await
            .unwrap();
        let second = store
            .store_stamped(Bucket::Input, "courses.csv", FileRole::Input, Bytes::from_static(b"2"))
            .await
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(store.get(Bucket::Input, &first).await.unwrap().as_ref(), b"1");
        assert_eq!(store.get(Bucket::Input, &second).await.unwrap().as_ref(), b"2");
    }

    #[tokio::test]
    async fn read_first_match_finds_stamped_file() {
        let store = BucketStore::in_memory();
        let stored = store
            .store_stamped(Bucket::Intermediate, "sector.csv", FileRole::Input, Bytes::from_static(b"d"))
            .await
            .unwrap();
        let (name, bytes) = store
            .read_first_match(Bucket::Intermediate, "sector")
            .await
            .unwrap();
        assert_eq!(name, stored);
        assert_eq!(bytes.as_ref(), b"d");

        let missing = store.read_first_match(Bucket::Intermediate, "nope").await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn reset_all_empties_every_bucket() {
        let store = BucketStore::in_memory();
        for bucket in Bucket::ALL {
            store
                .put(bucket, "x", Bytes::from_static(b"1"))
                .await
                .unwrap();
        }
        let deleted = store.reset_all(Duration::ZERO).await.unwrap();
        assert_eq!(deleted, 5);
        for bucket in Bucket::ALL {
            assert!(store.list(bucket).await.unwrap().is_empty());
        }
    }
}
