//! Disk-backed cache store — one directory per generation.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!   app-cache-v1/
//!     3f5a…e2.json    entry metadata (key, status, headers)
//!     3f5a…e2.bin     response body
//!   app-cache-v2/
//!     …
//! ```
//!
//! Entry file stems are the SHA-256 of the request key, so arbitrary targets
//! map to fixed-length, filesystem-safe names. Writes go through a temporary
//! file renamed into place, body before metadata, so a reader either sees a
//! complete entry or none at all.

use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::fs;

use super::{CacheStore, Generation, RequestKey, StoreError, StoreFuture, StoredResponse};
use crate::http::StatusCode;

/// Distinguishes temporary files written by concurrent puts for the same key.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Persistent store rooted at a directory. Entries survive process restarts,
/// which is what lets the cache serve anything at all on a cold offline start.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

/// The JSON sidecar persisted next to each body file.
#[derive(serde::Serialize, serde::Deserialize)]
struct EntryMeta {
    key: RequestKey,
    status: u16,
    headers: Vec<(String, String)>,
}

impl DiskStore {
    /// Creates a store rooted at `root`. The directory is created lazily on
    /// the first [`open`](CacheStore::open).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn generation_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Fixed-length, filesystem-safe stem for an entry's files.
    fn entry_stem(key: &RequestKey) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.method().as_bytes());
        hasher.update(b" ");
        hasher.update(key.target().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Generation names become directory names, so anything that traverses
    /// out of the root is rejected.
    fn check_name(name: &str) -> Result<(), StoreError> {
        let traverses = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\');
        if traverses {
            return Err(StoreError::InvalidName {
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    /// Writes `contents` to `path` atomically: a temporary sibling file is
    /// written in full, then renamed over the destination.
    async fn write_atomic(path: PathBuf, contents: Vec<u8>) -> Result<(), StoreError> {
        let tag = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp = path.clone();
        tmp.set_extension(format!("tmp{tag}"));

        fs::write(&tmp, contents).await?;
        if let Err(error) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(error.into());
        }
        Ok(())
    }
}

impl CacheStore for DiskStore {
    fn open(&self, name: &str) -> StoreFuture<Generation> {
        let name = name.to_owned();
        let dir = self.generation_dir(&name);
        Box::pin(async move {
            Self::check_name(&name)?;
            fs::create_dir_all(&dir).await?;
            Ok(Generation::new(name))
        })
    }

    fn get(
        &self,
        generation: &Generation,
        key: &RequestKey,
    ) -> StoreFuture<Option<StoredResponse>> {
        let name = generation.name().to_owned();
        let dir = self.generation_dir(&name);
        let stem = Self::entry_stem(key);
        Box::pin(async move {
            Self::check_name(&name)?;
            let meta_bytes = match fs::read(dir.join(format!("{stem}.json"))).await {
                Ok(bytes) => bytes,
                Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
                Err(error) => return Err(error.into()),
            };
            let meta: EntryMeta = serde_json::from_slice(&meta_bytes)?;

            // Metadata is renamed into place after the body, so the body file
            // exists whenever the metadata does unless the entry was tampered
            // with; a lost body reads as a miss.
            let body = match fs::read(dir.join(format!("{stem}.bin"))).await {
                Ok(bytes) => bytes,
                Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
                Err(error) => return Err(error.into()),
            };

            Ok(Some(StoredResponse::from_parts(
                StatusCode::from_u16(meta.status),
                meta.headers,
                Bytes::from(body),
            )))
        })
    }

    fn put(
        &self,
        generation: &Generation,
        key: RequestKey,
        response: StoredResponse,
    ) -> StoreFuture<()> {
        let dir = self.generation_dir(generation.name());
        let name = generation.name().to_owned();
        Box::pin(async move {
            Self::check_name(&name)?;
            match fs::metadata(&dir).await {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => return Err(StoreError::UnknownGeneration { name }),
                Err(error) if error.kind() == ErrorKind::NotFound => {
                    return Err(StoreError::UnknownGeneration { name });
                }
                Err(error) => return Err(error.into()),
            }

            let stem = Self::entry_stem(&key);
            let meta = EntryMeta {
                status: response.status().as_u16(),
                headers: response.headers().to_vec(),
                key,
            };
            let meta_bytes = serde_json::to_vec(&meta)?;

            // Body first, metadata last: an entry becomes visible only once
            // both files are complete.
            Self::write_atomic(
                dir.join(format!("{stem}.bin")),
                response.body().to_vec(),
            )
            .await?;
            Self::write_atomic(dir.join(format!("{stem}.json")), meta_bytes).await?;
            Ok(())
        })
    }

    fn list(&self) -> StoreFuture<Vec<Generation>> {
        let root = self.root.clone();
        Box::pin(async move {
            let mut dirs = match fs::read_dir(&root).await {
                Ok(dirs) => dirs,
                Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(error) => return Err(error.into()),
            };

            let mut generations = Vec::new();
            while let Some(entry) = dirs.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    if let Some(name) = entry.file_name().to_str() {
                        generations.push(Generation::new(name));
                    }
                }
            }
            Ok(generations)
        })
    }

    fn delete(&self, generation: &Generation) -> StoreFuture<bool> {
        let name = generation.name().to_owned();
        let dir = self.generation_dir(&name);
        Box::pin(async move {
            Self::check_name(&name)?;
            match fs::remove_dir_all(&dir).await {
                Ok(()) => Ok(true),
                Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
                Err(error) => Err(error.into()),
            }
        })
    }
}
