//! In-memory cache store backed by per-generation hash maps.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use super::{CacheStore, Generation, RequestKey, StoreError, StoreFuture, StoredResponse};

type GenerationMap = HashMap<String, HashMap<RequestKey, StoredResponse>>;

/// Process-local store. Entries live as long as the process; there is no
/// persistence across restarts.
///
/// Cloning shares the underlying maps, so a clone sees the same entries.
///
/// # Examples
///
/// ```
/// use offcache::store::{CacheStore, MemoryStore, RequestKey, StoreError};
/// use offcache::http::Request;
///
/// # async fn demo() -> Result<(), StoreError> {
/// let store = MemoryStore::new();
/// let generation = store.open("app-cache-v1").await?;
/// let key = RequestKey::of(&Request::get("/"));
/// assert!(store.get(&generation, &key).await?.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    generations: Arc<RwLock<GenerationMap>>,
}

impl MemoryStore {
    /// Creates an empty store with no generations.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn open(&self, name: &str) -> StoreFuture<Generation> {
        let generations = Arc::clone(&self.generations);
        let name = name.to_owned();
        Box::pin(async move {
            generations.write().await.entry(name.clone()).or_default();
            Ok(Generation::new(name))
        })
    }

    fn get(
        &self,
        generation: &Generation,
        key: &RequestKey,
    ) -> StoreFuture<Option<StoredResponse>> {
        let generations = Arc::clone(&self.generations);
        let generation = generation.clone();
        let key = key.clone();
        Box::pin(async move {
            let map = generations.read().await;
            Ok(map
                .get(generation.name())
                .and_then(|entries| entries.get(&key).cloned()))
        })
    }

    fn put(
        &self,
        generation: &Generation,
        key: RequestKey,
        response: StoredResponse,
    ) -> StoreFuture<()> {
        let generations = Arc::clone(&self.generations);
        let generation = generation.clone();
        Box::pin(async move {
            let mut map = generations.write().await;
            match map.get_mut(generation.name()) {
                Some(entries) => {
                    entries.insert(key, response);
                    Ok(())
                }
                None => Err(StoreError::UnknownGeneration {
                    name: generation.name().to_owned(),
                }),
            }
        })
    }

    fn list(&self) -> StoreFuture<Vec<Generation>> {
        let generations = Arc::clone(&self.generations);
        Box::pin(async move {
            let map = generations.read().await;
            Ok(map.keys().map(|name| Generation::new(name.as_str())).collect())
        })
    }

    fn delete(&self, generation: &Generation) -> StoreFuture<bool> {
        let generations = Arc::clone(&self.generations);
        let generation = generation.clone();
        Box::pin(async move {
            Ok(generations.write().await.remove(generation.name()).is_some())
        })
    }
}
