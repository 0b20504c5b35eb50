//! Test doubles shared across module tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::http::{Request, Response, StatusCode};
use crate::store::{
    CacheStore, Generation, MemoryStore, RequestKey, StoreError, StoreFuture, StoredResponse,
};
use crate::transport::{FetchFuture, Transport, TransportError};

/// Transport that plays back a script of canned outcomes, in order.
///
/// Once the script is exhausted every fetch fails with a connect error,
/// which doubles as "the network is down".
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Response, TransportError>>>,
    targets: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn script(outcomes: Vec<Result<Response, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into()),
            targets: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn always_failing() -> Arc<Self> {
        Self::script(Vec::new())
    }

    /// Number of fetches issued so far.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Targets of every fetch issued so far, in order.
    pub(crate) fn seen_targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn fetch(&self, request: Request) -> FetchFuture {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push(request.target());
        let next = self.script.lock().unwrap().pop_front();
        Box::pin(async move {
            match next {
                Some(outcome) => outcome,
                None => Err(TransportError::Connect {
                    authority: "origin".into(),
                    source: std::io::Error::other("connection refused"),
                }),
            }
        })
    }
}

/// Store wrapper that counts reads and writes passing through it.
pub(crate) struct CountingStore {
    inner: MemoryStore,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl CountingStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        })
    }

    pub(crate) fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub(crate) fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl CacheStore for CountingStore {
    fn open(&self, name: &str) -> StoreFuture<Generation> {
        self.inner.open(name)
    }

    fn get(
        &self,
        generation: &Generation,
        key: &RequestKey,
    ) -> StoreFuture<Option<StoredResponse>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(generation, key)
    }

    fn put(
        &self,
        generation: &Generation,
        key: RequestKey,
        response: StoredResponse,
    ) -> StoreFuture<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(generation, key, response)
    }

    fn list(&self) -> StoreFuture<Vec<Generation>> {
        self.inner.list()
    }

    fn delete(&self, generation: &Generation) -> StoreFuture<bool> {
        self.inner.delete(generation)
    }
}

/// Store whose reads and writes always fail.
pub(crate) struct FailingStore;

impl CacheStore for FailingStore {
    fn open(&self, name: &str) -> StoreFuture<Generation> {
        let name = name.to_owned();
        Box::pin(async move { Ok(Generation::new(name)) })
    }

    fn get(&self, _: &Generation, _: &RequestKey) -> StoreFuture<Option<StoredResponse>> {
        Box::pin(async { Err(StoreError::Io(std::io::Error::other("disk detached"))) })
    }

    fn put(&self, _: &Generation, _: RequestKey, _: StoredResponse) -> StoreFuture<()> {
        Box::pin(async { Err(StoreError::Io(std::io::Error::other("disk full"))) })
    }

    fn list(&self) -> StoreFuture<Vec<Generation>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn delete(&self, _: &Generation) -> StoreFuture<bool> {
        Box::pin(async { Ok(false) })
    }
}

/// A `200 OK` with the given content type and body.
pub(crate) fn ok_with(content_type: &str, body: &str) -> Response {
    Response::new(StatusCode::OK)
        .header("Content-Type", content_type)
        .body_text(body)
}

/// Polls until a detached background write lands in the store.
pub(crate) async fn wait_for_entry(
    store: &dyn CacheStore,
    generation: &Generation,
    key: &RequestKey,
) -> StoredResponse {
    for _ in 0..50 {
        if let Some(entry) = store.get(generation, key).await.unwrap() {
            return entry;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    panic!("entry for {key} never appeared");
}

/// Gives detached writes a chance to run before asserting their absence.
pub(crate) async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
}
