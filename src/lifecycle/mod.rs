//! Cache lifecycle — installing a generation and retiring its predecessors.
//!
//! Deploying a new asset set is a two-step handover:
//!
//! 1. [`install`](Lifecycle::install) opens the configured generation and
//!    pre-loads the configured assets into it. Pre-load failures are logged
//!    and swallowed — an unreachable origin at startup must not block
//!    installation, it only means a thinner offline set.
//! 2. [`activate`](Lifecycle::activate) deletes every *other* generation in
//!    the store, so entries cached under old names cannot shadow the new
//!    deploy.
//!
//! Both steps are idempotent. Re-installing an already-installed lifecycle
//! returns the existing generation without re-fetching anything, and
//! re-activating when nothing is stale deletes nothing.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::http::Request;
use crate::store::{CacheStore, Generation, RequestKey, StoreError, StoredResponse};
use crate::transport::Transport;

/// Errors surfaced by lifecycle transitions.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// [`activate`](Lifecycle::activate) was called before a successful
    /// [`install`](Lifecycle::install).
    #[error("no cache generation is installed")]
    NotInstalled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

enum State {
    Uninstalled,
    Active(Generation),
}

/// Drives the install/activate handover for one configured generation name.
pub struct Lifecycle {
    store: Arc<dyn CacheStore>,
    transport: Arc<dyn Transport>,
    generation_name: String,
    precache: Vec<String>,
    state: RwLock<State>,
}

impl Lifecycle {
    /// Creates an uninstalled lifecycle for `generation_name`.
    pub fn new(
        store: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
        generation_name: impl Into<String>,
        precache: Vec<String>,
    ) -> Self {
        Self {
            store,
            transport,
            generation_name: generation_name.into(),
            precache,
            state: RwLock::new(State::Uninstalled),
        }
    }

    /// Opens the configured generation and pre-loads the configured assets.
    ///
    /// Idempotent: once installed, further calls return the same generation
    /// without touching the network. Concurrent calls serialize; exactly one
    /// performs the pre-load.
    ///
    /// # Errors
    ///
    /// Fails only when the generation itself cannot be opened. Pre-load
    /// failures never fail the install.
    pub async fn install(&self) -> Result<Generation, LifecycleError> {
        let mut state = self.state.write().await;
        if let State::Active(generation) = &*state {
            return Ok(generation.clone());
        }

        let generation = self.store.open(&self.generation_name).await?;
        info!(
            generation = %generation,
            assets = self.precache.len(),
            "installing cache generation"
        );

        for asset in &self.precache {
            self.preload(&generation, asset).await;
        }

        *state = State::Active(generation.clone());
        Ok(generation)
    }

    /// Fetches one pre-load asset and stores it. Every failure is swallowed.
    async fn preload(&self, generation: &Generation, asset: &str) {
        let request = Request::get(asset);
        let key = RequestKey::of(&request);

        match self.transport.fetch(request).await {
            Ok(response) if response.status().is_success() => {
                let snapshot = StoredResponse::snapshot(&response);
                match self.store.put(generation, key, snapshot).await {
                    Ok(()) => debug!(asset = %asset, "precached"),
                    Err(error) => {
                        warn!(asset = %asset, error = %error, "failed to store precache asset");
                    }
                }
            }
            Ok(response) => {
                warn!(
                    asset = %asset,
                    status = response.status().as_u16(),
                    "precache fetch returned an error status, skipping"
                );
            }
            Err(error) => {
                warn!(asset = %asset, error = %error, "precache fetch failed, skipping");
            }
        }
    }

    /// Deletes every generation other than the installed one.
    ///
    /// A generation that refuses to delete is logged and left behind; the
    /// remaining deletions still run. Idempotent — activating with nothing
    /// stale is a no-op.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::NotInstalled`] before a successful install, or the
    /// store error when the generation listing itself fails.
    pub async fn activate(&self) -> Result<Generation, LifecycleError> {
        let current = self.current().await.ok_or(LifecycleError::NotInstalled)?;

        for generation in self.store.list().await? {
            if generation == current {
                continue;
            }
            match self.store.delete(&generation).await {
                Ok(true) => info!(stale = %generation, kept = %current, "retired cache generation"),
                Ok(false) => {}
                Err(error) => {
                    warn!(stale = %generation, error = %error, "failed to retire generation");
                }
            }
        }

        Ok(current)
    }

    /// Returns the installed generation, or `None` before install.
    pub async fn current(&self) -> Option<Generation> {
        match &*self.state.read().await {
            State::Active(generation) => Some(generation.clone()),
            State::Uninstalled => None,
        }
    }
}
