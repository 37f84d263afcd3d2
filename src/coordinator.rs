//! Read-through, write-invalidate wrapper around the remote backend.
//!
//! GETs consult the resource cache first; writes always go to the network
//! and, on success, invalidate every key that could now be stale: the
//! written path (by prefix, so nested item entries go with it) and each
//! ancestor collection key. Forced refreshes are debounced so rapid
//! repeated triggers collapse into one network call, with earlier triggers
//! superseded rather than queued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, trace};

use crate::api::RemoteBackend;
use crate::cache::ResourceCache;
use crate::error::SyncError;

/// Rapid refresh triggers inside this window collapse into one call.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

pub struct FetchCoordinator<B: RemoteBackend> {
    backend: B,
    cache: Arc<ResourceCache>,
    loading: AtomicBool,
    last_error: Mutex<Option<String>>,
    /// Latest refresh ticket per path; a trigger that is no longer the
    /// newest when its debounce window elapses is superseded.
    refresh_tickets: Mutex<HashMap<String, u64>>,
}

impl<B: RemoteBackend> FetchCoordinator<B> {
    pub fn new(backend: B, cache: Arc<ResourceCache>) -> Self {
        Self {
            backend,
            cache,
            loading: AtomicBool::new(false),
            last_error: Mutex::new(None),
            refresh_tickets: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether a network call is currently outstanding.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Relaxed)
    }

    /// Message of the most recent failed call, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        match self.last_error.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Cached read: returns the stored response without a network
    /// round-trip when present, otherwise fetches and stores.
    pub async fn get(&self, path: &str) -> Result<Value, SyncError> {
        if let Some(hit) = self.cache.get(path) {
            trace!(path, "cache hit");
            return Ok(hit);
        }
        let value = self.dispatch(Method::GET, path, None).await?;
        self.cache.set(path, value.clone());
        Ok(value)
    }

    /// Mutating call: the cache is never consulted for writes. On success
    /// the affected keys are invalidated so the next read refetches.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, SyncError> {
        let value = self.dispatch(method, path, body).await?;
        self.invalidate_for_write(path);
        Ok(value)
    }

    /// Debounced forced re-fetch. Returns `Ok(None)` when this trigger was
    /// superseded by a newer one inside the debounce window (no network
    /// call is made for superseded triggers).
    pub async fn refresh(&self, path: &str) -> Result<Option<Value>, SyncError> {
        let ticket = {
            let mut tickets = match self.refresh_tickets.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let ticket = tickets.entry(path.to_string()).or_insert(0);
            *ticket += 1;
            *ticket
        };

        tokio::time::sleep(DEBOUNCE_WINDOW).await;

        let still_latest = {
            let tickets = match self.refresh_tickets.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            tickets.get(path) == Some(&ticket)
        };
        if !still_latest {
            debug!(path, "refresh superseded by a newer trigger");
            return Ok(None);
        }

        self.cache.invalidate(path);
        let value = self.dispatch(Method::GET, path, None).await?;
        // Last successful response by completion time wins.
        self.cache.set(path, value.clone());
        Ok(Some(value))
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, SyncError> {
        self.loading.store(true, Ordering::Relaxed);
        let result = self.backend.call(method, path, body).await;
        self.loading.store(false, Ordering::Relaxed);

        let mut last_error = match self.last_error.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match &result {
            Ok(_) => *last_error = None,
            Err(e) => *last_error = Some(e.to_string()),
        }
        result
    }

    fn invalidate_for_write(&self, path: &str) {
        self.cache.invalidate_prefix(path);
        for ancestor in ancestor_collections(path) {
            self.cache.invalidate(&ancestor);
        }
    }
}

/// Successive parent collection keys of a path, nearest first:
/// `/restaurant/3/orders/42/` yields `/restaurant/3/orders/`,
/// `/restaurant/3/`, `/restaurant/`.
fn ancestor_collections(path: &str) -> Vec<String> {
    let mut ancestors = Vec::new();
    let mut current = path.trim_end_matches('/');
    while let Some(cut) = current.rfind('/') {
        if cut == 0 {
            break;
        }
        current = &current[..cut];
        ancestors.push(format!("{current}/"));
    }
    ancestors
}
