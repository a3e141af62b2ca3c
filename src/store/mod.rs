//! Uniform access to the hosted realtime database.
//!
//! The database is a single JSON tree addressed by slash-separated paths.
//! Collections used by the app live directly under the root.

pub mod firebase;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde_json::{Map, Value};

use crate::error::StoreError;

pub use firebase::FirebaseStore;
pub use memory::MemoryStore;

/// Invoked with the latest value at a subscribed path (`None` once deleted)
pub type ChangeCallback = Arc<dyn Fn(Option<Value>) + Send + Sync>;

/// Top-level collections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Users,
    Property,
    Transactions,
    PropertyRequests,
}

impl Collection {
    pub fn path(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Property => "property",
            Collection::Transactions => "transactions",
            Collection::PropertyRequests => "propertyRequests",
        }
    }

    pub fn child(&self, id: &str) -> String {
        format!("{}/{}", self.path(), id)
    }
}

/// Precomputed revenue scalar, used when there are no transactions
pub const REVENUE_PATH: &str = "revenue";
/// Optional precomputed admin statistics node
pub const STATISTICS_PATH: &str = "statistics";

/// Common trait for record store backends
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Value at `path`, `None` when nothing is stored there
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Replaces the value at `path`. Writing null deletes.
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Multi-path update relative to `path`, applied atomically.
    ///
    /// Keys may contain slashes; null values delete.
    async fn update(&self, path: &str, changes: Map<String, Value>) -> Result<(), StoreError>;

    /// Writes `value` under a newly generated child key of `path`
    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError>;

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.set(path, Value::Null).await
    }

    /// Calls `on_change` with the current value and again after every change
    /// until the returned handle is dropped or unsubscribed.
    async fn subscribe(
        &self,
        path: &str,
        on_change: ChangeCallback,
    ) -> Result<Subscription, StoreError>;

    /// Get the name of the backend
    fn backend_name(&self) -> &'static str;
}

/// Handle for an active subscription. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Splits a path into segments, rejecting characters the database forbids
pub fn split_path(path: &str) -> Result<Vec<&str>, StoreError> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let forbidden = ['.', '#', '$', '[', ']'];

    if segments.iter().any(|s| s.contains(&forbidden[..])) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }

    Ok(segments)
}

/// Joins a base path and a relative child path
pub fn join_path(base: &str, child: &str) -> String {
    let base = base.trim_matches('/');
    let child = child.trim_matches('/');
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{child}"),
    }
}

/// Reads a whole collection as `(key, record)` pairs in store order.
///
/// Arrays (which the database returns for dense integer keys) are read with
/// their indices as keys, skipping holes. Anything else reads as empty.
pub async fn fetch_collection(
    store: &dyn RecordStore,
    path: &str,
) -> Result<Vec<(String, Value)>, StoreError> {
    Ok(collection_entries(store.get(path).await?))
}

pub fn collection_entries(value: Option<Value>) -> Vec<(String, Value)> {
    match value {
        Some(Value::Object(map)) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}

const PUSH_CHARS: &[u8] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Generates a chronologically sortable child key in the database's push-id format
pub fn push_id() -> String {
    let mut now = Utc::now().timestamp_millis().max(0) as u64;
    let mut stamp = [0u8; 8];
    for slot in stamp.iter_mut().rev() {
        *slot = PUSH_CHARS[(now % 64) as usize];
        now /= 64;
    }

    let mut rng = rand::thread_rng();
    let mut id: String = stamp.iter().map(|&b| b as char).collect();
    id.extend((0..12).map(|_| PUSH_CHARS[rng.gen_range(0..64)] as char));
    id
}
