use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, PoisonError, RwLock,
};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::{join_path, push_id, split_path, ChangeCallback, RecordStore, Subscription};
use crate::error::StoreError;

struct Listener {
    id: u64,
    path: Vec<String>,
    callback: ChangeCallback,
}

/// In-process JSON tree with realtime-database write semantics.
///
/// Null writes delete, empty objects are pruned, and a multi-path update is
/// applied under a single lock. Can be taken offline to simulate outages.
pub struct MemoryStore {
    root: RwLock<Value>,
    listeners: Arc<Mutex<Vec<Listener>>>,
    next_listener: AtomicU64,
    online: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_data(Value::Null)
    }

    /// Store seeded with an initial tree
    pub fn with_data(data: Value) -> Self {
        Self {
            root: RwLock::new(normalize(data)),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(0),
            online: AtomicBool::new(true),
        }
    }

    /// While offline every operation fails with `StoreError::Unavailable`
    #[cfg(test)]
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Copy of the whole tree
    #[cfg(test)]
    pub fn snapshot(&self) -> Value {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn ensure_online(&self, path: &str) -> Result<(), StoreError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable(path, "store is offline"))
        }
    }

    fn read_at(&self, segments: &[&str]) -> Option<Value> {
        let root = self.root.read().unwrap_or_else(PoisonError::into_inner);
        let mut node = &*root;
        for segment in segments {
            node = node.get(*segment)?;
        }
        if node.is_null() {
            None
        } else {
            Some(node.clone())
        }
    }

    /// Applies writes under one lock, then notifies affected listeners
    fn write_all(&self, writes: Vec<(Vec<String>, Value)>) {
        {
            let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
            for (segments, value) in &writes {
                write_at(&mut root, segments, normalize(value.clone()));
            }
        }

        let changed: Vec<&Vec<String>> = writes.iter().map(|(segments, _)| segments).collect();
        self.notify(&changed);
    }

    fn notify(&self, changed: &[&Vec<String>]) {
        let affected: Vec<(Vec<String>, ChangeCallback)> = {
            let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners
                .iter()
                .filter(|l| changed.iter().any(|c| overlaps(&l.path, c)))
                .map(|l| (l.path.clone(), Arc::clone(&l.callback)))
                .collect()
        };

        for (path, callback) in affected {
            let segments: Vec<&str> = path.iter().map(String::as_str).collect();
            callback(self.read_at(&segments));
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.ensure_online(path)?;
        let segments = split_path(path)?;
        Ok(self.read_at(&segments))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.ensure_online(path)?;
        let segments = owned(split_path(path)?);
        self.write_all(vec![(segments, value)]);
        Ok(())
    }

    async fn update(&self, path: &str, changes: Map<String, Value>) -> Result<(), StoreError> {
        self.ensure_online(path)?;
        let writes = changes
            .into_iter()
            .map(|(key, value)| {
                let full = join_path(path, &key);
                split_path(&full).map(|segments| (owned(segments), value))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.write_all(writes);
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        self.ensure_online(path)?;
        let key = push_id();
        self.set(&join_path(path, &key), value).await?;
        Ok(key)
    }

    async fn subscribe(
        &self,
        path: &str,
        on_change: ChangeCallback,
    ) -> Result<Subscription, StoreError> {
        self.ensure_online(path)?;
        let segments = split_path(path)?;
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);

        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Listener {
                id,
                path: owned(segments.clone()),
                callback: Arc::clone(&on_change),
            });
        debug!("Listener {id} attached to '{path}'");

        on_change(self.read_at(&segments));

        let listeners = Arc::clone(&self.listeners);
        Ok(Subscription::new(move || {
            listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|l| l.id != id);
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

fn owned(segments: Vec<&str>) -> Vec<String> {
    segments.into_iter().map(str::to_string).collect()
}

/// True when one path is an ancestor of (or equal to) the other
fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

/// Strips nulls and empty objects the way the hosted database does
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if cleaned.is_empty() {
                Value::Null
            } else {
                Value::Object(cleaned)
            }
        }
        other => other,
    }
}

fn write_at(node: &mut Value, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    if value.is_null() {
        if let Some(map) = node.as_object_mut() {
            if let Some(child) = map.get_mut(first) {
                write_at(child, rest, Value::Null);
                if rest.is_empty() || child.is_null() {
                    map.remove(first);
                }
            }
            if map.is_empty() {
                *node = Value::Null;
            }
        }
        return;
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Some(map) = node.as_object_mut() {
        let child = map.entry(first.clone()).or_insert(Value::Null);
        write_at(child, rest, value);
    }
}
