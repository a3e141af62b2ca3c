//! Saved listings with a fixed time-to-live.
//!
//! A user's saved set lives in two sibling maps under `users/{uid}`:
//! `saved/{item} = true` and `timesaved/{item} = <epoch millis>`. Entries
//! expire a fixed time after saving. There is no background sweep: expired
//! or half-written entries are deleted when a read observes them.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    error::StoreError,
    models::parse_timestamp,
    store::{Collection, RecordStore},
};

/// Default validity window for a saved listing
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// State of one saved entry at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Expired,
    /// Saved flag without a usable save time (or a falsy flag). Fails closed.
    Partial,
}

/// A (user, item, saved-at) tuple read from the store
#[derive(Debug, Clone, PartialEq)]
pub struct SavedRelation {
    pub user_id: String,
    pub item_id: String,
    pub flagged: bool,
    pub saved_at: Option<DateTime<Utc>>,
}

impl SavedRelation {
    pub fn validity(&self, now: DateTime<Utc>, ttl: Duration) -> Validity {
        match (self.flagged, self.saved_at) {
            (true, Some(saved_at)) if now - saved_at < ttl => Validity::Valid,
            (true, Some(_)) => Validity::Expired,
            _ => Validity::Partial,
        }
    }
}

/// Manages the saved-listings relation for all users
#[derive(Clone)]
pub struct SavedItems {
    store: Arc<dyn RecordStore>,
    ttl: Duration,
}

impl SavedItems {
    pub fn new(store: Arc<dyn RecordStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Marks `item_id` saved now, flag and timestamp in one update
    pub async fn save(&self, user_id: &str, item_id: &str) -> Result<(), StoreError> {
        self.save_at(user_id, item_id, Utc::now()).await
    }

    pub async fn save_at(
        &self,
        user_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut changes = Map::new();
        changes.insert(format!("saved/{item_id}"), Value::Bool(true));
        changes.insert(
            format!("timesaved/{item_id}"),
            Value::from(now.timestamp_millis()),
        );

        self.store
            .update(&Collection::Users.child(user_id), changes)
            .await?;
        debug!("User {user_id} saved {item_id}");
        Ok(())
    }

    /// Clears both keys for `item_id` in one update
    pub async fn unsave(&self, user_id: &str, item_id: &str) -> Result<(), StoreError> {
        self.unsave_all(user_id, &[item_id.to_string()]).await
    }

    async fn unsave_all(&self, user_id: &str, item_ids: &[String]) -> Result<(), StoreError> {
        if item_ids.is_empty() {
            return Ok(());
        }

        let mut changes = Map::new();
        for item_id in item_ids {
            changes.insert(format!("saved/{item_id}"), Value::Null);
            changes.insert(format!("timesaved/{item_id}"), Value::Null);
        }

        self.store
            .update(&Collection::Users.child(user_id), changes)
            .await
    }

    /// Saves when not currently saved, otherwise unsaves. Returns the new state.
    pub async fn toggle(&self, user_id: &str, item_id: &str) -> Result<bool, StoreError> {
        let currently_saved = self.list_valid(user_id).await?.iter().any(|id| id == item_id);
        if currently_saved {
            self.unsave(user_id, item_id).await?;
        } else {
            self.save(user_id, item_id).await?;
        }
        Ok(!currently_saved)
    }

    /// Every entry of the `saved` map paired with its save time, in store order
    pub async fn relations(&self, user_id: &str) -> Result<Vec<SavedRelation>, StoreError> {
        let user_path = Collection::Users.child(user_id);
        let saved_path = format!("{user_path}/saved");
        let times_path = format!("{user_path}/timesaved");

        let (saved, times) =
            tokio::try_join!(self.store.get(&saved_path), self.store.get(&times_path))?;

        let Some(Value::Object(saved)) = saved else {
            return Ok(Vec::new());
        };
        let times = times.unwrap_or(Value::Null);

        Ok(saved
            .into_iter()
            .map(|(item_id, flag)| SavedRelation {
                user_id: user_id.to_string(),
                saved_at: times.get(&item_id).and_then(parse_timestamp),
                flagged: is_truthy(&flag),
                item_id,
            })
            .collect())
    }

    /// Items still within the TTL
    pub async fn list_valid(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        self.list_valid_at(user_id, Utc::now()).await
    }

    /// Valid items as of `now`. Expired and partial entries are deleted
    /// from both maps as a side effect and left out of the result.
    pub async fn list_valid_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        let mut valid = Vec::new();
        let mut evict = Vec::new();

        for relation in self.relations(user_id).await? {
            let validity = relation.validity(now, self.ttl);
            if validity != Validity::Valid {
                debug!("{validity:?} saved item {} for {}", relation.item_id, relation.user_id);
            }
            match validity {
                Validity::Valid => valid.push(relation.item_id),
                Validity::Expired | Validity::Partial => evict.push(relation.item_id),
            }
        }

        if !evict.is_empty() {
            info!("Evicting {} stale saved item(s) for user {user_id}", evict.len());
            if let Err(e) = self.unsave_all(user_id, &evict).await {
                // Still excluded; the next read retries the cleanup
                warn!("Failed to evict saved items for {user_id}: {e}");
            }
        }

        Ok(valid)
    }

    /// `list_valid` that degrades to an empty list when the store is down
    pub async fn list_valid_or_empty(&self, user_id: &str) -> Vec<String> {
        self.list_valid(user_id).await.unwrap_or_else(|e| {
            warn!("Could not load saved items for {user_id}: {e}");
            Vec::new()
        })
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    const HOUR: i64 = 60 * 60 * 1000;

    fn setup(data: Value) -> (Arc<MemoryStore>, SavedItems) {
        let store = Arc::new(MemoryStore::with_data(data));
        let saved = SavedItems::new(store.clone(), Duration::hours(DEFAULT_TTL_HOURS));
        (store, saved)
    }

    #[tokio::test]
    async fn save_writes_flag_and_time_together() {
        let (store, saved) = setup(Value::Null);
        saved.save_at("u1", "p1", at(5 * HOUR)).await.unwrap();

        assert_eq!(store.get("users/u1/saved/p1").await.unwrap(), Some(json!(true)));
        assert_eq!(
            store.get("users/u1/timesaved/p1").await.unwrap(),
            Some(json!(5 * HOUR))
        );
    }

    #[tokio::test]
    async fn save_then_unsave_leaves_no_residue() {
        let (store, saved) = setup(json!({"users": {"u1": {"name": "Mary"}}}));
        saved.save("u1", "p1").await.unwrap();
        saved.unsave("u1", "p1").await.unwrap();

        assert_eq!(store.get("users/u1/saved").await.unwrap(), None);
        assert_eq!(store.get("users/u1/timesaved").await.unwrap(), None);
        assert_eq!(store.get("users/u1/name").await.unwrap(), Some(json!("Mary")));
    }

    #[tokio::test]
    async fn expired_entries_are_excluded_and_deleted() {
        let now = 100 * HOUR;
        let (store, saved) = setup(json!({"users": {"u1": {
            "saved": {"fresh": true, "edge": true, "old": true},
            "timesaved": {"fresh": now - HOUR, "edge": now - 24 * HOUR, "old": now - 48 * HOUR}
        }}}));

        let valid = saved.list_valid_at("u1", at(now)).await.unwrap();
        assert_eq!(valid, vec!["fresh"]);

        let user = store.get("users/u1").await.unwrap().unwrap();
        assert_eq!(user["saved"], json!({"fresh": true}));
        assert_eq!(user["timesaved"], json!({"fresh": now - HOUR}));
    }

    #[tokio::test]
    async fn just_inside_the_window_is_valid() {
        let now = 100 * HOUR;
        let (_, saved) = setup(json!({"users": {"u1": {
            "saved": {"p1": true},
            "timesaved": {"p1": now - 24 * HOUR + 1}
        }}}));
        assert_eq!(saved.list_valid_at("u1", at(now)).await.unwrap(), vec!["p1"]);
    }

    #[tokio::test]
    async fn missing_save_time_fails_closed() {
        let (store, saved) = setup(json!({"users": {"u1": {
            "saved": {"orphan": true, "bad": true},
            "timesaved": {"bad": "not a time"}
        }}}));

        let valid = saved.list_valid_at("u1", at(HOUR)).await.unwrap();
        assert!(valid.is_empty());
        assert_eq!(store.get("users/u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn no_saved_map_is_empty() {
        let (_, saved) = setup(json!({"users": {"u1": {"timesaved": {"p1": 1}}}}));
        assert!(saved.list_valid("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn toggle_flips_state() {
        let (_, saved) = setup(Value::Null);
        assert!(saved.toggle("u1", "p1").await.unwrap());
        assert_eq!(saved.list_valid("u1").await.unwrap(), vec!["p1"]);
        assert!(!saved.toggle("u1", "p1").await.unwrap());
        assert!(saved.list_valid("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_store_degrades_to_empty() {
        let (store, saved) = setup(json!({"users": {"u1": {
            "saved": {"p1": true}, "timesaved": {"p1": Utc::now().timestamp_millis()}
        }}}));
        store.set_online(false);
        assert!(saved.list_valid("u1").await.is_err());
        assert!(saved.list_valid_or_empty("u1").await.is_empty());
    }
}
