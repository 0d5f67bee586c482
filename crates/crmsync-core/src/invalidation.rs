// ── Cache invalidation bridge ──
//
// Turns `data_update` notices into invalidations of previously fetched
// query results. The entity → cache-key mapping is a static table;
// entities missing from it are ignored so the server can introduce new
// types without breaking older clients.

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::model::DataUpdate;

const INVALIDATION_CHANNEL_CAPACITY: usize = 256;

/// Derived views every mapped entity change also invalidates.
const SHARED_KEYS: &[&str] = &["dashboard"];

/// Entity tag → cached collections. The first collection also namespaces item keys.
const ENTITY_CACHE_KEYS: &[(&str, &[&str])] = &[
    ("lead", &["leads"]),
    ("contact", &["contacts"]),
    ("company", &["companies"]),
    ("deal", &["deals", "pipeline"]),
    ("task", &["tasks"]),
    ("activity", &["activities"]),
    ("note", &["notes"]),
    ("user", &["users"]),
];

/// Identifies one cached query result, e.g. `leads` or `leads/42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    /// A whole cached collection.
    pub fn collection(name: &str) -> Self {
        Self(vec![name.to_owned()])
    }

    /// A single cached record inside a collection.
    pub fn item(collection: &str, id: &str) -> Self {
        Self(vec![collection.to_owned(), id.to_owned()])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// The application's query cache, as seen from the sync layer.
pub trait QueryCache: Send + Sync {
    fn invalidate(&self, key: &CacheKey);
}

/// Collections cached for `entity`, if it is a known type.
pub fn cache_keys_for(entity: &str) -> Option<&'static [&'static str]> {
    ENTITY_CACHE_KEYS
        .iter()
        .find(|(name, _)| *name == entity)
        .map(|(_, keys)| *keys)
}

pub struct CacheInvalidationBridge {
    events: broadcast::Sender<CacheKey>,
    cache: Option<Arc<dyn QueryCache>>,
}

impl CacheInvalidationBridge {
    pub(crate) fn new(cache: Option<Arc<dyn QueryCache>>) -> Self {
        let (events, _) = broadcast::channel(INVALIDATION_CHANNEL_CAPACITY);
        Self { events, cache }
    }

    /// Every invalidated key, for consumers that refetch on their own.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheKey> {
        self.events.subscribe()
    }

    /// Invalidate everything `update` affects. Returns the keys touched,
    /// empty for unknown entity types.
    pub fn apply(&self, update: &DataUpdate) -> Vec<CacheKey> {
        let Some(collections) = cache_keys_for(&update.entity) else {
            trace!(entity = %update.entity, "no cache mapping for entity, ignoring");
            return Vec::new();
        };

        let mut keys: Vec<CacheKey> = collections
            .iter()
            .chain(SHARED_KEYS)
            .map(|name| CacheKey::collection(name))
            .collect();
        if let (Some(id), Some(primary)) = (update.id.as_deref(), collections.first()) {
            keys.push(CacheKey::item(primary, id));
        }

        for key in &keys {
            if let Some(cache) = &self.cache {
                cache.invalidate(key);
            }
            // Ignore send errors -- just means nobody is listening right now
            let _ = self.events.send(key.clone());
        }

        debug!(
            entity = %update.entity,
            action = ?update.action,
            count = keys.len(),
            "cache invalidated"
        );
        keys
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::model::DataAction;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingCache(Mutex<Vec<String>>);

    impl QueryCache for RecordingCache {
        fn invalidate(&self, key: &CacheKey) {
            self.0.lock().unwrap().push(key.to_string());
        }
    }

    fn update(entity: &str, id: Option<&str>) -> DataUpdate {
        DataUpdate {
            entity: entity.into(),
            id: id.map(String::from),
            action: DataAction::Updated,
        }
    }

    #[test]
    fn collection_update_invalidates_mapped_keys() {
        let cache = Arc::new(RecordingCache::default());
        let bridge = CacheInvalidationBridge::new(Some(cache.clone()));

        bridge.apply(&update("lead", None));
        assert_eq!(*cache.0.lock().unwrap(), vec!["leads", "dashboard"]);
    }

    #[test]
    fn item_update_also_invalidates_the_record() {
        let bridge = CacheInvalidationBridge::new(None);
        let keys = bridge.apply(&update("deal", Some("42")));
        let shown: Vec<String> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(shown, vec!["deals", "pipeline", "dashboard", "deals/42"]);
    }

    #[test]
    fn unknown_entities_are_ignored() {
        let cache = Arc::new(RecordingCache::default());
        let bridge = CacheInvalidationBridge::new(Some(cache.clone()));
        assert!(bridge.apply(&update("invoice", Some("1"))).is_empty());
        assert!(cache.0.lock().unwrap().is_empty());
    }

    #[test]
    fn subscribers_receive_invalidated_keys() {
        let bridge = CacheInvalidationBridge::new(None);
        let mut rx = bridge.subscribe();
        bridge.apply(&update("task", Some("9")));

        assert_eq!(rx.try_recv().unwrap(), CacheKey::collection("tasks"));
        assert_eq!(rx.try_recv().unwrap(), CacheKey::collection("dashboard"));
        assert_eq!(rx.try_recv().unwrap(), CacheKey::item("tasks", "9"));
    }
}
