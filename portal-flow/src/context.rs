use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tracing::warn;

/// Shared state for one session's tasks.
///
/// Clones share both the key/value data and the request generation counter,
/// so a session loaded twice from in-memory storage observes the same facts.
/// A clone handed to a run also carries the generation that run belongs to;
/// that tag is never shared or serialized.
#[derive(Clone, Debug)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
    generation: Arc<AtomicU64>,
    run_generation: Option<u64>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            run_generation: None,
        }
    }

    /// Clone tagged with the generation of the run it is handed to
    pub fn for_run(&self, generation: u64) -> Self {
        Self {
            run_generation: Some(generation),
            ..self.clone()
        }
    }

    /// Generation of the run holding this clone, or the latest one outside a run
    pub fn run_generation(&self) -> u64 {
        self.run_generation.unwrap_or_else(|| self.generation())
    }

    /// Drop the run tag before the context is stored again
    pub fn detach(&mut self) {
        self.run_generation = None;
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Serialize) {
        self.set_sync(key, value);
    }

    pub fn set_sync(&self, key: impl Into<String>, value: impl Serialize) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                self.data.insert(key, value);
            }
            Err(e) => warn!(key = %key, error = %e, "Dropping context value that failed to serialize"),
        }
    }

    pub async fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_sync(key)
    }

    pub fn get_sync<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }

    /// Remove and decode a value in one step
    pub async fn take<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .remove(key)
            .and_then(|(_, v)| serde_json::from_value(v).ok())
    }

    pub async fn clear_keys(&self, keys: &[&str]) {
        for key in keys {
            self.data.remove(*key);
        }
    }

    /// Remove every key starting with `prefix`
    pub async fn clear_prefix(&self, prefix: &str) {
        self.data.retain(|key, _| !key.starts_with(prefix));
    }

    pub async fn clear(&self) {
        self.data.clear();
    }

    /// Generation of the most recent request issued against this context
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start a new request generation, superseding every older one
    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `generation` is still the latest issued
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Point-in-time copy of every stored value
    pub fn snapshot(&self) -> Map<String, Value> {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for Context {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Context {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        let context = Context::new();
        for (key, value) in map {
            context.data.insert(key, value);
        }
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_values_and_generation() {
        let context = Context::new();
        let clone = context.clone();

        context.set("employee", "00726281").await;
        let generation = clone.next_generation();

        assert_eq!(clone.get::<String>("employee").await.as_deref(), Some("00726281"));
        assert!(context.is_current(generation));

        context.next_generation();
        assert!(!clone.is_current(generation));
    }

    #[tokio::test]
    async fn take_removes_the_value() {
        let context = Context::new();
        context.set("event", 3u32).await;

        assert_eq!(context.take::<u32>("event").await, Some(3));
        assert!(!context.contains("event"));
    }

    #[tokio::test]
    async fn run_tag_stays_on_its_clone() {
        let context = Context::new();
        let generation = context.next_generation();
        let mut run = context.for_run(generation);

        context.next_generation();
        assert_eq!(run.run_generation(), generation);
        assert!(!run.is_current(run.run_generation()));
        assert_eq!(context.run_generation(), generation + 1);

        run.detach();
        assert_eq!(run.run_generation(), generation + 1);
    }

    #[tokio::test]
    async fn clear_prefix_leaves_other_keys() {
        let context = Context::new();
        context.set("event:1", "next").await;
        context.set("event:2", "back").await;
        context.set("draft", "kept").await;

        context.clear_prefix("event:").await;
        assert!(!context.contains("event:1"));
        assert!(!context.contains("event:2"));
        assert!(context.contains("draft"));
    }

    #[test]
    fn serializes_as_object_snapshot() {
        let context = Context::new();
        context.set_sync("amount", 150.0);

        let json = serde_json::to_value(&context).unwrap();
        assert_eq!(json["amount"], 150.0);

        let restored: Context = serde_json::from_value(json).unwrap();
        assert_eq!(restored.get_sync::<f64>("amount"), Some(150.0));
    }
}
