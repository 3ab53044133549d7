use crate::{Error, EvictionQuery, ItemResult, SearchBackend};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Holds indexed documents in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    indices: HashMap<String, Vec<Value>>,
    unavailable: Option<String>,
    reject: Option<fn(&Value) -> bool>,
    bulk_requests: usize,
}

// === impl MemoryBackend ===

impl MemoryBackend {
    pub fn documents(&self, index: &str) -> Vec<Value> {
        self.state
            .lock()
            .indices
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Stores a document without going through the indexing path.
    pub fn insert(&self, index: &str, doc: Value) {
        self.state
            .lock()
            .indices
            .entry(index.to_string())
            .or_default()
            .push(doc);
    }

    /// Fails every request with `reason` until cleared.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        self.state.lock().unavailable = reason.map(Into::into);
    }

    /// Rejects documents in bulk requests that match `f`.
    pub fn reject_when(&self, f: fn(&Value) -> bool) {
        self.state.lock().reject = Some(f);
    }

    pub fn bulk_requests(&self) -> usize {
        self.state.lock().bulk_requests
    }

    fn check(&self) -> Result<(), Error> {
        match &self.state.lock().unavailable {
            Some(reason) => Err(Error::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl SearchBackend for MemoryBackend {
    async fn info(&self) -> Result<Value, Error> {
        self.check()?;
        Ok(json!({"version": {"number": "8.13.0"}}))
    }

    async fn cluster_health(&self) -> Result<Value, Error> {
        self.check()?;
        Ok(json!({"status": "green"}))
    }

    async fn index(&self, index: &str, doc: Value) -> Result<(), Error> {
        self.check()?;
        self.insert(index, doc);
        Ok(())
    }

    async fn bulk(&self, index: &str, docs: Vec<Value>) -> Result<Vec<ItemResult>, Error> {
        self.check()?;
        let mut state = self.state.lock();
        state.bulk_requests += 1;
        let reject = state.reject;
        let stored = state.indices.entry(index.to_string()).or_default();
        Ok(docs
            .into_iter()
            .map(|doc| {
                if reject.is_some_and(|f| f(&doc)) {
                    return Err("document rejected".to_string());
                }
                stored.push(doc);
                Ok(())
            })
            .collect())
    }

    async fn delete_stale(&self, index: &str, query: &EvictionQuery) -> Result<u64, Error> {
        self.check()?;
        let mut state = self.state.lock();
        let Some(docs) = state.indices.get_mut(index) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|doc| !query.matches(doc));
        Ok((before - docs.len()) as u64)
    }
}
