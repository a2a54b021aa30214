//! Context value store kept in sync with the inverted index.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::index::ContextIndex;
use super::types::{
    ContextEntry, ContextId, ContextQuery, ContextSelector, ContextUpdate, ContextValue,
};

struct Watcher {
    id: u64,
    query: ContextQuery,
    last: Option<ContextUpdate>,
    tx: mpsc::Sender<ContextUpdate>,
}

/// Stores context values, indexes their metadata and notifies watchers.
#[derive(Default)]
pub struct ContextRepository {
    values: HashMap<ContextId, ContextValue>,
    index: ContextIndex,
    watchers: Vec<Watcher>,
    next_value: u64,
    next_watcher: u64,
}

impl ContextRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: ContextValue) -> ContextId {
        self.next_value += 1;
        // zero-padded so lexical order is insertion order
        let id = format!("{:010}", self.next_value);
        self.index.add(&id, value.value_type, &value.meta);
        self.values.insert(id.clone(), value);
        self.notify();
        id
    }

    /// Replace a stored value. Returns false for unknown ids.
    pub fn update(&mut self, id: &str, value: ContextValue) -> bool {
        let Some(old) = self.values.get_mut(id) else {
            return false;
        };
        self.index.remove(id, old.value_type, &old.meta);
        self.index.add(id, value.value_type, &value.meta);
        *old = value;
        self.notify();
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<ContextValue> {
        let old = self.values.remove(id)?;
        self.index.remove(id, old.value_type, &old.meta);
        self.notify();
        Some(old)
    }

    pub fn get(&self, id: &str) -> Option<&ContextValue> {
        self.values.get(id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Matching values in id order
    pub fn query(&self, selector: &ContextSelector) -> Vec<ContextEntry> {
        self.index
            .query(selector.value_type, &selector.meta)
            .into_iter()
            .filter_map(|id| {
                self.values.get(&id).map(|value| ContextEntry {
                    id,
                    value: value.clone(),
                })
            })
            .collect()
    }

    pub fn evaluate(&self, query: &ContextQuery) -> ContextUpdate {
        let values = query
            .selectors
            .iter()
            .map(|(name, selector)| (name.clone(), self.query(selector)))
            .collect();
        ContextUpdate { values }
    }

    /// Register a watcher. It receives the current result immediately and
    /// again whenever a mutation changes it.
    pub fn watch(&mut self, query: ContextQuery, tx: mpsc::Sender<ContextUpdate>) -> u64 {
        self.next_watcher += 1;
        let id = self.next_watcher;
        self.watchers.push(Watcher {
            id,
            query,
            last: None,
            tx,
        });
        self.notify();
        id
    }

    pub fn unwatch(&mut self, watcher_id: u64) {
        self.watchers.retain(|w| w.id != watcher_id);
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    fn notify(&mut self) {
        let mut watchers = std::mem::take(&mut self.watchers);
        watchers.retain_mut(|w| {
            if w.tx.is_closed() {
                debug!(watcher = w.id, "Context watcher closed");
                return false;
            }
            let update = self.evaluate(&w.query);
            if w.last.as_ref() == Some(&update) {
                return true;
            }
            match w.tx.try_send(update.clone()) {
                Ok(()) => {
                    w.last = Some(update);
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(watcher = w.id, "Context watcher queue full; dropping slow watcher");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(watcher = w.id, "Context watcher closed");
                    false
                }
            }
        });
        self.watchers = watchers;
    }
}
