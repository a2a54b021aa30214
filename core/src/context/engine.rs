use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use super::repository::ContextRepository;
use super::types::{
    ContextEntry, ContextId, ContextMetadata, ContextQuery, ContextSelector, ContextUpdate,
    ContextValue, ContextValueType,
};
use crate::{AugurError, Result};

/// Shared handle to the context repository.
#[derive(Clone, Default)]
pub struct ContextEngine {
    repository: Arc<RwLock<ContextRepository>>,
}

impl ContextEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_value(&self, value: ContextValue) -> ContextId {
        self.repository.write().await.add(value)
    }

    pub async fn update_value(&self, id: &str, value: ContextValue) -> bool {
        self.repository.write().await.update(id, value)
    }

    pub async fn remove_value(&self, id: &str) -> Option<ContextValue> {
        self.repository.write().await.remove(id)
    }

    pub async fn get(&self, id: &str) -> Option<ContextValue> {
        self.repository.read().await.get(id).cloned()
    }

    pub async fn query(&self, selector: &ContextSelector) -> Vec<ContextEntry> {
        self.repository.read().await.query(selector)
    }

    /// Watch a set of selectors. The receiver gets the current result first.
    pub async fn watch(
        &self,
        query: ContextQuery,
        buffer: usize,
    ) -> (u64, mpsc::Receiver<ContextUpdate>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let id = self.repository.write().await.watch(query, tx);
        (id, rx)
    }

    pub async fn unwatch(&self, watcher_id: u64) {
        self.repository.write().await.unwatch(watcher_id);
    }

    /// A publisher whose labels are namespaced by `source_url`.
    pub fn publisher(&self, source_url: impl Into<String>) -> ContextPublisher {
        ContextPublisher {
            engine: self.clone(),
            source_url: source_url.into(),
            published: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

/// Producer-side entry point for context signals.
#[derive(Clone)]
pub struct ContextPublisher {
    engine: ContextEngine,
    source_url: String,
    // label -> id of the value last published under it
    published: Arc<RwLock<HashMap<String, ContextId>>>,
}

impl ContextPublisher {
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Publish `json_value` under `label`, replacing what this publisher last
    /// published there. Malformed JSON is logged and dropped.
    pub async fn publish(&self, label: &str, json_value: &str) -> Result<ContextId> {
        let content: Value = serde_json::from_str(json_value).map_err(|e| {
            warn!(source = %self.source_url, label, error = %e, "Dropping malformed context value");
            AugurError::MalformedContext(format!("{label}: {e}"))
        })?;

        let value = ContextValue::new(
            ContextValueType::Entity,
            content.clone(),
            metadata_for(label, &content),
        );

        let mut published = self.published.write().await;
        if let Some(id) = published.get(label) {
            if self.engine.update_value(id, value.clone()).await {
                debug!(source = %self.source_url, label, id = %id, "Updated context value");
                return Ok(id.clone());
            }
        }
        let id = self.engine.add_value(value).await;
        debug!(source = %self.source_url, label, id = %id, "Published context value");
        published.insert(label.to_string(), id.clone());
        Ok(id)
    }

    /// Remove the value published under `label`, if any.
    pub async fn retract(&self, label: &str) -> bool {
        let Some(id) = self.published.write().await.remove(label) else {
            return false;
        };
        self.engine.remove_value(&id).await.is_some()
    }
}

fn metadata_for(label: &str, content: &Value) -> ContextMetadata {
    let mut meta = ContextMetadata::new().with("topic", label);
    match content.get("@type") {
        Some(Value::String(t)) => meta.push("type", t.clone()),
        Some(Value::Array(types)) => {
            for t in types.iter().filter_map(Value::as_str) {
                meta.push("type", t);
            }
        }
        _ => {}
    }
    meta
}
