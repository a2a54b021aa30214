//! Value types for the context engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Identifier of a stored context value
pub type ContextId = String;

/// Kind of entity a context value describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextValueType {
    Story,
    Module,
    Agent,
    Entity,
}

impl ContextValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Story => "story",
            Self::Module => "module",
            Self::Agent => "agent",
            Self::Entity => "entity",
        }
    }
}

/// Key/value metadata attached to a context value.
///
/// A field may carry several values (e.g. an entity with more than one `@type`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub fields: BTreeMap<String, Vec<String>>,
}

impl ContextMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style single value
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(field, value);
        self
    }

    pub fn push(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.entry(field.into()).or_default().push(value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.values().all(|v| v.is_empty())
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(|v| v.as_slice())
    }
}

/// A value held by the context repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextValue {
    pub value_type: ContextValueType,
    pub content: Value,
    pub meta: ContextMetadata,
}

impl ContextValue {
    pub fn new(value_type: ContextValueType, content: Value, meta: ContextMetadata) -> Self {
        Self {
            value_type,
            content,
            meta,
        }
    }
}

/// Matches values of one type whose metadata contains every given field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSelector {
    pub value_type: ContextValueType,
    pub meta: ContextMetadata,
}

impl ContextSelector {
    pub fn new(value_type: ContextValueType, meta: ContextMetadata) -> Self {
        Self { value_type, meta }
    }
}

/// Named selectors evaluated together for a watcher
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextQuery {
    pub selectors: BTreeMap<String, ContextSelector>,
}

impl ContextQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, selector: ContextSelector) -> Self {
        self.selectors.insert(name.into(), selector);
        self
    }
}

/// A matched value as delivered to watchers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub id: ContextId,
    pub value: ContextValue,
}

/// Result set per selector name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextUpdate {
    pub values: HashMap<String, Vec<ContextEntry>>,
}
