//! Context engine
//!
//! Producers publish context values (JSON content plus key/value metadata);
//! readers query or watch them through selectors answered by an inverted index.
//!
//! - **Types**: values, metadata, selectors and updates
//! - **Index**: posting sets keyed on encoded `(type, field, value)` triples
//! - **Repository**: value store that keeps the index and watchers in sync
//! - **Engine**: shared async handle and per-producer publishers

pub mod engine;
pub mod index;
pub mod repository;
pub mod types;

pub use engine::{ContextEngine, ContextPublisher};
pub use index::{encode_metadata_and_type, ContextIndex};
pub use repository::ContextRepository;
pub use types::{
    ContextEntry, ContextId, ContextMetadata, ContextQuery, ContextSelector, ContextUpdate,
    ContextValue, ContextValueType,
};
