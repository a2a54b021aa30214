// Augur Core Library
// Suggestion ranking and delivery runtime

pub mod config;
pub mod context;
pub mod suggestion;
pub mod telemetry;

// Export core types
pub use config::EngineConfig;
pub use context::{ContextEngine, ContextIndex, ContextPublisher, ContextValueType};
pub use suggestion::{
    Action, AskController, AskHandler, EngineHandle, FocusProvider, InteractionType,
    NextController, Proposal, ProposalPublisher, RankedSuggestions, StoryProvider, Suggestion,
    SuggestionDisplay, SuggestionEngine, SuggestionUpdate, UserInput,
};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AugurError {
    #[error("Suggestion engine is not running")]
    EngineStopped,

    #[error("Malformed proposal: {0}")]
    MalformedProposal(String),

    #[error("Malformed context value: {0}")]
    MalformedContext(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}
pub type Result<T> = std::result::Result<T, AugurError>;
