//! Proposal schema as consumed from producers.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{AugurError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    #[default]
    Person,
    Other,
}

/// How strongly a suggestion may claim the user's attention
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnoyanceType {
    #[default]
    None,
    Interrupt,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionDisplay {
    pub headline: String,
    pub subheadline: String,
    pub details: String,
    /// ARGB
    pub color: u32,
    pub icon_urls: Vec<String>,
    pub image_url: String,
    pub image_type: ImageType,
    pub annoyance: AnnoyanceType,
}

impl SuggestionDisplay {
    pub fn headline(headline: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateStory {
    pub module_id: String,
    #[serde(default)]
    pub initial_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusStory {
    pub story_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddModuleToStory {
    pub story_id: String,
    pub module_url: String,
    #[serde(default)]
    pub module_path: Vec<String>,
    #[serde(default)]
    pub link_name: String,
    #[serde(default)]
    pub initial_data: Option<String>,
}

/// Producer-supplied action that expands into further actions when run.
#[async_trait]
pub trait CustomAction: Send + Sync {
    async fn execute(&self) -> Result<Vec<Action>>;
}

/// Shared reference to a [`CustomAction`]; compares by identity.
#[derive(Clone)]
pub struct CustomActionRef(pub Arc<dyn CustomAction>);

impl CustomActionRef {
    pub fn new(action: impl CustomAction + 'static) -> Self {
        Self(Arc::new(action))
    }
}

impl fmt::Debug for CustomActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomAction(..)")
    }
}

impl PartialEq for CustomActionRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Side effect run when a suggestion is selected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    CreateStory(CreateStory),
    FocusStory(FocusStory),
    AddModuleToStory(AddModuleToStory),
    /// In-process only; never crosses a serialisation boundary
    #[serde(skip)]
    Custom(CustomActionRef),
}

impl Action {
    pub fn create_story(module_id: impl Into<String>) -> Self {
        Self::CreateStory(CreateStory {
            module_id: module_id.into(),
            initial_data: None,
        })
    }

    pub fn focus_story(story_id: impl Into<String>) -> Self {
        Self::FocusStory(FocusStory {
            story_id: story_id.into(),
        })
    }

    pub fn custom(action: impl CustomAction + 'static) -> Self {
        Self::Custom(CustomActionRef::new(action))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateStory(_) => "create_story",
            Self::FocusStory(_) => "focus_story",
            Self::AddModuleToStory(_) => "add_module_to_story",
            Self::Custom(_) => "custom",
        }
    }
}

/// A producer's offer of a suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    #[serde(default)]
    pub display: SuggestionDisplay,
    #[serde(default)]
    pub on_selected: Vec<Action>,
}

impl Proposal {
    pub fn new(id: impl Into<String>, display: SuggestionDisplay) -> Self {
        Self {
            id: id.into(),
            display,
            on_selected: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.on_selected.push(action);
        self
    }

    /// Parse the external JSON form.
    pub fn from_json(s: &str) -> Result<Self> {
        let proposal: Proposal =
            serde_json::from_str(s).map_err(|e| AugurError::MalformedProposal(e.to_string()))?;
        if proposal.id.is_empty() {
            return Err(AugurError::MalformedProposal("empty proposal id".into()));
        }
        Ok(proposal)
    }

    /// Module ids this proposal would launch as new stories
    pub fn created_story_urls(&self) -> impl Iterator<Item = &str> {
        self.on_selected.iter().filter_map(|a| match a {
            Action::CreateStory(c) => Some(c.module_id.as_str()),
            _ => None,
        })
    }
}
