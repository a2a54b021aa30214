use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::proposal::{Proposal, SuggestionDisplay};

/// Engine-side record for an accepted proposal. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionPrototype {
    pub suggestion_id: String,
    pub source_url: String,
    pub timestamp: DateTime<Utc>,
    pub proposal: Proposal,
}

impl SuggestionPrototype {
    pub fn new(
        source_url: impl Into<String>,
        timestamp: DateTime<Utc>,
        proposal: Proposal,
    ) -> Self {
        Self {
            suggestion_id: uuid::Uuid::new_v4().to_string(),
            source_url: source_url.into(),
            timestamp,
            proposal,
        }
    }

    /// True when this prototype came from `proposal_id` of `component_url`
    pub fn is_proposal(&self, component_url: &str, proposal_id: &str) -> bool {
        self.source_url == component_url && self.proposal.id == proposal_id
    }

    /// Short human-readable description for logs
    pub fn short_str(&self) -> String {
        format!(
            "{}/{} \"{}\"",
            self.source_url, self.proposal.id, self.proposal.display.headline
        )
    }
}

#[derive(Debug, Clone)]
pub struct RankedSuggestion {
    pub prototype: Arc<SuggestionPrototype>,
    pub rank: i64,
}

impl RankedSuggestion {
    pub fn to_suggestion(&self) -> Suggestion {
        Suggestion {
            uuid: self.prototype.suggestion_id.clone(),
            rank: self.rank,
            display: self.prototype.proposal.display.clone(),
        }
    }
}

/// A suggestion as delivered to listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub uuid: String,
    pub rank: i64,
    pub display: SuggestionDisplay,
}
