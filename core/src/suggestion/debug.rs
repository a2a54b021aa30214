//! Read-only observability taps over engine state.
//!
//! Delivery is best-effort: a tap whose queue is closed or full is dropped and
//! never holds up the engine.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::handle::InteractionType;
use super::proposal::SuggestionDisplay;
use super::prototype::{RankedSuggestion, SuggestionPrototype};
use super::ranked::RankedSuggestions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalSummary {
    pub suggestion_id: String,
    pub component_url: String,
    pub proposal_id: String,
    pub display: SuggestionDisplay,
}

impl From<&SuggestionPrototype> for ProposalSummary {
    fn from(prototype: &SuggestionPrototype) -> Self {
        Self {
            suggestion_id: prototype.suggestion_id.clone(),
            component_url: prototype.source_url.clone(),
            proposal_id: prototype.proposal.id.clone(),
            display: prototype.proposal.display.clone(),
        }
    }
}

impl From<&RankedSuggestion> for ProposalSummary {
    fn from(ranked: &RankedSuggestion) -> Self {
        Self::from(ranked.prototype.as_ref())
    }
}

fn summarize(list: &RankedSuggestions) -> Vec<ProposalSummary> {
    list.suggestions().iter().map(ProposalSummary::from).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum DebugEvent {
    /// Full Next list after a change, in rank order
    NextUpdate(Vec<ProposalSummary>),
    /// A new Ask query was dispatched; proposals are the merged list at that point
    AskStart {
        query: String,
        proposals: Vec<ProposalSummary>,
    },
    /// An interaction was reported; `proposal` is `None` for unknown ids
    Interaction {
        interaction: InteractionType,
        proposal: Option<ProposalSummary>,
    },
    Interrupt(ProposalSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugTap {
    Next,
    Ask,
    Interruption,
}

type TapSender = mpsc::Sender<DebugEvent>;

#[derive(Debug, Default)]
pub struct DebugTaps {
    next: Vec<TapSender>,
    ask: Vec<TapSender>,
    interruption: Vec<TapSender>,
    // replayed to new Next watchers
    cached_next: Option<Vec<ProposalSummary>>,
}

impl DebugTaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&mut self, tap: DebugTap, tx: TapSender) {
        match tap {
            DebugTap::Next => {
                if let Some(cached) = &self.cached_next {
                    if tx.try_send(DebugEvent::NextUpdate(cached.clone())).is_err() {
                        return;
                    }
                }
                self.next.push(tx);
            }
            DebugTap::Ask => self.ask.push(tx),
            DebugTap::Interruption => self.interruption.push(tx),
        }
    }

    pub fn on_next_update(&mut self, next: &RankedSuggestions) {
        let proposals = summarize(next);
        broadcast(&mut self.next, DebugEvent::NextUpdate(proposals.clone()));
        self.cached_next = Some(proposals);
    }

    pub fn on_ask_start(&mut self, query: &str, ask: &RankedSuggestions) {
        if self.ask.is_empty() {
            return;
        }
        let event = DebugEvent::AskStart {
            query: query.to_string(),
            proposals: summarize(ask),
        };
        broadcast(&mut self.ask, event);
    }

    pub fn on_interaction(
        &mut self,
        interaction: InteractionType,
        proposal: Option<ProposalSummary>,
    ) {
        broadcast(
            &mut self.ask,
            DebugEvent::Interaction {
                interaction,
                proposal,
            },
        );
    }

    pub fn on_interrupt(&mut self, prototype: &SuggestionPrototype) {
        broadcast(
            &mut self.interruption,
            DebugEvent::Interrupt(ProposalSummary::from(prototype)),
        );
    }

    pub fn watcher_count(&self) -> usize {
        self.next.len() + self.ask.len() + self.interruption.len()
    }

    pub fn clear(&mut self) {
        self.next.clear();
        self.ask.clear();
        self.interruption.clear();
    }
}

fn broadcast(watchers: &mut Vec<TapSender>, event: DebugEvent) {
    watchers.retain(|tx| match tx.try_send(event.clone()) {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "Dropping debug watcher");
            false
        }
    });
}
