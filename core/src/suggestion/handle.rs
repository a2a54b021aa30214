//! Client-facing handles onto a running engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use super::channel::{SubscriberId, SuggestionUpdate};
use super::debug::{DebugEvent, DebugTap};
use super::engine::{Command, SuggestionList};
use super::proposal::Proposal;
use super::prototype::Suggestion;
use super::timeline::StoryInfo;
use crate::config::EngineConfig;
use crate::telemetry::EngineStats;
use crate::{AugurError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Selected,
    Dismissed,
}

/// What the user has typed into an Ask session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInput {
    pub text: String,
}

impl UserInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Producer callback invoked on every new Ask query.
#[async_trait]
pub trait AskHandler: Send + Sync {
    async fn ask(&self, input: UserInput) -> Vec<Proposal>;
}

/// Cloneable handle to a running [`SuggestionEngine`](super::SuggestionEngine).
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Command>,
    next_subscriber: Arc<AtomicU64>,
    config: Arc<EngineConfig>,
}

impl EngineHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Command>, config: EngineConfig) -> Self {
        Self {
            tx,
            next_subscriber: Arc::new(AtomicU64::new(1)),
            config: Arc::new(config),
        }
    }

    pub(crate) fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| AugurError::EngineStopped)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| AugurError::EngineStopped)
    }

    fn subscriber_id(&self) -> SubscriberId {
        self.next_subscriber.fetch_add(1, Ordering::Relaxed)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Bind a producer namespace. Several bindings may share a URL; the
    /// producer's proposals go away when the last one is dropped.
    pub fn register_publisher(
        &self,
        component_url: impl Into<String>,
    ) -> Result<ProposalPublisher> {
        let component_url = component_url.into();
        self.send(Command::BindPublisher {
            component_url: component_url.clone(),
        })?;
        Ok(ProposalPublisher {
            component_url,
            engine: self.clone(),
        })
    }

    /// Subscribe to Next with `window` (the configured default when `None`).
    pub fn subscribe_to_next(
        &self,
        window: Option<usize>,
    ) -> Result<(NextController, mpsc::Receiver<SuggestionUpdate>)> {
        let id = self.subscriber_id();
        let (tx, rx) = mpsc::channel(self.config.listener_buffer);
        self.send(Command::SubscribeToNext {
            id,
            window: window.unwrap_or(self.config.next_window),
            tx,
        })?;
        Ok((
            NextController {
                id,
                engine: self.clone(),
            },
            rx,
        ))
    }

    /// Open an Ask session. The window starts at 0.
    pub fn initiate_ask(&self) -> Result<(AskController, mpsc::Receiver<SuggestionUpdate>)> {
        let id = self.subscriber_id();
        let (tx, rx) = mpsc::channel(self.config.listener_buffer);
        self.send(Command::InitiateAsk { id, tx })?;
        Ok((
            AskController {
                id,
                engine: self.clone(),
            },
            rx,
        ))
    }

    pub fn subscribe_to_interruptions(&self) -> Result<mpsc::Receiver<SuggestionUpdate>> {
        let (tx, rx) = mpsc::channel(self.config.listener_buffer);
        self.send(Command::SubscribeToInterruptions { tx })?;
        Ok(rx)
    }

    pub fn notify_interaction(
        &self,
        suggestion_id: impl Into<String>,
        interaction: InteractionType,
    ) -> Result<()> {
        self.send(Command::NotifyInteraction {
            suggestion_id: suggestion_id.into(),
            interaction,
        })
    }

    fn watch(&self, tap: DebugTap) -> Result<mpsc::Receiver<DebugEvent>> {
        let (tx, rx) = mpsc::channel(self.config.debug_buffer);
        self.send(Command::Watch { tap, tx })?;
        Ok(rx)
    }

    pub fn watch_next_proposals(&self) -> Result<mpsc::Receiver<DebugEvent>> {
        self.watch(DebugTap::Next)
    }

    pub fn watch_ask_proposals(&self) -> Result<mpsc::Receiver<DebugEvent>> {
        self.watch(DebugTap::Ask)
    }

    pub fn watch_interruption_proposals(&self) -> Result<mpsc::Receiver<DebugEvent>> {
        self.watch(DebugTap::Interruption)
    }

    pub fn notify_story_changed(&self, story: StoryInfo) -> Result<()> {
        self.send(Command::StoryChanged(story))
    }

    pub fn notify_story_deleted(&self, story_id: impl Into<String>) -> Result<()> {
        self.send(Command::StoryDeleted(story_id.into()))
    }

    /// Resolves once every command posted before it has been applied.
    pub async fn flush(&self) -> Result<()> {
        self.request(|reply| Command::Flush { reply }).await
    }

    pub async fn stats(&self) -> Result<EngineStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Visible Next suggestions in rank order
    pub async fn next_snapshot(&self) -> Result<Vec<Suggestion>> {
        self.request(|reply| Command::Snapshot {
            list: SuggestionList::Next,
            reply,
        })
        .await
    }

    /// Visible Ask suggestions in rank order
    pub async fn ask_snapshot(&self) -> Result<Vec<Suggestion>> {
        self.request(|reply| Command::Snapshot {
            list: SuggestionList::Ask,
            reply,
        })
        .await
    }

    pub async fn find_suggestion(
        &self,
        suggestion_id: impl Into<String>,
    ) -> Result<Option<Suggestion>> {
        let suggestion_id = suggestion_id.into();
        self.request(|reply| Command::FindSuggestion {
            suggestion_id,
            reply,
        })
        .await
    }

    /// Remove everything, drop all subscribers and stop the engine task.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

/// A producer's binding to the engine under one component URL.
pub struct ProposalPublisher {
    component_url: String,
    engine: EngineHandle,
}

impl ProposalPublisher {
    pub fn component_url(&self) -> &str {
        &self.component_url
    }

    pub fn propose(&self, proposal: Proposal) -> Result<()> {
        self.engine.send(Command::AddNextProposal {
            component_url: self.component_url.clone(),
            proposal,
        })
    }

    /// Parse and propose the external JSON form. Malformed payloads are
    /// logged and rejected without touching engine state.
    pub fn propose_json(&self, json: &str) -> Result<()> {
        let proposal = Proposal::from_json(json).map_err(|e| {
            warn!(component_url = %self.component_url, error = %e, "Rejecting malformed proposal");
            e
        })?;
        self.propose(proposal)
    }

    pub fn remove(&self, proposal_id: impl Into<String>) -> Result<()> {
        self.engine.send(Command::RemoveProposal {
            component_url: self.component_url.clone(),
            proposal_id: proposal_id.into(),
        })
    }

    pub fn register_ask_handler(&self, handler: Arc<dyn AskHandler>) -> Result<()> {
        self.engine.send(Command::RegisterAskHandler {
            component_url: self.component_url.clone(),
            handler,
        })
    }

    /// Close this binding. Same as dropping it.
    pub fn disconnect(self) {}
}

impl Drop for ProposalPublisher {
    fn drop(&mut self) {
        let _ = self.engine.send(Command::UnbindPublisher {
            component_url: std::mem::take(&mut self.component_url),
        });
    }
}

/// Window control for a Next subscription. Dropping it leaves delivery running;
/// dropping the receiver ends it.
pub struct NextController {
    id: SubscriberId,
    engine: EngineHandle,
}

impl NextController {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn set_result_count(&self, count: usize) -> Result<()> {
        self.engine.send(Command::SetResultCount {
            list: SuggestionList::Next,
            id: self.id,
            count,
        })
    }
}

/// Controls an Ask session.
pub struct AskController {
    id: SubscriberId,
    engine: EngineHandle,
}

impl AskController {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Dispatch a new query to the shared Ask list. An unchanged query is ignored.
    pub fn set_user_input(&self, input: UserInput) -> Result<()> {
        self.engine.send(Command::DispatchAsk { query: input.text })
    }

    pub fn set_result_count(&self, count: usize) -> Result<()> {
        self.engine.send(Command::SetResultCount {
            list: SuggestionList::Ask,
            id: self.id,
            count,
        })
    }
}
