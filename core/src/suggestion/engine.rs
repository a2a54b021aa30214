//! The suggestion engine actor.
//!
//! All state lives in [`EngineState`], owned by one tokio task. Handles post
//! [`Command`]s onto an unbounded queue; the task applies them strictly in
//! order, so there is no locking around the ranked lists.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::actions::{ActionExecutor, FocusProvider, StoryProvider};
use super::channel::{SubscriberId, SuggestionUpdate, WindowedSubscriber};
use super::debug::{DebugEvent, DebugTap, DebugTaps, ProposalSummary};
use super::handle::{AskHandler, EngineHandle, InteractionType, UserInput};
use super::proposal::{AnnoyanceType, Proposal};
use super::prototype::{RankedSuggestion, Suggestion, SuggestionPrototype};
use super::ranked::RankedSuggestions;
use super::ranking::{RecencyRanker, SubstringRanker};
use super::timeline::{StoryInfo, StoryTimeline};
use crate::config::EngineConfig;
use crate::telemetry::{EngineStats, StatsRecorder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionList {
    Next,
    Ask,
}

pub(crate) enum Command {
    BindPublisher {
        component_url: String,
    },
    UnbindPublisher {
        component_url: String,
    },
    AddNextProposal {
        component_url: String,
        proposal: Proposal,
    },
    RemoveProposal {
        component_url: String,
        proposal_id: String,
    },
    RegisterAskHandler {
        component_url: String,
        handler: Arc<dyn AskHandler>,
    },
    AskReply {
        generation: u64,
        component_url: String,
        proposals: Vec<Proposal>,
    },
    DispatchAsk {
        query: String,
    },
    SubscribeToNext {
        id: SubscriberId,
        window: usize,
        tx: mpsc::Sender<SuggestionUpdate>,
    },
    InitiateAsk {
        id: SubscriberId,
        tx: mpsc::Sender<SuggestionUpdate>,
    },
    SetResultCount {
        list: SuggestionList,
        id: SubscriberId,
        count: usize,
    },
    SubscribeToInterruptions {
        tx: mpsc::Sender<SuggestionUpdate>,
    },
    NotifyInteraction {
        suggestion_id: String,
        interaction: InteractionType,
    },
    Watch {
        tap: DebugTap,
        tx: mpsc::Sender<DebugEvent>,
    },
    StoryChanged(StoryInfo),
    StoryDeleted(String),
    Snapshot {
        list: SuggestionList,
        reply: oneshot::Sender<Vec<Suggestion>>,
    },
    FindSuggestion {
        suggestion_id: String,
        reply: oneshot::Sender<Option<Suggestion>>,
    },
    Stats {
        reply: oneshot::Sender<EngineStats>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Builder for a running engine.
pub struct SuggestionEngine {
    config: EngineConfig,
    story: Option<Arc<dyn StoryProvider>>,
    focus: Option<Arc<dyn FocusProvider>>,
}

impl SuggestionEngine {
    /// Queue capacities below 1 are raised to 1.
    pub fn new(mut config: EngineConfig) -> Self {
        config.listener_buffer = config.listener_buffer.max(1);
        config.debug_buffer = config.debug_buffer.max(1);
        Self {
            config,
            story: None,
            focus: None,
        }
    }

    pub fn with_story_provider(mut self, story: Arc<dyn StoryProvider>) -> Self {
        self.story = Some(story);
        self
    }

    pub fn with_focus_provider(mut self, focus: Arc<dyn FocusProvider>) -> Self {
        self.focus = Some(focus);
        self
    }

    /// Spawn the engine task. Must be called within a tokio runtime.
    pub fn start(self) -> EngineHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = StatsRecorder::new();
        let executor = ActionExecutor::new(
            self.story,
            self.focus,
            stats.clone(),
            self.config.max_action_expansions,
        );
        let state = EngineState::new(self.config.clone(), executor, stats, tx.downgrade());
        tokio::spawn(state.run(rx));
        info!(
            listener_buffer = self.config.listener_buffer,
            discard_stale_ask_replies = self.config.discard_stale_ask_replies,
            "Suggestion engine started"
        );
        EngineHandle::new(tx, self.config)
    }
}

struct AskRegistration {
    component_url: String,
    handler: Arc<dyn AskHandler>,
}

struct EngineState {
    config: EngineConfig,
    next: RankedSuggestions,
    ask: RankedSuggestions,
    // component url -> live publisher bindings
    publishers: HashMap<String, usize>,
    ask_handlers: Vec<AskRegistration>,
    interruption_listeners: Vec<mpsc::Sender<SuggestionUpdate>>,
    // bumped on every Ask dispatch
    generation: u64,
    last_query: Option<String>,
    last_timestamp: Option<DateTime<Utc>>,
    timeline: StoryTimeline,
    taps: DebugTaps,
    executor: ActionExecutor,
    stats: StatsRecorder,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl EngineState {
    fn new(
        config: EngineConfig,
        executor: ActionExecutor,
        stats: StatsRecorder,
        commands: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        let ask_ranking = Arc::new(SubstringRanker::new("", config.show_unmatched_in_ask));
        Self {
            next: RankedSuggestions::new(Arc::new(RecencyRanker)),
            ask: RankedSuggestions::new(ask_ranking),
            publishers: HashMap::new(),
            ask_handlers: Vec::new(),
            interruption_listeners: Vec::new(),
            generation: 0,
            last_query: None,
            last_timestamp: None,
            timeline: StoryTimeline::new(),
            taps: DebugTaps::new(),
            executor,
            stats,
            commands,
            config,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            let stop = matches!(command, Command::Shutdown { .. });
            self.handle(command);
            self.collect_dropped();
            if stop {
                break;
            }
        }
        self.teardown();
        info!("Suggestion engine stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::BindPublisher { component_url } => {
                let bindings = self.publishers.entry(component_url.clone()).or_insert(0);
                *bindings += 1;
                debug!(component_url = %component_url, bindings = *bindings, "Publisher bound");
            }
            Command::UnbindPublisher { component_url } => self.unbind_publisher(component_url),
            Command::AddNextProposal {
                component_url,
                proposal,
            } => self.add_next_proposal(component_url, proposal),
            Command::RemoveProposal {
                component_url,
                proposal_id,
            } => self.remove_proposal(&component_url, &proposal_id),
            Command::RegisterAskHandler {
                component_url,
                handler,
            } => {
                debug!(component_url = %component_url, "Ask handler registered");
                self.ask_handlers.push(AskRegistration {
                    component_url,
                    handler,
                });
            }
            Command::AskReply {
                generation,
                component_url,
                proposals,
            } => self.on_ask_reply(generation, component_url, proposals),
            Command::DispatchAsk { query } => self.dispatch_ask(query),
            Command::SubscribeToNext { id, window, tx } => {
                self.next.subscribe(WindowedSubscriber::new(id, window, tx));
            }
            Command::InitiateAsk { id, tx } => {
                if self.last_query.is_none() {
                    self.dispatch_ask(String::new());
                }
                self.ask.subscribe(WindowedSubscriber::new(id, 0, tx));
            }
            Command::SetResultCount { list, id, count } => {
                self.list_mut(list).set_result_count(id, count);
            }
            Command::SubscribeToInterruptions { tx } => self.interruption_listeners.push(tx),
            Command::NotifyInteraction {
                suggestion_id,
                interaction,
            } => self.notify_interaction(suggestion_id, interaction),
            Command::Watch { tap, tx } => self.taps.watch(tap, tx),
            Command::StoryChanged(story) => {
                debug!(story_id = %story.id, url = %story.url, "Story changed");
                self.timeline.on_change(story);
            }
            Command::StoryDeleted(story_id) => {
                debug!(story_id = %story_id, "Story deleted");
                self.timeline.on_delete(&story_id);
            }
            Command::Snapshot { list, reply } => {
                let snapshot = self
                    .list(list)
                    .visible()
                    .iter()
                    .map(RankedSuggestion::to_suggestion)
                    .collect();
                let _ = reply.send(snapshot);
            }
            Command::FindSuggestion {
                suggestion_id,
                reply,
            } => {
                let found = self.find(&suggestion_id).map(RankedSuggestion::to_suggestion);
                let _ = reply.send(found);
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats.snapshot());
            }
            Command::Flush { reply } => {
                let _ = reply.send(());
            }
            Command::Shutdown { reply } => {
                self.teardown();
                let _ = reply.send(());
            }
        }
    }

    fn list(&self, list: SuggestionList) -> &RankedSuggestions {
        match list {
            SuggestionList::Next => &self.next,
            SuggestionList::Ask => &self.ask,
        }
    }

    fn list_mut(&mut self, list: SuggestionList) -> &mut RankedSuggestions {
        match list {
            SuggestionList::Next => &mut self.next,
            SuggestionList::Ask => &mut self.ask,
        }
    }

    fn find(&self, suggestion_id: &str) -> Option<&RankedSuggestion> {
        self.next
            .get_suggestion(suggestion_id)
            .or_else(|| self.ask.get_suggestion(suggestion_id))
    }

    fn ask_active(&self) -> bool {
        self.last_query.is_some()
    }

    // Strictly increasing per engine so recency never ties.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + chrono::Duration::nanoseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }

    fn create_prototype(
        &mut self,
        component_url: &str,
        proposal: Proposal,
    ) -> Arc<SuggestionPrototype> {
        let timestamp = self.next_timestamp();
        Arc::new(SuggestionPrototype::new(component_url, timestamp, proposal))
    }

    fn add_next_proposal(&mut self, component_url: String, proposal: Proposal) {
        if self.config.filter_existing_stories {
            let existing = proposal
                .created_story_urls()
                .find(|url| self.timeline.contains_url(url))
                .map(str::to_string);
            if let Some(url) = existing {
                info!(
                    component_url = %component_url,
                    proposal_id = %proposal.id,
                    story_url = %url,
                    "Filtering proposal for an existing story"
                );
                self.stats.suggestion_filtered(1);
                self.remove_proposal(&component_url, &proposal.id);
                return;
            }
        }

        let prototype = self.create_prototype(&component_url, proposal);
        debug!(proposal = %prototype.short_str(), "Adding Next proposal");
        self.stats.proposal_added(1);
        self.next.add_suggestion(prototype.clone());
        if self.ask_active() {
            self.ask.add_suggestion(prototype.clone());
        }
        self.taps.on_next_update(&self.next);

        if prototype.proposal.display.annoyance == AnnoyanceType::Interrupt {
            self.interrupt(&prototype);
        }
    }

    fn interrupt(&mut self, prototype: &Arc<SuggestionPrototype>) {
        info!(proposal = %prototype.short_str(), "Interrupting");
        let suggestion = match self.next.get_suggestion(&prototype.suggestion_id) {
            Some(ranked) => ranked.to_suggestion(),
            None => return,
        };
        let mut dropped = 0;
        self.interruption_listeners.retain(|tx| {
            match tx.try_send(SuggestionUpdate::Add(vec![suggestion.clone()])) {
                Ok(()) => true,
                Err(e) => {
                    debug!(error = %e, "Dropping interruption listener");
                    dropped += 1;
                    false
                }
            }
        });
        self.stats.subscriber_dropped(dropped);
        self.taps.on_interrupt(prototype);
    }

    fn remove_proposal(&mut self, component_url: &str, proposal_id: &str) {
        let from_next = self.next.remove_proposal(component_url, proposal_id);
        let from_ask = self.ask.remove_proposal(component_url, proposal_id);
        if from_next.is_none() && from_ask.is_none() {
            return;
        }
        debug!(component_url, proposal_id, "Removed proposal");
        self.stats.proposal_removed(1);
        if from_next.is_some() {
            self.taps.on_next_update(&self.next);
        }
    }

    fn unbind_publisher(&mut self, component_url: String) {
        let Some(bindings) = self.publishers.get_mut(&component_url) else {
            return;
        };
        *bindings -= 1;
        if *bindings > 0 {
            return;
        }
        self.publishers.remove(&component_url);

        let from_next = self.next.remove_source(&component_url);
        let from_ask = self.ask.remove_source(&component_url);
        self.ask_handlers.retain(|h| h.component_url != component_url);

        // An entry mirrored into both lists is one proposal
        let mut removed: Vec<&str> = from_next
            .iter()
            .chain(&from_ask)
            .map(|p| p.proposal.id.as_str())
            .collect();
        removed.sort_unstable();
        removed.dedup();
        info!(component_url = %component_url, removed = removed.len(), "Publisher disconnected");
        self.stats.proposal_removed(removed.len() as u64);
        if !from_next.is_empty() {
            self.taps.on_next_update(&self.next);
        }
    }

    #[tracing::instrument(skip(self))]
    fn dispatch_ask(&mut self, query: String) {
        let query = query.to_lowercase();
        if self.last_query.as_deref() == Some(query.as_str()) {
            debug!("Query unchanged; skipping dispatch");
            return;
        }
        self.generation += 1;
        self.last_query = Some(query.clone());
        self.stats.ask_dispatched(1);

        let ranking = Arc::new(SubstringRanker::new(&query, self.config.show_unmatched_in_ask));
        let fallback: Vec<_> = self
            .next
            .suggestions()
            .iter()
            .map(|r| r.prototype.clone())
            .collect();
        self.ask.reset(ranking, fallback);

        for registration in &self.ask_handlers {
            self.spawn_ask(registration, &query);
        }
        debug!(
            generation = self.generation,
            handlers = self.ask_handlers.len(),
            "Ask dispatched"
        );
        self.taps.on_ask_start(&query, &self.ask);
    }

    fn spawn_ask(&self, registration: &AskRegistration, query: &str) {
        let handler = registration.handler.clone();
        let component_url = registration.component_url.clone();
        let commands = self.commands.clone();
        let generation = self.generation;
        let timeout_ms = self.config.ask_handler_timeout_ms;
        let stats = self.stats.clone();
        let input = UserInput::new(query);

        tokio::spawn(async move {
            let proposals = if timeout_ms > 0 {
                let limit = Duration::from_millis(timeout_ms);
                match tokio::time::timeout(limit, handler.ask(input)).await {
                    Ok(proposals) => proposals,
                    Err(_) => {
                        warn!(component_url = %component_url, timeout_ms, "Ask handler timed out");
                        stats.ask_timeout(1);
                        return;
                    }
                }
            } else {
                handler.ask(input).await
            };

            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::AskReply {
                    generation,
                    component_url,
                    proposals,
                });
            }
        });
    }

    fn on_ask_reply(&mut self, generation: u64, component_url: String, proposals: Vec<Proposal>) {
        if generation != self.generation {
            if self.config.discard_stale_ask_replies {
                debug!(
                    component_url = %component_url,
                    generation,
                    current = self.generation,
                    "Discarding stale Ask reply"
                );
                self.stats.stale_ask_reply(1);
                return;
            }
            debug!(component_url = %component_url, generation, "Merging stale Ask reply");
        }
        if !self.publishers.contains_key(&component_url) {
            debug!(component_url = %component_url, "Ask reply from disconnected publisher");
            return;
        }

        let prototypes: Vec<_> = proposals
            .into_iter()
            .map(|p| self.create_prototype(&component_url, p))
            .collect();
        debug!(component_url = %component_url, count = prototypes.len(), "Adding Ask proposals");
        self.stats.proposal_added(prototypes.len() as u64);
        self.ask.add_suggestions(prototypes);
    }

    #[tracing::instrument(skip(self))]
    fn notify_interaction(&mut self, suggestion_id: String, interaction: InteractionType) {
        self.stats.interaction(1);
        let found = self.find(&suggestion_id).map(|r| r.prototype.clone());
        let detail = found
            .as_ref()
            .map(|p| p.short_str())
            .unwrap_or_else(|| "invalid".to_string());

        match interaction {
            InteractionType::Selected => {
                info!("Accepted suggestion {} ({})", suggestion_id, detail)
            }
            InteractionType::Dismissed => {
                info!("Dismissed suggestion {} ({})", suggestion_id, detail)
            }
        }
        self.taps
            .on_interaction(interaction, found.as_deref().map(ProposalSummary::from));

        if let (Some(prototype), InteractionType::Selected) = (found, interaction) {
            self.executor.spawn(
                prototype.proposal.on_selected.clone(),
                prototype.proposal.display.color,
            );
        }
    }

    fn collect_dropped(&mut self) {
        let dropped =
            self.next.channel_mut().take_dropped() + self.ask.channel_mut().take_dropped();
        if dropped > 0 {
            self.stats.subscriber_dropped(dropped);
        }
    }

    fn teardown(&mut self) {
        self.next.remove_all();
        self.ask.remove_all();
        self.next.channel_mut().clear();
        self.ask.channel_mut().clear();
        self.interruption_listeners.clear();
        self.ask_handlers.clear();
        self.publishers.clear();
        self.taps.clear();
    }
}
