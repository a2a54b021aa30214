// Shared helpers for engine integration tests
#![allow(dead_code)]

use std::sync::Arc;

use augur_core::suggestion::{AskHandler, DebugEvent, UserInput};
use augur_core::telemetry::EngineStats;
use augur_core::{
    EngineConfig, EngineHandle, Proposal, ProposalPublisher, Result, Suggestion,
    SuggestionDisplay, SuggestionEngine, SuggestionUpdate,
};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(2);

pub fn test_config() -> EngineConfig {
    EngineConfig {
        listener_buffer: 256,
        debug_buffer: 64,
        next_window: 0,
        ask_handler_timeout_ms: 0,
        discard_stale_ask_replies: true,
        show_unmatched_in_ask: false,
        filter_existing_stories: true,
        max_action_expansions: 64,
    }
}

pub fn start_engine() -> EngineHandle {
    start_engine_with(test_config())
}

pub fn start_engine_with(config: EngineConfig) -> EngineHandle {
    augur_core::telemetry::init_tracing("warn");
    SuggestionEngine::new(config).start()
}

/// Drains a listener receiver into a rank-ordered view.
pub struct TestListener {
    rx: mpsc::Receiver<SuggestionUpdate>,
    suggestions: Vec<Suggestion>,
    updates: usize,
}

impl TestListener {
    pub fn new(rx: mpsc::Receiver<SuggestionUpdate>) -> Self {
        Self {
            rx,
            suggestions: Vec::new(),
            updates: 0,
        }
    }

    fn apply(&mut self, update: SuggestionUpdate) {
        self.updates += 1;
        match update {
            SuggestionUpdate::Add(added) => {
                for s in added {
                    let pos = self
                        .suggestions
                        .iter()
                        .position(|existing| existing.rank > s.rank)
                        .unwrap_or(self.suggestions.len());
                    self.suggestions.insert(pos, s);
                }
            }
            SuggestionUpdate::Remove(uuid) => self.suggestions.retain(|s| s.uuid != uuid),
        }
    }

    /// Apply every update already queued.
    pub fn drain(&mut self) {
        while let Ok(update) = self.rx.try_recv() {
            self.apply(update);
        }
    }

    /// Apply updates until `done` holds or the wait times out.
    pub async fn wait_until(&mut self, done: impl Fn(&[Suggestion]) -> bool) -> bool {
        self.drain();
        while !done(&self.suggestions) {
            match timeout(WAIT, self.rx.recv()).await {
                Ok(Some(update)) => self.apply(update),
                _ => return false,
            }
        }
        true
    }

    pub fn count(&mut self) -> usize {
        self.drain();
        self.suggestions.len()
    }

    pub fn suggestions(&mut self) -> &[Suggestion] {
        self.drain();
        &self.suggestions
    }

    pub fn headlines(&mut self) -> Vec<String> {
        self.suggestions()
            .iter()
            .map(|s| s.display.headline.clone())
            .collect()
    }

    pub fn only_suggestion(&mut self) -> Suggestion {
        self.drain();
        assert_eq!(self.suggestions.len(), 1, "expected exactly one suggestion");
        self.suggestions[0].clone()
    }

    /// Number of updates received so far
    pub fn update_count(&mut self) -> usize {
        self.drain();
        self.updates
    }
}

/// Producer that proposes plain headline suggestions.
pub struct Proposinator {
    publisher: ProposalPublisher,
}

impl Proposinator {
    pub fn new(engine: &EngineHandle, component_url: &str) -> Result<Self> {
        Ok(Self {
            publisher: engine.register_publisher(component_url)?,
        })
    }

    pub fn propose(&self, id: &str, headline: &str) -> Result<()> {
        self.publisher
            .propose(Proposal::new(id, SuggestionDisplay::headline(headline)))
    }

    pub fn propose_proposal(&self, proposal: Proposal) -> Result<()> {
        self.publisher.propose(proposal)
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.publisher.remove(id)
    }

    pub fn register_ask_handler(&self, handler: Arc<dyn AskHandler>) -> Result<()> {
        self.publisher.register_ask_handler(handler)
    }

    pub fn publisher(&self) -> &ProposalPublisher {
        &self.publisher
    }

    pub fn into_publisher(self) -> ProposalPublisher {
        self.publisher
    }
}

pub fn headline_proposal(id: &str, headline: &str) -> Proposal {
    Proposal::new(id, SuggestionDisplay::headline(headline))
}

/// Ask handler answering every query with a fixed list.
pub struct FixedAskHandler {
    proposals: Vec<Proposal>,
}

impl FixedAskHandler {
    pub fn new(proposals: Vec<Proposal>) -> Arc<Self> {
        Arc::new(Self { proposals })
    }
}

#[async_trait::async_trait]
impl AskHandler for FixedAskHandler {
    async fn ask(&self, _input: UserInput) -> Vec<Proposal> {
        self.proposals.clone()
    }
}

/// Poll the Ask snapshot until `done` holds or the wait times out.
pub async fn wait_for_ask(
    engine: &EngineHandle,
    done: impl Fn(&[Suggestion]) -> bool,
) -> Vec<Suggestion> {
    let deadline = Instant::now() + WAIT;
    loop {
        let snapshot = engine.ask_snapshot().await.unwrap_or_default();
        if done(&snapshot) || Instant::now() >= deadline {
            return snapshot;
        }
        sleep(Duration::from_millis(5)).await;
    }
}

/// Poll engine counters until `done` holds or the wait times out.
pub async fn wait_for_stats(
    engine: &EngineHandle,
    done: impl Fn(&EngineStats) -> bool,
) -> EngineStats {
    let deadline = Instant::now() + WAIT;
    loop {
        let stats = engine.stats().await.unwrap_or_default();
        if done(&stats) || Instant::now() >= deadline {
            return stats;
        }
        sleep(Duration::from_millis(5)).await;
    }
}

pub fn headlines(suggestions: &[Suggestion]) -> Vec<&str> {
    suggestions.iter().map(|s| s.display.headline.as_str()).collect()
}

pub fn drain_debug(rx: &mut mpsc::Receiver<DebugEvent>) -> Vec<DebugEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
