// Logging setup and engine counters
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `default_filter`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Snapshot of engine counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub proposals_added: u64,
    pub proposals_removed: u64,
    pub suggestions_filtered: u64,
    pub asks_dispatched: u64,
    pub stale_ask_replies: u64,
    pub ask_timeouts: u64,
    pub interactions: u64,
    pub actions_executed: u64,
    pub subscribers_dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    proposals_added: AtomicU64,
    proposals_removed: AtomicU64,
    suggestions_filtered: AtomicU64,
    asks_dispatched: AtomicU64,
    stale_ask_replies: AtomicU64,
    ask_timeouts: AtomicU64,
    interactions: AtomicU64,
    actions_executed: AtomicU64,
    subscribers_dropped: AtomicU64,
}

/// Shared counter set; clones record into the same counters.
#[derive(Debug, Clone, Default)]
pub struct StatsRecorder {
    counters: Arc<Counters>,
}

macro_rules! counter {
    ($name:ident, $field:ident) => {
        pub fn $name(&self, n: u64) {
            self.counters.$field.fetch_add(n, Ordering::Relaxed);
        }
    };
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(proposal_added, proposals_added);
    counter!(proposal_removed, proposals_removed);
    counter!(suggestion_filtered, suggestions_filtered);
    counter!(ask_dispatched, asks_dispatched);
    counter!(stale_ask_reply, stale_ask_replies);
    counter!(ask_timeout, ask_timeouts);
    counter!(interaction, interactions);
    counter!(action_executed, actions_executed);
    counter!(subscriber_dropped, subscribers_dropped);

    pub fn snapshot(&self) -> EngineStats {
        let c = &self.counters;
        EngineStats {
            proposals_added: c.proposals_added.load(Ordering::Relaxed),
            proposals_removed: c.proposals_removed.load(Ordering::Relaxed),
            suggestions_filtered: c.suggestions_filtered.load(Ordering::Relaxed),
            asks_dispatched: c.asks_dispatched.load(Ordering::Relaxed),
            stale_ask_replies: c.stale_ask_replies.load(Ordering::Relaxed),
            ask_timeouts: c.ask_timeouts.load(Ordering::Relaxed),
            interactions: c.interactions.load(Ordering::Relaxed),
            actions_executed: c.actions_executed.load(Ordering::Relaxed),
            subscribers_dropped: c.subscribers_dropped.load(Ordering::Relaxed),
        }
    }

    /// Print counters to log
    pub fn print_stats(&self) {
        let s = self.snapshot();
        info!("=== Suggestion engine ===");
        info!("Proposals added/removed: {}/{}", s.proposals_added, s.proposals_removed);
        info!("Filtered: {}", s.suggestions_filtered);
        info!(
            "Asks dispatched: {} (stale replies: {}, timeouts: {})",
            s.asks_dispatched, s.stale_ask_replies, s.ask_timeouts
        );
        info!("Interactions: {} (actions: {})", s.interactions, s.actions_executed);
        info!("Subscribers dropped: {}", s.subscribers_dropped);
    }
}
