//! Windowed fan-out of ranked suggestion lists.
//!
//! Every subscriber sees at most `window` suggestions: exactly the top of the
//! backing list. After each mutation a subscriber is sent the removes and adds
//! that bring its view back in line, so entries scrolling out of the window are
//! reported as removed even though they remain in the list. An entry whose rank
//! changed is re-sent, so the ranks a listener holds are always current.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::prototype::{RankedSuggestion, Suggestion};

pub type SubscriberId = u64;

/// Delta sent to a listener
#[derive(Debug, Clone, PartialEq)]
pub enum SuggestionUpdate {
    /// New visible suggestions, in rank order
    Add(Vec<Suggestion>),
    /// Suggestion with this uuid is no longer visible
    Remove(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    Closed,
    Lagging,
}

/// One listener with its own result cap.
#[derive(Debug)]
pub struct WindowedSubscriber {
    id: SubscriberId,
    window: usize,
    // uuids currently shown, in rank order
    visible: Vec<String>,
    // rank last delivered for each shown uuid
    ranks: HashMap<String, i64>,
    tx: mpsc::Sender<SuggestionUpdate>,
}

impl WindowedSubscriber {
    pub fn new(id: SubscriberId, window: usize, tx: mpsc::Sender<SuggestionUpdate>) -> Self {
        Self {
            id,
            window,
            visible: Vec::new(),
            ranks: HashMap::new(),
            tx,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn visible(&self) -> &[String] {
        &self.visible
    }

    fn send(&self, update: SuggestionUpdate) -> Result<(), Disconnect> {
        self.tx.try_send(update).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Disconnect::Lagging,
            mpsc::error::TrySendError::Closed(_) => Disconnect::Closed,
        })
    }

    /// Send whatever brings this listener's view to the top `window` of `ranked`.
    fn converge(&mut self, ranked: &[RankedSuggestion]) -> Result<(), Disconnect> {
        if self.tx.is_closed() {
            return Err(Disconnect::Closed);
        }

        let target = &ranked[..ranked.len().min(self.window)];
        // Shown before and still shown with the rank the listener holds
        let settled: HashSet<&str> = target
            .iter()
            .filter(|r| self.ranks.get(r.prototype.suggestion_id.as_str()) == Some(&r.rank))
            .map(|r| r.prototype.suggestion_id.as_str())
            .collect();

        // Settled entries must keep their relative order; from the first
        // disagreement on they are re-sent.
        let kept_current: Vec<&str> = self
            .visible
            .iter()
            .map(String::as_str)
            .filter(|id| settled.contains(id))
            .collect();
        let kept_target: Vec<&str> = target
            .iter()
            .map(|r| r.prototype.suggestion_id.as_str())
            .filter(|id| settled.contains(id))
            .collect();
        let diverge = kept_current
            .iter()
            .zip(&kept_target)
            .position(|(a, b)| a != b)
            .unwrap_or(kept_current.len());
        let reordered: HashSet<&str> = kept_current[diverge..].iter().copied().collect();

        let removes: Vec<String> = self
            .visible
            .iter()
            .filter(|id| !settled.contains(id.as_str()) || reordered.contains(id.as_str()))
            .cloned()
            .collect();
        let adds: Vec<Suggestion> = target
            .iter()
            .filter(|r| {
                let id = r.prototype.suggestion_id.as_str();
                !settled.contains(id) || reordered.contains(id)
            })
            .map(RankedSuggestion::to_suggestion)
            .collect();
        let next_visible: Vec<String> = target
            .iter()
            .map(|r| r.prototype.suggestion_id.clone())
            .collect();
        let next_ranks: HashMap<String, i64> = target
            .iter()
            .map(|r| (r.prototype.suggestion_id.clone(), r.rank))
            .collect();

        for id in removes {
            self.send(SuggestionUpdate::Remove(id))?;
        }
        if !adds.is_empty() {
            self.send(SuggestionUpdate::Add(adds))?;
        }
        self.visible = next_visible;
        self.ranks = next_ranks;
        Ok(())
    }
}

/// Set of windowed subscribers over one ranked list.
#[derive(Debug, Default)]
pub struct SuggestionChannel {
    subscribers: Vec<WindowedSubscriber>,
    dropped: u64,
}

impl SuggestionChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber and seed it with the current top of `ranked`.
    pub fn add_subscriber(
        &mut self,
        mut subscriber: WindowedSubscriber,
        ranked: &[RankedSuggestion],
    ) {
        match subscriber.converge(ranked) {
            Ok(()) => {
                debug!(subscriber = subscriber.id, window = subscriber.window, "Subscriber added");
                self.subscribers.push(subscriber);
            }
            Err(reason) => self.log_drop(subscriber.id, reason),
        }
    }

    /// Change a subscriber's window. Unknown ids are ignored.
    pub fn set_result_count(
        &mut self,
        id: SubscriberId,
        count: usize,
        ranked: &[RankedSuggestion],
    ) {
        let Some(pos) = self.subscribers.iter().position(|s| s.id == id) else {
            return;
        };
        self.subscribers[pos].window = count;
        if let Err(reason) = self.subscribers[pos].converge(ranked) {
            let sub = self.subscribers.remove(pos);
            self.log_drop(sub.id, reason);
        }
    }

    /// Bring every subscriber in line with `ranked`, dropping disconnected ones.
    pub fn dispatch(&mut self, ranked: &[RankedSuggestion]) {
        let mut subscribers = std::mem::take(&mut self.subscribers);
        subscribers.retain_mut(|sub| match sub.converge(ranked) {
            Ok(()) => true,
            Err(reason) => {
                self.log_drop(sub.id, reason);
                false
            }
        });
        self.subscribers = subscribers;
    }

    pub fn subscriber(&self, id: SubscriberId) -> Option<&WindowedSubscriber> {
        self.subscribers.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    /// Number of subscribers dropped since the last call
    pub fn take_dropped(&mut self) -> u64 {
        std::mem::take(&mut self.dropped)
    }

    fn log_drop(&mut self, id: SubscriberId, reason: Disconnect) {
        self.dropped += 1;
        match reason {
            Disconnect::Closed => debug!(subscriber = id, "Listener closed; dropping subscriber"),
            Disconnect::Lagging => {
                warn!(subscriber = id, "Listener queue full; dropping slow subscriber")
            }
        }
    }
}
