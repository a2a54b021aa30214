use std::sync::Arc;

use tracing::debug;

use super::channel::{SubscriberId, SuggestionChannel, WindowedSubscriber};
use super::prototype::{RankedSuggestion, SuggestionPrototype};
use super::ranking::RankingFunction;

/// The authoritative sorted list for one ranking regime.
///
/// Every mutation re-ranks and stably re-sorts the whole list, then pushes the
/// result to the channel's subscribers. Entries with equal rank keep the order
/// they had before the sort; a newly added entry starts at the end.
pub struct RankedSuggestions {
    ranking: Arc<dyn RankingFunction>,
    channel: SuggestionChannel,
    suggestions: Vec<RankedSuggestion>,
}

fn visible_prefix<'a>(
    suggestions: &'a [RankedSuggestion],
    ranking: &dyn RankingFunction,
) -> &'a [RankedSuggestion] {
    let n = suggestions
        .iter()
        .take_while(|r| ranking.is_visible(r.rank))
        .count();
    &suggestions[..n]
}

impl RankedSuggestions {
    pub fn new(ranking: Arc<dyn RankingFunction>) -> Self {
        Self {
            ranking,
            channel: SuggestionChannel::new(),
            suggestions: Vec::new(),
        }
    }

    /// Swap the ranking function and re-sort. Membership is unchanged.
    pub fn update_ranking_function(&mut self, ranking: Arc<dyn RankingFunction>) {
        debug!(ranking = ranking.name(), "Updating ranking function");
        self.ranking = ranking;
        self.commit();
    }

    /// Insert `prototype`, replacing any entry for the same proposal identity.
    /// Returns the replaced prototype.
    pub fn add_suggestion(
        &mut self,
        prototype: Arc<SuggestionPrototype>,
    ) -> Option<Arc<SuggestionPrototype>> {
        let replaced = self.insert(prototype);
        self.commit();
        replaced
    }

    /// Insert several prototypes with a single re-sort and dispatch.
    pub fn add_suggestions<I>(&mut self, prototypes: I)
    where
        I: IntoIterator<Item = Arc<SuggestionPrototype>>,
    {
        for prototype in prototypes {
            self.insert(prototype);
        }
        self.commit();
    }

    /// Clear the list, install `ranking` and insert `prototypes`, as a single
    /// mutation. Subscribers get one batch of deltas; entries whose position
    /// and rank survive are not re-sent.
    pub fn reset<I>(&mut self, ranking: Arc<dyn RankingFunction>, prototypes: I)
    where
        I: IntoIterator<Item = Arc<SuggestionPrototype>>,
    {
        self.suggestions.clear();
        self.ranking = ranking;
        for prototype in prototypes {
            self.insert(prototype);
        }
        self.commit();
    }

    /// Removing an unknown id is a no-op.
    pub fn remove_suggestion(&mut self, suggestion_id: &str) -> Option<Arc<SuggestionPrototype>> {
        self.remove_matching(|p| p.suggestion_id == suggestion_id)
    }

    pub fn remove_proposal(
        &mut self,
        component_url: &str,
        proposal_id: &str,
    ) -> Option<Arc<SuggestionPrototype>> {
        self.remove_matching(|p| p.is_proposal(component_url, proposal_id))
    }

    /// Remove every proposal from `component_url`.
    pub fn remove_source(&mut self, component_url: &str) -> Vec<Arc<SuggestionPrototype>> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.suggestions)
            .into_iter()
            .partition(|r| r.prototype.source_url == component_url);
        self.suggestions = kept;
        if !removed.is_empty() {
            self.commit();
        }
        removed.into_iter().map(|r| r.prototype).collect()
    }

    pub fn remove_all(&mut self) {
        if self.suggestions.is_empty() {
            return;
        }
        self.suggestions.clear();
        self.commit();
    }

    pub fn get_suggestion(&self, suggestion_id: &str) -> Option<&RankedSuggestion> {
        self.suggestions
            .iter()
            .find(|r| r.prototype.suggestion_id == suggestion_id)
    }

    pub fn get_proposal(
        &self,
        component_url: &str,
        proposal_id: &str,
    ) -> Option<&RankedSuggestion> {
        self.suggestions
            .iter()
            .find(|r| r.prototype.is_proposal(component_url, proposal_id))
    }

    pub fn suggestions(&self) -> &[RankedSuggestion] {
        &self.suggestions
    }

    /// Entries shown to windowed subscribers (a prefix of [`Self::suggestions`])
    pub fn visible(&self) -> &[RankedSuggestion] {
        visible_prefix(&self.suggestions, self.ranking.as_ref())
    }

    pub fn len(&self) -> usize {
        self.suggestions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty()
    }

    pub fn subscribe(&mut self, subscriber: WindowedSubscriber) {
        let visible = visible_prefix(&self.suggestions, self.ranking.as_ref());
        self.channel.add_subscriber(subscriber, visible);
    }

    pub fn set_result_count(&mut self, subscriber: SubscriberId, count: usize) {
        let visible = visible_prefix(&self.suggestions, self.ranking.as_ref());
        self.channel.set_result_count(subscriber, count, visible);
    }

    pub fn channel(&self) -> &SuggestionChannel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut SuggestionChannel {
        &mut self.channel
    }

    fn insert(&mut self, prototype: Arc<SuggestionPrototype>) -> Option<Arc<SuggestionPrototype>> {
        let replaced = self
            .suggestions
            .iter()
            .position(|r| {
                r.prototype
                    .is_proposal(&prototype.source_url, &prototype.proposal.id)
            })
            .map(|pos| self.suggestions.remove(pos).prototype);
        self.suggestions.push(RankedSuggestion { prototype, rank: 0 });
        replaced
    }

    fn remove_matching<F>(&mut self, matches: F) -> Option<Arc<SuggestionPrototype>>
    where
        F: Fn(&SuggestionPrototype) -> bool,
    {
        let pos = self.suggestions.iter().position(|r| matches(&r.prototype))?;
        let removed = self.suggestions.remove(pos);
        self.commit();
        Some(removed.prototype)
    }

    // Re-rank, stable sort, push to subscribers.
    fn commit(&mut self) {
        for entry in &mut self.suggestions {
            entry.rank = self.ranking.rank(&entry.prototype);
        }
        self.suggestions.sort_by_key(|r| r.rank);

        let visible = visible_prefix(&self.suggestions, self.ranking.as_ref());
        self.channel.dispatch(visible);
    }
}
