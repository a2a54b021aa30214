//! Ranking functions for suggestion lists.
//!
//! Ranks are signed integers; lower sorts first. A rank depends only on the
//! prototype and the ranker, so ranks delivered to listeners stay comparable
//! across updates.

use chrono::{DateTime, Utc};

use super::prototype::SuggestionPrototype;

/// Scale applied to the primary substring key; the secondary key stays below it.
pub const SUBSTRING_SCALE: i64 = 1_000_000;

/// Texts longer than this are ranked as if they had this length.
pub const MAX_RANKED_TEXT_LEN: usize = 1 << 20;

/// Start of the rank space for entries that do not match the query.
/// Every substring rank is below `MAX_RANKED_TEXT_LEN * SUBSTRING_SCALE < 2^40`.
pub const NO_MATCH_BASE: i64 = 1 << 41;

/// 2200-01-01T00:00:00Z in nanoseconds since the Unix epoch. Recency ranks
/// count down towards it, so they are non-negative and
/// `NO_MATCH_BASE + recency` cannot overflow.
pub const RECENCY_HORIZON_NANOS: i64 = 7_258_118_400_000_000_000;

/// Strategy used by a ranked suggestion list.
pub trait RankingFunction: Send + Sync {
    fn name(&self) -> &str;

    fn rank(&self, prototype: &SuggestionPrototype) -> i64;

    /// Whether an entry with this rank is shown to windowed subscribers.
    /// Hidden ranks must sort after every visible rank.
    fn is_visible(&self, _rank: i64) -> bool {
        true
    }
}

/// Nanoseconds from `timestamp` to [`RECENCY_HORIZON_NANOS`]; more recent
/// ranks lower. Timestamps outside the representable range clamp to the ends.
pub fn rank_by_timestamp(timestamp: DateTime<Utc>) -> i64 {
    let nanos = timestamp
        .timestamp_nanos_opt()
        .unwrap_or(if timestamp.timestamp() < 0 { i64::MIN } else { i64::MAX });
    RECENCY_HORIZON_NANOS.saturating_sub(nanos).max(0)
}

/// Rank of `query` (already lower-cased, non-empty) within `text`, or `None`
/// when it does not occur.
///
/// Primary key: how much longer the text is than the query. Secondary key:
/// match position relative to text length.
pub fn rank_by_substring(text: &str, query: &str) -> Option<i64> {
    let text = text.to_lowercase();
    let pos = text.find(query)?;
    let len = text.len().max(1) as i64;
    let excess = (text.len() - query.len()).min(MAX_RANKED_TEXT_LEN) as i64;
    let minor = (pos as i64).saturating_mul(SUBSTRING_SCALE) / len;
    Some(excess * SUBSTRING_SCALE + minor)
}

/// Most-recent-first, used for Next.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecencyRanker;

impl RankingFunction for RecencyRanker {
    fn name(&self) -> &str {
        "RecencyRanker"
    }

    fn rank(&self, prototype: &SuggestionPrototype) -> i64 {
        rank_by_timestamp(prototype.timestamp)
    }
}

/// Substring relevance against the current query, used for Ask.
///
/// Entries matching in headline, subheadline or details rank by the best of the
/// three; the rest fall back to recency offset by [`NO_MATCH_BASE`].
#[derive(Debug, Clone)]
pub struct SubstringRanker {
    query: String,
    show_unmatched: bool,
}

impl SubstringRanker {
    pub fn new(query: &str, show_unmatched: bool) -> Self {
        Self {
            query: query.to_lowercase(),
            show_unmatched,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

impl RankingFunction for SubstringRanker {
    fn name(&self) -> &str {
        "SubstringRanker"
    }

    fn rank(&self, prototype: &SuggestionPrototype) -> i64 {
        let recency = rank_by_timestamp(prototype.timestamp);
        if self.query.is_empty() {
            return recency;
        }

        let display = &prototype.proposal.display;
        [&display.headline, &display.subheadline, &display.details]
            .into_iter()
            .filter_map(|text| rank_by_substring(text, &self.query))
            .min()
            .unwrap_or_else(|| NO_MATCH_BASE.saturating_add(recency))
    }

    fn is_visible(&self, rank: i64) -> bool {
        self.query.is_empty() || self.show_unmatched || rank < NO_MATCH_BASE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggestion::proposal::{Proposal, SuggestionDisplay};
    use chrono::{Duration, TimeZone};

    fn proto(headline: &str, age_ms: i64, now: DateTime<Utc>) -> SuggestionPrototype {
        SuggestionPrototype::new(
            "test://ranking",
            now - Duration::milliseconds(age_ms),
            Proposal::new(headline, SuggestionDisplay::headline(headline)),
        )
    }

    #[test]
    fn recency_prefers_newer() {
        let now = Utc::now();
        let old = proto("old", 100, now);
        let new = proto("new", 1, now);
        assert!(RecencyRanker.rank(&new) < RecencyRanker.rank(&old));
    }

    #[test]
    fn substring_orders_by_excess_then_position() {
        let now = Utc::now();
        let ranker = SubstringRanker::new("e-mail", false);
        let mut headlines = vec![
            "Reply to E-mail",
            "Compose E-mail",
            "E-mail Guests",
            "View E-mail",
        ];
        headlines.sort_by_key(|h| ranker.rank(&proto(h, 0, now)));
        assert_eq!(
            headlines,
            vec!["View E-mail", "E-mail Guests", "Compose E-mail", "Reply to E-mail"]
        );
    }

    #[test]
    fn earlier_match_wins_at_equal_excess() {
        let early = rank_by_substring("abcx", "x").unwrap();
        let front = rank_by_substring("xabc", "x").unwrap();
        assert!(front < early);
        assert_eq!(front / SUBSTRING_SCALE, early / SUBSTRING_SCALE);
    }

    #[test]
    fn no_match_sorts_after_any_match_and_is_hidden() {
        let now = Utc::now();
        let ranker = SubstringRanker::new("E", false);
        let matched = ranker.rank(&proto("a very long headline that eventually has an e", 0, now));
        let unmatched = ranker.rank(&proto("Music", 1_000_000, now));
        assert!(matched < unmatched);
        assert!(ranker.is_visible(matched));
        assert!(!ranker.is_visible(unmatched));
        assert!(SubstringRanker::new("E", true).is_visible(unmatched));
    }

    #[test]
    fn empty_query_is_recency() {
        let now = Utc::now();
        let ranker = SubstringRanker::new("", false);
        let p = proto("anything", 5, now);
        assert_eq!(ranker.rank(&p), RecencyRanker.rank(&p));
        assert!(ranker.is_visible(ranker.rank(&p)));
    }

    #[test]
    fn recency_rank_does_not_drift() {
        let now = Utc::now();
        let p = proto("stable", 10, now);
        let first = RecencyRanker.rank(&p);
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert_eq!(RecencyRanker.rank(&p), first);
        assert!(first > 0);
    }

    #[test]
    fn no_match_offset_stays_disjoint_for_old_entries() {
        let ancient = SuggestionPrototype::new(
            "test://ranking",
            Utc.timestamp_opt(0, 0).unwrap(),
            Proposal::new("old", SuggestionDisplay::headline("Music")),
        );
        let rank = SubstringRanker::new("zzz", false).rank(&ancient);
        assert!(rank >= NO_MATCH_BASE);
        assert!(rank < i64::MAX);
    }

    #[test]
    fn subheadline_and_details_are_searched() {
        let now = Utc::now();
        let mut p = proto("Headline", 0, now);
        p.proposal.display.details = "zebra".into();
        let ranker = SubstringRanker::new("zeb", false);
        assert!(ranker.rank(&p) < NO_MATCH_BASE);
    }
}
