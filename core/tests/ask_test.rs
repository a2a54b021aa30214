// Ask session tests
//
// The Ask list is rebuilt on every new query: Next acts as a fallback and
// registered Ask handlers contribute query-specific proposals.

mod common;

use std::sync::Arc;

use augur_core::suggestion::{AskHandler, DebugEvent, UserInput};
use augur_core::{InteractionType, Proposal, Result};
use common::{
    drain_debug, headline_proposal, headlines, start_engine, start_engine_with, test_config,
    wait_for_ask, wait_for_stats, FixedAskHandler, Proposinator, TestListener,
};
use tokio::sync::Notify;
use tokio::time::{sleep, Duration};

/// Answers each query with a single "Search for <query>" proposal.
struct SearchHandler;

#[async_trait::async_trait]
impl AskHandler for SearchHandler {
    async fn ask(&self, input: UserInput) -> Vec<Proposal> {
        if input.text.is_empty() {
            return Vec::new();
        }
        vec![headline_proposal(
            "search",
            &format!("Search for {}", input.text),
        )]
    }
}

/// Holds its answer to "slow" until the gate opens.
struct GatedHandler {
    gate: Arc<Notify>,
}

#[async_trait::async_trait]
impl AskHandler for GatedHandler {
    async fn ask(&self, input: UserInput) -> Vec<Proposal> {
        if input.text != "slow" {
            return Vec::new();
        }
        self.gate.notified().await;
        vec![headline_proposal("late", "late fast")]
    }
}

/// Answers after `delay`.
struct SlowHandler {
    delay: Duration,
}

#[async_trait::async_trait]
impl AskHandler for SlowHandler {
    async fn ask(&self, input: UserInput) -> Vec<Proposal> {
        sleep(self.delay).await;
        vec![headline_proposal("slow", &format!("Slow {}", input.text))]
    }
}

struct SilentHandler;

#[async_trait::async_trait]
impl AskHandler for SilentHandler {
    async fn ask(&self, _input: UserInput) -> Vec<Proposal> {
        std::future::pending::<()>().await;
        Vec::new()
    }
}

#[tokio::test]
async fn empty_query_falls_back_to_next() -> Result<()> {
    let engine = start_engine();
    let producer = Proposinator::new(&engine, "test://producer")?;
    producer.propose("mail", "E-mail")?;
    producer.propose("music", "Music")?;

    let (ask, rx) = engine.initiate_ask()?;
    let mut listener = TestListener::new(rx);
    engine.flush().await?;
    assert_eq!(listener.count(), 0, "Ask windows start closed");

    ask.set_result_count(10)?;
    engine.flush().await?;
    assert_eq!(listener.count(), 2);

    producer.propose("fresh", "Fresh")?;
    engine.flush().await?;
    assert_eq!(listener.count(), 3, "later Next proposals are mirrored");
    Ok(())
}

#[tokio::test]
async fn query_filters_and_reproposal_replaces() -> Result<()> {
    let engine = start_engine();
    let producer = Proposinator::new(&engine, "test://producer")?;
    producer.propose("mail", "E-mail")?;
    producer.propose("music", "Music")?;

    let (ask, rx) = engine.initiate_ask()?;
    let mut listener = TestListener::new(rx);
    ask.set_result_count(10)?;
    ask.set_user_input(UserInput::new("E"))?;
    engine.flush().await?;
    assert_eq!(listener.only_suggestion().display.headline, "E-mail");

    producer.propose("mail", "Messaging")?;
    engine.flush().await?;
    assert_eq!(listener.only_suggestion().display.headline, "Messaging");
    Ok(())
}

#[tokio::test]
async fn unmatched_entries_can_stay_visible() -> Result<()> {
    let mut config = test_config();
    config.show_unmatched_in_ask = true;
    let engine = start_engine_with(config);
    let producer = Proposinator::new(&engine, "test://producer")?;
    producer.propose("mail", "E-mail")?;
    producer.propose("music", "Music")?;

    let (ask, _rx) = engine.initiate_ask()?;
    ask.set_user_input(UserInput::new("E"))?;
    engine.flush().await?;
    let snapshot = engine.ask_snapshot().await?;
    assert_eq!(headlines(&snapshot), vec!["E-mail", "Music"]);
    Ok(())
}

#[tokio::test]
async fn substring_ranking_order() -> Result<()> {
    let engine = start_engine();
    let producer = Proposinator::new(&engine, "test://mail")?;
    let (ask, rx) = engine.initiate_ask()?;
    let mut listener = TestListener::new(rx);
    ask.set_result_count(10)?;

    producer.register_ask_handler(FixedAskHandler::new(vec![
        headline_proposal("1", "View E-mail"),
        headline_proposal("2", "E-mail Guests"),
        headline_proposal("3", "Compose E-mail"),
        headline_proposal("4", "Reply to E-mail"),
    ]))?;
    ask.set_user_input(UserInput::new("e-mail"))?;

    assert!(listener.wait_until(|s| s.len() == 4).await);
    let snapshot = engine.ask_snapshot().await?;
    assert_eq!(
        headlines(&snapshot),
        vec!["View E-mail", "E-mail Guests", "Compose E-mail", "Reply to E-mail"]
    );
    Ok(())
}

#[tokio::test]
async fn new_query_replaces_handler_results() -> Result<()> {
    let engine = start_engine();
    let producer = Proposinator::new(&engine, "test://search")?;
    producer.register_ask_handler(Arc::new(SearchHandler))?;
    let (ask, _rx) = engine.initiate_ask()?;

    ask.set_user_input(UserInput::new("a"))?;
    let snapshot = wait_for_ask(&engine, |s| !s.is_empty()).await;
    assert_eq!(headlines(&snapshot), vec!["Search for a"]);

    ask.set_user_input(UserInput::new("ab"))?;
    let snapshot = wait_for_ask(&engine, |s| headlines(s) == vec!["Search for ab"]).await;
    assert_eq!(headlines(&snapshot), vec!["Search for ab"]);
    Ok(())
}

#[tokio::test]
async fn unchanged_query_is_not_redispatched() -> Result<()> {
    let engine = start_engine();
    let (ask, _rx) = engine.initiate_ask()?;
    ask.set_user_input(UserInput::new("E"))?;
    ask.set_user_input(UserInput::new("e"))?;
    engine.flush().await?;

    assert_eq!(engine.stats().await?.asks_dispatched, 2);
    Ok(())
}

#[tokio::test]
async fn stale_replies_are_discarded() -> Result<()> {
    let engine = start_engine();
    let gate = Arc::new(Notify::new());
    let producer = Proposinator::new(&engine, "test://slow")?;
    let (ask, _rx) = engine.initiate_ask()?;
    producer.register_ask_handler(Arc::new(GatedHandler { gate: gate.clone() }))?;

    ask.set_user_input(UserInput::new("slow"))?;
    engine.flush().await?;
    ask.set_user_input(UserInput::new("fast"))?;
    engine.flush().await?;
    gate.notify_one();

    let stats = wait_for_stats(&engine, |s| s.stale_ask_replies == 1).await;
    assert_eq!(stats.stale_ask_replies, 1);
    assert!(engine.ask_snapshot().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn stale_replies_merge_when_configured() -> Result<()> {
    let mut config = test_config();
    config.discard_stale_ask_replies = false;
    let engine = start_engine_with(config);
    let gate = Arc::new(Notify::new());
    let producer = Proposinator::new(&engine, "test://slow")?;
    let (ask, _rx) = engine.initiate_ask()?;
    producer.register_ask_handler(Arc::new(GatedHandler { gate: gate.clone() }))?;

    ask.set_user_input(UserInput::new("slow"))?;
    engine.flush().await?;
    ask.set_user_input(UserInput::new("fast"))?;
    engine.flush().await?;
    gate.notify_one();

    let snapshot = wait_for_ask(&engine, |s| !s.is_empty()).await;
    assert_eq!(headlines(&snapshot), vec!["late fast"]);
    Ok(())
}

#[tokio::test]
async fn silent_handler_does_not_block_others() -> Result<()> {
    let engine = start_engine();
    let silent = Proposinator::new(&engine, "test://silent")?;
    silent.register_ask_handler(Arc::new(SilentHandler))?;
    let search = Proposinator::new(&engine, "test://search")?;
    search.register_ask_handler(Arc::new(SearchHandler))?;
    let (ask, _rx) = engine.initiate_ask()?;

    ask.set_user_input(UserInput::new("weather"))?;
    let snapshot = wait_for_ask(&engine, |s| !s.is_empty()).await;
    assert_eq!(headlines(&snapshot), vec!["Search for weather"]);

    silent.propose("1", "weather station")?;
    engine.flush().await?;
    assert_eq!(engine.ask_snapshot().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn removal_retracts_from_both_lists() -> Result<()> {
    let engine = start_engine();
    let producer = Proposinator::new(&engine, "test://producer")?;
    producer.propose("x", "Everywhere")?;
    producer.register_ask_handler(FixedAskHandler::new(vec![headline_proposal(
        "only-ask",
        "Only in ask",
    )]))?;

    let (_next, next_rx) = engine.subscribe_to_next(Some(10))?;
    let mut next_listener = TestListener::new(next_rx);
    let (ask, ask_rx) = engine.initiate_ask()?;
    let mut ask_listener = TestListener::new(ask_rx);
    ask.set_result_count(10)?;
    assert!(ask_listener.wait_until(|s| s.len() == 2).await);
    assert_eq!(next_listener.count(), 1);

    producer.remove("x")?;
    producer.remove("only-ask")?;
    engine.flush().await?;
    assert_eq!(next_listener.count(), 0);
    assert_eq!(ask_listener.count(), 0);
    Ok(())
}

#[tokio::test]
async fn merge_never_duplicates_an_identity() -> Result<()> {
    let engine = start_engine();
    let producer = Proposinator::new(&engine, "test://producer")?;
    producer.propose("dup", "Dup from next")?;
    producer.register_ask_handler(FixedAskHandler::new(vec![headline_proposal(
        "dup",
        "Dup from ask",
    )]))?;
    let (ask, _rx) = engine.initiate_ask()?;

    ask.set_user_input(UserInput::new("dup"))?;
    let snapshot = wait_for_ask(&engine, |s| headlines(s).contains(&"Dup from ask")).await;
    assert_eq!(headlines(&snapshot), vec!["Dup from ask"]);

    producer.propose("dup", "Dup again")?;
    engine.flush().await?;
    let snapshot = engine.ask_snapshot().await?;
    assert_eq!(headlines(&snapshot), vec!["Dup again"]);
    Ok(())
}

#[tokio::test]
async fn ask_tap_reports_queries_and_interactions() -> Result<()> {
    let engine = start_engine();
    let producer = Proposinator::new(&engine, "test://producer")?;
    producer.propose("mail", "E-mail")?;
    let mut tap = engine.watch_ask_proposals()?;

    let (ask, rx) = engine.initiate_ask()?;
    let mut listener = TestListener::new(rx);
    ask.set_result_count(10)?;
    ask.set_user_input(UserInput::new("Mail"))?;
    engine.flush().await?;

    let uuid = listener.only_suggestion().uuid;
    engine.notify_interaction(uuid, InteractionType::Dismissed)?;
    engine.notify_interaction("no-such-suggestion", InteractionType::Selected)?;
    engine.flush().await?;

    let events = drain_debug(&mut tap);
    assert_eq!(events.len(), 4);
    assert!(matches!(&events[0], DebugEvent::AskStart { query, .. } if query.is_empty()));
    match &events[1] {
        DebugEvent::AskStart { query, proposals } => {
            assert_eq!(query, "mail");
            assert_eq!(proposals[0].proposal_id, "mail");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(
        &events[2],
        DebugEvent::Interaction { interaction: InteractionType::Dismissed, proposal: Some(p) }
            if p.proposal_id == "mail"
    ));
    assert!(matches!(
        &events[3],
        DebugEvent::Interaction { interaction: InteractionType::Selected, proposal: None }
    ));
    assert_eq!(engine.stats().await?.interactions, 2);
    Ok(())
}

#[tokio::test]
async fn handlers_past_the_timeout_are_abandoned() -> Result<()> {
    let mut config = test_config();
    config.ask_handler_timeout_ms = 50;
    let engine = start_engine_with(config);
    let (ask, _rx) = engine.initiate_ask()?;
    let slow = Proposinator::new(&engine, "test://slow")?;
    slow.register_ask_handler(Arc::new(SlowHandler {
        delay: Duration::from_millis(250),
    }))?;
    let silent = Proposinator::new(&engine, "test://silent")?;
    silent.register_ask_handler(Arc::new(SilentHandler))?;
    let search = Proposinator::new(&engine, "test://search")?;
    search.register_ask_handler(Arc::new(SearchHandler))?;

    ask.set_user_input(UserInput::new("weather"))?;
    let snapshot = wait_for_ask(&engine, |s| !s.is_empty()).await;
    assert_eq!(headlines(&snapshot), vec!["Search for weather"]);
    let stats = wait_for_stats(&engine, |s| s.ask_timeouts == 2).await;
    assert_eq!(stats.ask_timeouts, 2);

    // Well past the slow handler's answer
    sleep(Duration::from_millis(400)).await;
    engine.flush().await?;
    let snapshot = engine.ask_snapshot().await?;
    assert_eq!(headlines(&snapshot), vec!["Search for weather"]);
    assert_eq!(engine.stats().await?.ask_timeouts, 2);
    Ok(())
}

#[tokio::test]
async fn listener_order_follows_ask_ranking() -> Result<()> {
    let engine = start_engine();
    let producer = Proposinator::new(&engine, "test://mail")?;
    for (id, headline) in [
        ("1", "Reply to E-mail"),
        ("2", "Music"),
        ("3", "View E-mail"),
        ("4", "Compose E-mail"),
        ("5", "E-mail Guests"),
    ] {
        producer.propose(id, headline)?;
        engine.flush().await?;
        sleep(Duration::from_millis(1)).await;
    }

    let (ask, rx) = engine.initiate_ask()?;
    let mut listener = TestListener::new(rx);
    ask.set_result_count(10)?;
    for query in ["", "e-mail", "mail", "e", "m"] {
        ask.set_user_input(UserInput::new(query))?;
        engine.flush().await?;
        let snapshot = engine.ask_snapshot().await?;
        let expected: Vec<String> = headlines(&snapshot).iter().map(|h| h.to_string()).collect();
        assert_eq!(listener.headlines(), expected, "query {query:?}");
    }
    Ok(())
}
