use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use augur_core::suggestion::{AskHandler, DebugEvent, StoryInfo, UserInput};
use augur_core::{
    Action, EngineConfig, EngineHandle, FocusProvider, InteractionType, Proposal, Result,
    StoryProvider, Suggestion, SuggestionDisplay, SuggestionEngine, SuggestionUpdate,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Story launcher that only logs what it would start.
struct LoggingStories {
    next_id: AtomicU64,
    changes: mpsc::UnboundedSender<StoryInfo>,
}

#[async_trait]
impl StoryProvider for LoggingStories {
    async fn create_story(
        &self,
        module_id: &str,
        extra_info: HashMap<String, String>,
        initial_data: Option<String>,
    ) -> Result<String> {
        let id = format!("story-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        info!(
            target = "suggest_shell",
            story = %id,
            module = module_id,
            color = extra_info.get("color").map(String::as_str).unwrap_or(""),
            data = initial_data.as_deref().unwrap_or(""),
            "📖 create_story"
        );
        let _ = self.changes.send(StoryInfo {
            id: id.clone(),
            url: module_id.to_string(),
        });
        Ok(id)
    }

    async fn add_module(
        &self,
        story_id: &str,
        module_path: &[String],
        module_url: &str,
        link_name: &str,
        _initial_data: Option<String>,
    ) -> Result<()> {
        info!(
            target = "suggest_shell",
            story = story_id,
            path = %module_path.join("/"),
            module = module_url,
            link = link_name,
            "🧩 add_module"
        );
        Ok(())
    }
}

struct LoggingFocus;

#[async_trait]
impl FocusProvider for LoggingFocus {
    async fn request(&self, story_id: &str) -> Result<()> {
        info!(target = "suggest_shell", story = story_id, "🎯 focus");
        Ok(())
    }
}

/// Contacts producer answering name lookups in Ask.
struct ContactsHandler {
    names: Vec<&'static str>,
}

#[async_trait]
impl AskHandler for ContactsHandler {
    async fn ask(&self, input: UserInput) -> Vec<Proposal> {
        let query = input.text.to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.names
            .iter()
            .filter(|name| name.to_lowercase().contains(&query))
            .map(|name| {
                Proposal::new(
                    format!("call-{}", name.to_lowercase()),
                    SuggestionDisplay::headline(format!("Call {name}")),
                )
                .with_action(Action::create_story("mod://dialer"))
            })
            .collect()
    }
}

fn log_window(label: &str, suggestions: &[Suggestion]) {
    let lines: Vec<String> = suggestions
        .iter()
        .map(|s| format!("{} ({})", s.display.headline, s.rank))
        .collect();
    info!(target = "suggest_shell", list = label, entries = ?lines, "📋 window");
}

fn drain_updates(label: &str, rx: &mut mpsc::Receiver<SuggestionUpdate>) {
    while let Ok(update) = rx.try_recv() {
        match update {
            SuggestionUpdate::Add(added) => {
                for s in added {
                    info!(
                        target = "suggest_shell",
                        list = label,
                        headline = %s.display.headline,
                        "+ add"
                    );
                }
            }
            SuggestionUpdate::Remove(uuid) => {
                info!(target = "suggest_shell", list = label, suggestion = %uuid, "- remove");
            }
        }
    }
}

async fn run(
    engine: &EngineHandle,
    mut story_changes: mpsc::UnboundedReceiver<StoryInfo>,
) -> Result<()> {
    let mut debug_next = engine.watch_next_proposals()?;

    // Next: two producers
    let mail = engine.register_publisher("app://mail")?;
    let music = engine.register_publisher("app://music")?;
    mail.propose(
        Proposal::new("inbox", SuggestionDisplay::headline("View E-mail"))
            .with_action(Action::create_story("mod://mail")),
    )?;
    music.propose_json(
        r#"{ "id": "play", "display": { "headline": "Play Music", "color": 16744272 },
             "on_selected": [ { "type": "focus_story", "story_id": "story-music" } ] }"#,
    )?;
    mail.propose(Proposal::new("compose", SuggestionDisplay::headline("Compose E-mail")))?;

    let (_next, mut next_rx) = engine.subscribe_to_next(Some(3))?;
    engine.flush().await?;
    drain_updates("next", &mut next_rx);
    log_window("next", &engine.next_snapshot().await?);

    // Ask: contacts answer queries alongside the Next fallback
    let contacts = engine.register_publisher("app://contacts")?;
    contacts.register_ask_handler(Arc::new(ContactsHandler {
        names: vec!["Mom", "Emma", "Marcel"],
    }))?;
    let (ask, mut ask_rx) = engine.initiate_ask()?;
    ask.set_result_count(5)?;
    for query in ["m", "ma", "e-mail"] {
        ask.set_user_input(UserInput::new(query))?;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        engine.flush().await?;
        drain_updates("ask", &mut ask_rx);
        info!(target = "suggest_shell", query, "🔎 ask");
        log_window("ask", &engine.ask_snapshot().await?);
    }

    // Select the top Ask entry
    let top = engine.ask_snapshot().await?.into_iter().next();
    match top {
        Some(s) => {
            info!(target = "suggest_shell", headline = %s.display.headline, "✅ selecting");
            engine.notify_interaction(s.uuid, InteractionType::Selected)?;
        }
        None => warn!(target = "suggest_shell", "Ask window is empty; nothing to select"),
    }

    // Stories created by actions feed back into the existing-story filter
    if let Ok(Some(story)) =
        tokio::time::timeout(std::time::Duration::from_millis(500), story_changes.recv()).await
    {
        engine.notify_story_changed(story)?;
    }
    mail.propose(
        Proposal::new("inbox", SuggestionDisplay::headline("View E-mail"))
            .with_action(Action::create_story("mod://mail")),
    )?;
    engine.flush().await?;
    drain_updates("next", &mut next_rx);
    log_window("next", &engine.next_snapshot().await?);

    while let Ok(event) = debug_next.try_recv() {
        if let DebugEvent::NextUpdate(proposals) = event {
            info!(target = "suggest_shell", count = proposals.len(), "🐞 next debug update");
        }
    }

    let stats = engine.stats().await?;
    info!(
        target = "suggest_shell",
        stats = %serde_json::to_string(&stats).unwrap_or_default(),
        "📊 engine stats"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,augur_core=info,suggest_shell=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(target = "suggest_shell", "Starting suggestion shell demo");

    // Defaults + env + optional TOML overlay
    let cfg = EngineConfig::load();
    let (story_tx, story_rx) = mpsc::unbounded_channel();
    let engine = SuggestionEngine::new(cfg)
        .with_story_provider(Arc::new(LoggingStories {
            next_id: AtomicU64::new(0),
            changes: story_tx,
        }))
        .with_focus_provider(Arc::new(LoggingFocus))
        .start();

    let outcome = run(&engine, story_rx).await;
    engine.shutdown().await.ok();
    outcome?;
    Ok(())
}
