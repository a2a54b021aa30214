use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Runtime knobs for the suggestion engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of each subscriber's delivery queue
    pub listener_buffer: usize,
    /// Capacity of each debug tap queue
    pub debug_buffer: usize,
    /// Window for Next subscribers that do not ask for one
    pub next_window: usize,
    /// 0 waits forever for Ask handlers
    pub ask_handler_timeout_ms: u64,
    /// Drop Ask replies that belong to a superseded query
    pub discard_stale_ask_replies: bool,
    /// Keep non-matching entries visible in Ask windows while a query is set
    pub show_unmatched_in_ask: bool,
    /// Drop Next proposals that would create an already-existing story
    pub filter_existing_stories: bool,
    /// Upper bound on actions run for a single selection, custom expansions included
    pub max_action_expansions: usize,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            listener_buffer: env_or("AUGUR_LISTENER_BUFFER", 1024usize).max(1),
            debug_buffer: env_or("AUGUR_DEBUG_BUFFER", 256usize).max(1),
            next_window: env_or("AUGUR_NEXT_WINDOW", 0usize),
            ask_handler_timeout_ms: env_or("AUGUR_ASK_TIMEOUT_MS", 0u64),
            discard_stale_ask_replies: env_or("AUGUR_DISCARD_STALE_ASK", true),
            show_unmatched_in_ask: env_or("AUGUR_SHOW_UNMATCHED", false),
            filter_existing_stories: env_or("AUGUR_FILTER_EXISTING_STORIES", true),
            max_action_expansions: env_or("AUGUR_MAX_ACTION_EXPANSIONS", 64usize),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file (path via AUGUR_CONFIG or ./augur.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("AUGUR_CONFIG").unwrap_or_else(|_| "augur.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(
                target: "augur::config",
                path = %path,
                "No TOML config found; using defaults/env"
            );
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<EngineToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(
                        target: "augur::config",
                        error = %e,
                        "Failed to parse TOML; using defaults"
                    );
                    default
                }
            },
            Err(e) => {
                tracing::warn!(
                    target: "augur::config",
                    error = %e,
                    "Failed to read TOML; using defaults"
                );
                default
            }
        }
    }

    /// Overlay a TOML document onto the defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let t: EngineToml = toml::from_str(s)?;
        Ok(t.overlay(Self::default()))
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, Deserialize)]
struct EngineToml {
    pub listener_buffer: Option<usize>,
    pub debug_buffer: Option<usize>,
    pub next_window: Option<usize>,
    pub ask: Option<AskToml>,
    pub filter_existing_stories: Option<bool>,
    pub max_action_expansions: Option<usize>,
}

impl EngineToml {
    fn overlay(self, mut base: EngineConfig) -> EngineConfig {
        if let Some(v) = self.listener_buffer {
            base.listener_buffer = v.max(1);
        }
        if let Some(v) = self.debug_buffer {
            base.debug_buffer = v.max(1);
        }
        if let Some(v) = self.next_window {
            base.next_window = v;
        }
        if let Some(a) = self.ask {
            a.apply(&mut base);
        }
        if let Some(v) = self.filter_existing_stories {
            base.filter_existing_stories = v;
        }
        if let Some(v) = self.max_action_expansions {
            base.max_action_expansions = v;
        }
        base
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AskToml {
    pub handler_timeout_ms: Option<u64>,
    pub discard_stale_replies: Option<bool>,
    pub show_unmatched: Option<bool>,
}

impl AskToml {
    fn apply(self, c: &mut EngineConfig) {
        if let Some(x) = self.handler_timeout_ms {
            c.ask_handler_timeout_ms = x;
        }
        if let Some(x) = self.discard_stale_replies {
            c.discard_stale_ask_replies = x;
        }
        if let Some(x) = self.show_unmatched {
            c.show_unmatched_in_ask = x;
        }
    }
}
