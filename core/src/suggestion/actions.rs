//! Side effects of an accepted suggestion.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::proposal::{Action, AddModuleToStory, CreateStory};
use crate::telemetry::StatsRecorder;
use crate::Result;

/// Launches stories and adds modules to them
#[async_trait]
pub trait StoryProvider: Send + Sync {
    /// Create a story running `module_id`; returns the new story id.
    async fn create_story(
        &self,
        module_id: &str,
        extra_info: HashMap<String, String>,
        initial_data: Option<String>,
    ) -> Result<String>;

    async fn add_module(
        &self,
        story_id: &str,
        module_path: &[String],
        module_url: &str,
        link_name: &str,
        initial_data: Option<String>,
    ) -> Result<()>;
}

/// Moves user focus to a story
#[async_trait]
pub trait FocusProvider: Send + Sync {
    async fn request(&self, story_id: &str) -> Result<()>;
}

/// Runs action lists against the story and focus collaborators.
#[derive(Clone)]
pub struct ActionExecutor {
    story: Option<Arc<dyn StoryProvider>>,
    focus: Option<Arc<dyn FocusProvider>>,
    stats: StatsRecorder,
    max_actions: usize,
}

impl ActionExecutor {
    pub fn new(
        story: Option<Arc<dyn StoryProvider>>,
        focus: Option<Arc<dyn FocusProvider>>,
        stats: StatsRecorder,
        max_actions: usize,
    ) -> Self {
        Self {
            story,
            focus,
            stats,
            max_actions,
        }
    }

    /// Run `actions` on a background task.
    pub fn spawn(&self, actions: Vec<Action>, story_color: u32) -> JoinHandle<usize> {
        let executor = self.clone();
        tokio::spawn(async move { executor.perform(actions, story_color).await })
    }

    /// Run `actions` in order. Actions produced by a custom action run right
    /// after it, before its siblings. Returns how many actions were executed.
    pub async fn perform(&self, actions: Vec<Action>, story_color: u32) -> usize {
        let mut queue: VecDeque<Action> = actions.into();
        let mut executed = 0;

        while let Some(action) = queue.pop_front() {
            if executed >= self.max_actions {
                warn!(
                    limit = self.max_actions,
                    remaining = queue.len() + 1,
                    "Action limit reached; skipping remaining actions"
                );
                break;
            }
            executed += 1;
            self.stats.action_executed(1);
            debug!(action = action.kind(), "Executing action");

            match action {
                Action::CreateStory(create) => self.create_story(create, story_color).await,
                Action::FocusStory(focus) => self.request_focus(&focus.story_id).await,
                Action::AddModuleToStory(add) => self.add_module(add).await,
                Action::Custom(custom) => match custom.0.execute().await {
                    Ok(expanded) => {
                        debug!(count = expanded.len(), "Custom action expanded");
                        for next in expanded.into_iter().rev() {
                            queue.push_front(next);
                        }
                    }
                    Err(e) => warn!(error = %e, "Custom action failed"),
                },
            }
        }

        executed
    }

    async fn create_story(&self, create: CreateStory, story_color: u32) {
        let Some(story) = &self.story else {
            warn!(module_id = %create.module_id, "Unable to create story; no story provider");
            return;
        };

        let mut extra_info = HashMap::new();
        extra_info.insert("color".to_string(), format!("0x{:x}", story_color));

        match story
            .create_story(&create.module_id, extra_info, create.initial_data)
            .await
        {
            Ok(story_id) => {
                info!(module_id = %create.module_id, story_id = %story_id, "Created story");
                self.request_focus(&story_id).await;
            }
            Err(e) => warn!(module_id = %create.module_id, error = %e, "Story creation failed"),
        }
    }

    async fn request_focus(&self, story_id: &str) {
        let Some(focus) = &self.focus else {
            warn!(story_id, "Unable to focus story; no focus provider");
            return;
        };
        info!(story_id, "Requesting focus for story");
        if let Err(e) = focus.request(story_id).await {
            warn!(story_id, error = %e, "Focus request failed");
        }
    }

    async fn add_module(&self, add: AddModuleToStory) {
        let Some(story) = &self.story else {
            warn!(module_url = %add.module_url, "Unable to add module; no story provider");
            return;
        };
        info!(module_url = %add.module_url, story_id = %add.story_id, "Adding module to story");
        if let Err(e) = story
            .add_module(
                &add.story_id,
                &add.module_path,
                &add.module_url,
                &add.link_name,
                add.initial_data,
            )
            .await
        {
            warn!(story_id = %add.story_id, error = %e, "Adding module failed");
        }
    }
}
