use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryInfo {
    pub id: String,
    pub url: String,
}

/// Stories currently known to the story collaborator, keyed by id.
#[derive(Debug, Default)]
pub struct StoryTimeline {
    id_to_url: HashMap<String, String>,
    // url -> number of stories running it
    urls: HashMap<String, usize>,
}

impl StoryTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_change(&mut self, story: StoryInfo) {
        if let Some(previous) = self.id_to_url.insert(story.id, story.url.clone()) {
            if previous == story.url {
                return;
            }
            self.release(&previous);
        }
        *self.urls.entry(story.url).or_insert(0) += 1;
    }

    pub fn on_delete(&mut self, story_id: &str) {
        if let Some(url) = self.id_to_url.remove(story_id) {
            self.release(&url);
        }
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.urls.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.id_to_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_url.is_empty()
    }

    fn release(&mut self, url: &str) {
        if let Some(count) = self.urls.get_mut(url) {
            *count -= 1;
            if *count == 0 {
                self.urls.remove(url);
            }
        }
    }
}
