use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::SearchConfig;
use crate::notifier::Notifier;
use crate::services::Post;

/// Records every delivery attempt; fails for configured post ids.
#[derive(Default)]
pub struct MockNotifier {
    failing: HashSet<String>,
    attempts: Mutex<Vec<(String, String)>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    /// `(search key, post id)` for every attempt, in order.
    pub fn attempts(&self) -> Vec<(String, String)> {
        self.attempts.lock().unwrap().clone()
    }

    /// Post ids attempted for `key`, in order.
    pub fn attempted_ids(&self, key: &str) -> Vec<String> {
        self.attempts()
            .into_iter()
            .filter(|(k, _)| k == key)
            .map(|(_, id)| id)
            .collect()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn deliver(&self, post: &Post, search: &SearchConfig) -> bool {
        self.attempts
            .lock()
            .unwrap()
            .push((search.key(), post.id.clone()));
        !self.failing.contains(&post.id)
    }
}
