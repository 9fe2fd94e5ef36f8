use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::SearchConfig;
use crate::services::{Post, PostSource, SourceError};

/// In-memory [`PostSource`] keyed by search key.
///
/// Keys with no canned response yield an empty list.
#[derive(Default)]
pub struct MockPostSource {
    responses: HashMap<String, Option<Vec<Post>>>,
    calls: Mutex<Vec<String>>,
}

impl MockPostSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(mut self, key: &str, posts: Vec<Post>) -> Self {
        self.responses.insert(key.to_string(), Some(posts));
        self
    }

    pub fn with_error(mut self, key: &str) -> Self {
        self.responses.insert(key.to_string(), None);
        self
    }

    /// Search keys fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostSource for MockPostSource {
    async fn fetch_posts(&self, search: &SearchConfig) -> Result<Vec<Post>, SourceError> {
        let key = search.key();
        self.calls.lock().unwrap().push(key.clone());

        match self.responses.get(&key) {
            Some(Some(posts)) => Ok(posts.clone()),
            Some(None) => Err(SourceError::Status { status: 503 }),
            None => Ok(Vec::new()),
        }
    }

    fn source_name(&self) -> &str {
        "mock"
    }
}

/// Post with predictable URLs for `id`.
pub fn make_post(id: &str) -> Post {
    Post {
        id: id.to_string(),
        file_url: format!("https://img.example.com/{}.png", id),
        tags: format!("catgirl solo id_{}", id),
        rating: "general".to_string(),
    }
}
