//! Post sources.
//!
//! A [`PostSource`] answers "what are the latest posts for this search?".
//! The production implementation talks to Gelbooru; tests use an in-memory
//! mock so the check cycle can run without a network.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::config::SearchConfig;

pub mod gelbooru;

#[cfg(test)]
pub mod mock_source;

/// A post as returned by the search API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Post {
    /// Decimal string form of the post id.
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub file_url: String,
    /// Space separated tag list.
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub rating: String,
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(n) => Ok(n.to_string()),
        RawId::Text(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        RawId::Text(_) => Err(serde::de::Error::custom("empty post id")),
    }
}

/// Why a fetch produced no answer at all.
///
/// Distinct from `Ok(vec![])`: a failed fetch means "skip this search this
/// cycle", not "nothing new".
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request timed out: {message}")]
    Timeout { message: String },

    #[error("API returned HTTP {status}")]
    Status { status: u16 },
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout {
                message: err.to_string(),
            }
        } else {
            SourceError::Network {
                message: err.to_string(),
            }
        }
    }
}

/// Trait for post sources so the check cycle stays independent of the API.
#[async_trait]
pub trait PostSource {
    /// Latest posts for `search`, newest first.
    async fn fetch_posts(&self, search: &SearchConfig) -> Result<Vec<Post>, SourceError>;

    /// Name of this source for logging.
    fn source_name(&self) -> &str;
}
