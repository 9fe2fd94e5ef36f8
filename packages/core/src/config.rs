//! Runtime configuration.
//!
//! A single [`Config`] value is assembled at startup from the JSON config
//! file, then environment overrides, then CLI flags (applied in `main.rs`),
//! and handed to every component that needs it.

use std::collections::HashSet;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 300;
pub const DEFAULT_STATE_FILE: &str = "state.json";
pub const DEFAULT_USERNAME: &str = "Afrodita Art";

/// Value shipped in the sample config; treated as "not configured".
pub const WEBHOOK_PLACEHOLDER: &str = "YOUR_WEBHOOK_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("at least one search must be configured")]
    NoSearches,

    #[error("search #{0} has no tags")]
    EmptyTags(usize),

    #[error("search \"{0}\" is configured more than once")]
    DuplicateSearch(String),
}

/// One watched tag query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchConfig {
    #[serde(deserialize_with = "one_or_many")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub ratings: Vec<String>,
}

impl SearchConfig {
    pub fn new<T, R>(tags: T, ratings: R) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ratings: ratings.into_iter().map(Into::into).collect(),
        }
    }

    /// Persistence key and display title for this search.
    pub fn key(&self) -> String {
        self.tags.join(" ")
    }

    /// Tag query sent to the API: tags followed by rating filters.
    pub fn query(&self) -> String {
        self.tags
            .iter()
            .chain(self.ratings.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let words = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => s.split_whitespace().map(str::to_string).collect(),
        OneOrMany::Many(v) => v
            .into_iter()
            .flat_map(|s| s.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .collect(),
    };
    Ok(words)
}

/// Ids are sometimes written as bare numbers in hand-edited config files.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(u64),
}

impl From<Scalar> for String {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Text(s) => s,
            Scalar::Number(n) => n.to_string(),
        }
    }
}

/// On-disk layout of `config.json`.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileConfig {
    discord_webhook_url: Option<String>,
    thread_id: Option<Scalar>,
    avatar_url: Option<String>,
    username: Option<String>,
    gelbooru_user_id: Option<Scalar>,
    gelbooru_api_key: Option<String>,
    polling_interval_seconds: Option<u64>,
    state_file: Option<PathBuf>,
    #[serde(default)]
    searches: Vec<SearchConfig>,
}

#[derive(Clone)]
pub struct Config {
    pub webhook_url: String,
    pub thread_id: Option<String>,
    pub avatar_url: Option<String>,
    pub username: String,
    pub gelbooru_user_id: String,
    pub gelbooru_api_key: String,
    pub poll_interval_seconds: u64,
    pub state_file: PathBuf,
    pub searches: Vec<SearchConfig>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("webhook_url", &"<redacted>")
            .field("thread_id", &self.thread_id)
            .field("avatar_url", &self.avatar_url)
            .field("username", &self.username)
            .field("gelbooru_user_id", &self.gelbooru_user_id)
            .field("gelbooru_api_key", &"<redacted>")
            .field("poll_interval_seconds", &self.poll_interval_seconds)
            .field("state_file", &self.state_file)
            .field("searches", &self.searches)
            .finish()
    }
}

impl Config {
    /// Read `path` and apply process environment overrides.
    ///
    /// A missing file is not an error: every required value may come from
    /// the environment instead. Call [`Config::validate`] before use.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = read_file(path)?;
        Self::from_sources(file, |name| env::var(name).ok())
    }

    /// Parse a config document without touching the environment.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let file = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Self::from_sources(file, |_| None)
    }

    fn from_sources<F>(file: FileConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let poll_interval_seconds = match var("POLL_INTERVAL_SECONDS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: "POLL_INTERVAL_SECONDS",
                value: raw,
            })?,
            None => file
                .polling_interval_seconds
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS),
        };

        Ok(Self {
            webhook_url: var("WEBHOOK_URL")
                .or(file.discord_webhook_url)
                .unwrap_or_default(),
            thread_id: var("THREAD_ID")
                .or(file.thread_id.map(String::from))
                .filter(|id| !id.is_empty()),
            avatar_url: var("AVATAR_URL")
                .or(file.avatar_url)
                .filter(|url| !url.is_empty()),
            username: file
                .username
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            gelbooru_user_id: var("GELBOORU_USER_ID")
                .or(file.gelbooru_user_id.map(String::from))
                .unwrap_or_default(),
            gelbooru_api_key: var("GELBOORU_API_KEY")
                .or(file.gelbooru_api_key)
                .unwrap_or_default(),
            poll_interval_seconds,
            state_file: var("STATE_FILE")
                .map(PathBuf::from)
                .or(file.state_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
            searches: file.searches,
        })
    }

    /// Reject configurations the poll loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let webhook = self.webhook_url.trim();
        if webhook.is_empty() || webhook == WEBHOOK_PLACEHOLDER {
            return Err(ConfigError::Missing("discordWebhookUrl (WEBHOOK_URL)"));
        }
        if self.gelbooru_user_id.trim().is_empty() {
            return Err(ConfigError::Missing("gelbooruUserId (GELBOORU_USER_ID)"));
        }
        if self.gelbooru_api_key.trim().is_empty() {
            return Err(ConfigError::Missing("gelbooruApiKey (GELBOORU_API_KEY)"));
        }
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                name: "pollingIntervalSeconds",
                value: "0".to_string(),
            });
        }
        if self.searches.is_empty() {
            return Err(ConfigError::NoSearches);
        }

        let mut keys = HashSet::new();
        for (index, search) in self.searches.iter().enumerate() {
            if search.tags.is_empty() {
                return Err(ConfigError::EmptyTags(index));
            }
            let key = search.key();
            if !keys.insert(key.clone()) {
                return Err(ConfigError::DuplicateSearch(key));
            }
        }

        Ok(())
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    if !path.exists() {
        tracing::info!(
            "No config file at {}, relying on environment",
            path.display()
        );
        return Ok(FileConfig::default());
    }

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
