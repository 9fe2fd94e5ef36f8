//! Persisted record of already-announced post IDs.
//!
//! The file is a JSON object mapping each search key to the IDs sent for
//! it, oldest first. It is read at the start of every cycle and written once
//! at the end. Reads fail open: a missing or corrupt file is an empty state.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Maximum number of IDs retained per search key.
pub const MAX_IDS_TO_STORE: usize = 200;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialise state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// IDs sent for one search, most recent last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SentIds(Vec<String>);

impl SentIds {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(ids.into_iter().map(Into::into).collect())
    }

    /// Membership view for one cycle. Built once, then probed per post.
    pub fn id_set(&self) -> HashSet<String> {
        self.0.iter().cloned().collect()
    }

    /// Append an ID. Callers check membership against [`SentIds::id_set`].
    pub fn append(&mut self, id: impl Into<String>) {
        self.0.push(id.into());
    }

    /// Keep only the most recent `max` IDs. Returns how many were dropped.
    pub fn trim(&mut self, max: usize) -> usize {
        let excess = self.0.len().saturating_sub(max);
        if excess > 0 {
            self.0.drain(..excess);
        }
        excess
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Mapping from search key to [`SentIds`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SentState(BTreeMap<String, SentIds>);

impl SentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&SentIds> {
        self.0.get(key)
    }

    /// The list for `key`, created empty when the key is new.
    pub fn entry(&mut self, key: &str) -> &mut SentIds {
        self.0.entry(key.to_string()).or_default()
    }

    pub fn insert(&mut self, key: impl Into<String>, ids: SentIds) {
        self.0.insert(key.into(), ids);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build a state from an arbitrary JSON document, repairing what it can.
    fn from_json(doc: serde_json::Map<String, Value>) -> Self {
        let mut state = Self::new();
        for (key, value) in doc {
            let Value::Array(items) = value else {
                tracing::warn!("State entry \"{}\" is not a list, resetting it", key);
                state.insert(key, SentIds::default());
                continue;
            };

            let mut seen = HashSet::new();
            let mut ids = SentIds::default();
            for item in items {
                let id = match item {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    other => {
                        tracing::warn!("Dropping malformed ID {} under \"{}\"", other, key);
                        continue;
                    }
                };
                if seen.insert(id.clone()) {
                    ids.append(id);
                }
            }
            state.insert(key, ids);
        }
        state
    }
}

/// File-backed loader/saver for [`SentState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state file. Never fails; problems are logged and yield an
    /// empty state.
    pub async fn load(&self) -> SentState {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No state file at {}, starting fresh", self.path.display());
                return SentState::new();
            }
            Err(err) => {
                tracing::error!("Failed to read state file {}: {}", self.path.display(), err);
                return SentState::new();
            }
        };

        match serde_json::from_str::<serde_json::Map<String, Value>>(&raw) {
            Ok(doc) => SentState::from_json(doc),
            Err(err) => {
                tracing::error!("Failed to parse state file {}: {}", self.path.display(), err);
                SentState::new()
            }
        }
    }

    /// Write the state pretty-printed, replacing the previous file.
    pub async fn save(&self, state: &SentState) -> Result<(), StateError> {
        let body = serde_json::to_string_pretty(state)?;
        let io_err = |source| StateError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        // Write to a sibling temp file, then rename over the target.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, body).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}
