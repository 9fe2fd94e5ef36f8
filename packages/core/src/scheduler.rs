//! Check cycle and polling loop.
//!
//! [`Tracker::run_cycle`] is one full pass over every configured search:
//! fetch, diff against the stored IDs, deliver new posts oldest first, trim,
//! and persist once at the end. [`run_polling`] owns the timer and calls the
//! cycle forever, so the cycle itself can be driven directly from tests.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::task::JoinError;
use tokio::time;

use crate::config::{Config, SearchConfig};
use crate::notifier::Notifier;
use crate::services::{Post, PostSource};
use crate::state::{SentState, StateStore, MAX_IDS_TO_STORE};

/// Pause after each delivery attempt.
pub const POST_DELAY: Duration = Duration::from_secs(2);

/// Pause before retrying after a cycle died.
pub const RECOVERY_DELAY: Duration = Duration::from_secs(60);

/// What happened to one search during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Fetch failed; stored IDs left untouched.
    Skipped,
    Checked {
        fetched: usize,
        new: usize,
        delivered: usize,
        failed: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchReport {
    pub key: String,
    pub outcome: SearchOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub searches: Vec<SearchReport>,
    pub persisted: bool,
}

impl CycleReport {
    pub fn delivered(&self) -> usize {
        self.searches
            .iter()
            .map(|s| match s.outcome {
                SearchOutcome::Checked { delivered, .. } => delivered,
                SearchOutcome::Skipped => 0,
            })
            .sum()
    }

    pub fn skipped(&self) -> usize {
        self.searches
            .iter()
            .filter(|s| s.outcome == SearchOutcome::Skipped)
            .count()
    }
}

/// Posts from `fetched` not yet in `sent`, oldest first.
///
/// The API answers newest first; duplicates inside one response are
/// collapsed to their first occurrence.
pub fn select_new_posts(fetched: Vec<Post>, sent: &HashSet<String>) -> Vec<Post> {
    let mut seen = HashSet::new();
    let mut fresh: Vec<Post> = fetched
        .into_iter()
        .filter(|post| !sent.contains(&post.id) && seen.insert(post.id.clone()))
        .collect();
    fresh.reverse();
    fresh
}

pub struct Tracker {
    searches: Vec<SearchConfig>,
    source: Arc<dyn PostSource + Send + Sync>,
    notifier: Arc<dyn Notifier + Send + Sync>,
    store: StateStore,
    post_delay: Duration,
}

impl Tracker {
    pub fn new(
        config: &Config,
        source: Arc<dyn PostSource + Send + Sync>,
        notifier: Arc<dyn Notifier + Send + Sync>,
    ) -> Self {
        Self {
            searches: config.searches.clone(),
            source,
            notifier,
            store: StateStore::new(config.state_file.clone()),
            post_delay: POST_DELAY,
        }
    }

    pub fn with_post_delay(mut self, post_delay: Duration) -> Self {
        self.post_delay = post_delay;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Run one full check over every search and persist the result.
    pub async fn run_cycle(&self) -> CycleReport {
        tracing::info!("Checking {} search(es) for new posts", self.searches.len());

        let mut state = self.store.load().await;
        let mut report = CycleReport::default();

        for search in &self.searches {
            report.searches.push(self.check_search(search, &mut state).await);
        }

        match self.store.save(&state).await {
            Ok(()) => report.persisted = true,
            Err(err) => tracing::error!("Failed to persist state: {}", err),
        }

        tracing::info!(
            "Check finished: {} delivered, {} search(es) skipped",
            report.delivered(),
            report.skipped()
        );
        report
    }

    async fn check_search(&self, search: &SearchConfig, state: &mut SentState) -> SearchReport {
        let key = search.key();
        let sent_set = state.entry(&key).id_set();

        tracing::info!("Checking \"{}\" ({} already sent)", key, sent_set.len());

        let fetched = match self.source.fetch_posts(search).await {
            Ok(posts) => posts,
            Err(err) => {
                tracing::error!(
                    "{} fetch failed for \"{}\", skipping: {}",
                    self.source.source_name(),
                    key,
                    err
                );
                return SearchReport {
                    key,
                    outcome: SearchOutcome::Skipped,
                };
            }
        };

        let fetched_count = fetched.len();
        let fresh = select_new_posts(fetched, &sent_set);
        if !fresh.is_empty() {
            tracing::info!("Found {} new post(s) for \"{}\"", fresh.len(), key);
        }

        let mut delivered = 0;
        let mut failed = 0;
        for post in &fresh {
            if self.notifier.deliver(post, search).await {
                state.entry(&key).append(post.id.clone());
                delivered += 1;
            } else {
                failed += 1;
            }
            time::sleep(self.post_delay).await;
        }

        let dropped = state.entry(&key).trim(MAX_IDS_TO_STORE);
        if dropped > 0 {
            tracing::debug!("Dropped {} oldest ID(s) for \"{}\"", dropped, key);
        }

        SearchReport {
            key,
            outcome: SearchOutcome::Checked {
                fetched: fetched_count,
                new: fresh.len(),
                delivered,
                failed,
            },
        }
    }
}

/// Run the check cycle in its own task so a panic cannot take the loop down.
pub async fn run_isolated(tracker: &Arc<Tracker>) -> Result<CycleReport, JoinError> {
    let tracker = Arc::clone(tracker);
    tokio::spawn(async move { tracker.run_cycle().await }).await
}

/// Run the polling loop until `Ctrl+C` (SIGINT) is received.
pub async fn run_polling(tracker: Arc<Tracker>, poll_interval: Duration) {
    run_polling_until(tracker, poll_interval, async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Run the polling loop until `shutdown` resolves.
///
/// A cycle that dies is logged and retried after [`RECOVERY_DELAY`];
/// otherwise the next cycle starts `poll_interval` after the previous one
/// finished.
pub async fn run_polling_until<F>(tracker: Arc<Tracker>, poll_interval: Duration, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    tracing::info!("Polling started (interval: {}s)", poll_interval.as_secs());

    loop {
        let delay = match run_isolated(&tracker).await {
            Ok(_) => {
                tracing::info!("Sleeping for {}s", poll_interval.as_secs());
                poll_interval
            }
            Err(err) => {
                tracing::error!("Check cycle aborted: {}", err);
                tracing::info!("Retrying in {}s", RECOVERY_DELAY.as_secs());
                RECOVERY_DELAY
            }
        };

        tokio::select! {
            _ = time::sleep(delay) => {}

            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received. Stopping polling.");
                break;
            }
        }
    }

    tracing::info!("Polling stopped cleanly");
}
