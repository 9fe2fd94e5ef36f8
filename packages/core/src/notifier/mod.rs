//! Post announcement.
//!
//! Turns a [`Post`] into a webhook message and delivers it. Delivery reports
//! success as a plain `bool` so the check cycle can decide whether to record
//! the post as sent; nothing here ever aborts a cycle.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::SearchConfig;
use crate::services::Post;

pub mod color;
pub mod embed;
pub mod webhook;

#[cfg(test)]
pub mod mock;

pub use color::{ColorSampler, ImageColorSampler, DEFAULT_ACCENT_COLOR};
pub use webhook::DiscordNotifier;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Webhook returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Network {
            message: err.to_string(),
        }
    }
}

#[async_trait]
pub trait Notifier {
    /// Announce `post` for `search`. `true` only when the destination
    /// accepted the message.
    async fn deliver(&self, post: &Post, search: &SearchConfig) -> bool;
}
