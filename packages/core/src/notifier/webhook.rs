//! Discord webhook delivery.
//!
//! Each post becomes one embed: accent color sampled from the image, a link
//! back to the post page, rating and tags fields. Failures are logged and
//! reported as `false` so the post stays "new" and is retried next cycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;

use crate::config::{Config, SearchConfig};
use crate::notifier::color::{ColorSampler, ImageColorSampler, DEFAULT_ACCENT_COLOR};
use crate::notifier::embed::{build_embed, WebhookPayload};
use crate::notifier::{DeliveryError, Notifier};
use crate::services::Post;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DiscordNotifier {
    webhook_url: String,
    thread_id: Option<String>,
    username: String,
    avatar_url: Option<String>,
    http: Client,
    sampler: Arc<dyn ColorSampler + Send + Sync>,
}

impl DiscordNotifier {
    pub fn new(config: &Config) -> Self {
        Self::with_sampler(config, Arc::new(ImageColorSampler::new()))
    }

    pub fn with_sampler(config: &Config, sampler: Arc<dyn ColorSampler + Send + Sync>) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            webhook_url: config.webhook_url.clone(),
            thread_id: config.thread_id.clone().filter(|id| !id.is_empty()),
            username: config.username.clone(),
            avatar_url: config.avatar_url.clone(),
            http,
            sampler,
        }
    }

    /// Accent color for `post`, default when sampling yields nothing.
    async fn accent_color(&self, post: &Post) -> u32 {
        match self.sampler.sample(&post.file_url).await {
            Some(color) => color,
            None => {
                tracing::debug!("Using default accent color for post {}", post.id);
                DEFAULT_ACCENT_COLOR
            }
        }
    }

    /// POST `payload` to the webhook, routed to the configured thread.
    pub async fn send(&self, payload: &WebhookPayload) -> Result<(), DeliveryError> {
        let mut request = self.http.post(&self.webhook_url).json(payload);
        if let Some(thread_id) = &self.thread_id {
            request = request.query(&[("thread_id", thread_id.as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn deliver(&self, post: &Post, search: &SearchConfig) -> bool {
        let color = self.accent_color(post).await;
        let embed = build_embed(post, search, color, Utc::now());
        let payload = WebhookPayload::new(self.username.clone(), self.avatar_url.clone(), embed);

        match self.send(&payload).await {
            Ok(()) => {
                tracing::info!("Delivered post {} for \"{}\"", post.id, search.key());
                true
            }
            Err(err) => {
                tracing::error!("Failed to deliver post {}: {}", post.id, err);
                false
            }
        }
    }
}
