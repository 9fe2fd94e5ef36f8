//! Webhook message rendering.

use std::borrow::Cow;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::config::SearchConfig;
use crate::services::gelbooru::post_page_url;
use crate::services::Post;

/// Discord's limit for an embed field value.
pub const TAGS_FIELD_LIMIT: usize = 1024;
const TRUNCATION_MARKER: &str = "...";

pub const FOOTER_TEXT: &str = "Sent from Gelbooru";
pub const FOOTER_ICON_URL: &str =
    "https://media.discordapp.net/attachments/1388583647447224434/1404899966383685722/gelbooru-logo.png";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub url: String,
    pub color: u32,
    pub image: EmbedImage,
    pub fields: Vec<EmbedField>,
    pub footer: EmbedFooter,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
    pub icon_url: String,
}

/// Cap `tags` at [`TAGS_FIELD_LIMIT`] characters, marker included.
pub fn truncate_tags(tags: &str) -> Cow<'_, str> {
    if tags.chars().count() <= TAGS_FIELD_LIMIT {
        return Cow::Borrowed(tags);
    }

    let keep = TAGS_FIELD_LIMIT - TRUNCATION_MARKER.chars().count();
    let mut cut: String = tags.chars().take(keep).collect();
    cut.push_str(TRUNCATION_MARKER);
    Cow::Owned(cut)
}

/// Render one post as an embed, stamped with `now`.
pub fn build_embed(post: &Post, search: &SearchConfig, color: u32, now: DateTime<Utc>) -> Embed {
    let rating = if post.rating.is_empty() {
        "unknown".to_string()
    } else {
        post.rating.clone()
    };

    let mut fields = vec![EmbedField {
        name: "Rating".to_string(),
        value: rating,
        inline: false,
    }];
    // Empty field values are rejected by Discord.
    if !post.tags.trim().is_empty() {
        fields.push(EmbedField {
            name: "Tags".to_string(),
            value: truncate_tags(&post.tags).into_owned(),
            inline: false,
        });
    }

    Embed {
        title: format!("New art for tag: {}", search.key()),
        url: post_page_url(&post.id),
        color,
        image: EmbedImage {
            url: post.file_url.clone(),
        },
        fields,
        footer: EmbedFooter {
            text: FOOTER_TEXT.to_string(),
            icon_url: FOOTER_ICON_URL.to_string(),
        },
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

impl WebhookPayload {
    pub fn new(username: impl Into<String>, avatar_url: Option<String>, embed: Embed) -> Self {
        Self {
            username: username.into(),
            avatar_url,
            embeds: vec![embed],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn post() -> Post {
        Post {
            id: "103".to_string(),
            file_url: "https://img.example.com/103.png".to_string(),
            tags: "catgirl solo smile".to_string(),
            rating: "general".to_string(),
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn truncate_leaves_short_tags_alone() {
        assert!(matches!(truncate_tags("catgirl solo"), Cow::Borrowed("catgirl solo")));

        let exact = "a".repeat(TAGS_FIELD_LIMIT);
        assert_eq!(truncate_tags(&exact).len(), TAGS_FIELD_LIMIT);
    }

    #[test]
    fn truncate_1100_chars_to_exactly_1024() {
        let tags = "x".repeat(1100);
        let out = truncate_tags(&tags);

        assert_eq!(out.chars().count(), 1024);
        assert!(out.ends_with("..."));
        assert!(out.starts_with(&"x".repeat(1021)));
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        let tags = "猫".repeat(1100);
        let out = truncate_tags(&tags);
        assert_eq!(out.chars().count(), 1024);
    }

    proptest! {
        #[test]
        fn truncate_never_exceeds_limit(tags in ".{0,1500}") {
            let out = truncate_tags(&tags);
            prop_assert!(out.chars().count() <= TAGS_FIELD_LIMIT);
            if tags.chars().count() <= TAGS_FIELD_LIMIT {
                prop_assert_eq!(&*out, tags.as_str());
            }
        }
    }

    #[test]
    fn embed_carries_post_metadata() {
        let search = SearchConfig::new(["catgirl"], ["rating:general"]);
        let embed = build_embed(&post(), &search, 0xFF0000, fixed_now());

        assert_eq!(embed.title, "New art for tag: catgirl");
        assert_eq!(embed.url, "https://gelbooru.com/index.php?page=post&s=view&id=103");
        assert_eq!(embed.color, 0xFF0000);
        assert_eq!(embed.image.url, "https://img.example.com/103.png");
        assert_eq!(embed.fields[0].name, "Rating");
        assert_eq!(embed.fields[0].value, "general");
        assert!(!embed.fields[0].inline);
        assert_eq!(embed.fields[1].value, "catgirl solo smile");
        assert_eq!(embed.footer.text, FOOTER_TEXT);
        assert_eq!(embed.timestamp, "2026-03-01T12:30:00.000Z");
    }

    #[test]
    fn embed_omits_empty_tags_field() {
        let mut bare = post();
        bare.tags.clear();
        bare.rating.clear();
        let embed = build_embed(&bare, &SearchConfig::new(["catgirl"], Vec::<String>::new()), 0, fixed_now());

        assert_eq!(embed.fields.len(), 1);
        assert_eq!(embed.fields[0].value, "unknown");
    }

    #[test]
    fn payload_serialises_to_webhook_shape() {
        let search = SearchConfig::new(["catgirl"], Vec::<String>::new());
        let embed = build_embed(&post(), &search, 0x0099FF, fixed_now());
        let payload = WebhookPayload::new("Afrodita Art", None, embed);

        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["username"], "Afrodita Art");
        assert!(json.get("avatar_url").is_none());
        assert_eq!(json["embeds"][0]["color"], 0x0099FF);
        assert_eq!(json["embeds"][0]["image"]["url"], "https://img.example.com/103.png");
        assert_eq!(json["embeds"][0]["fields"][0]["inline"], false);
        assert_eq!(json["embeds"][0]["footer"]["icon_url"], FOOTER_ICON_URL);
    }
}
