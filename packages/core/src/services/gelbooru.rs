use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::config::SearchConfig;
use crate::services::{Post, PostSource, SourceError};

pub const GELBOORU_BASE_URL: &str = "https://gelbooru.com";

/// Posts requested per search per cycle.
pub const PAGE_SIZE: u32 = 6;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Canonical page for a post on the public site.
pub fn post_page_url(id: &str) -> String {
    format!("{}/index.php?page=post&s=view&id={}", GELBOORU_BASE_URL, id)
}

#[derive(Clone)]
pub struct GelbooruClient {
    base_url: String,
    user_id: String,
    api_key: String,
    http: Client,
}

impl GelbooruClient {
    pub fn new(user_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_base_url(GELBOORU_BASE_URL, user_id, api_key)
    }

    /// Point the client at a different host (used by tests).
    pub fn with_base_url(
        base_url: impl Into<String>,
        user_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: user_id.into(),
            api_key: api_key.into(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PostSource for GelbooruClient {
    async fn fetch_posts(&self, search: &SearchConfig) -> Result<Vec<Post>, SourceError> {
        let url = format!("{}/index.php", self.base_url);
        let tags = search.query();
        let limit = PAGE_SIZE.to_string();

        let response = self
            .http
            .get(&url)
            .query(&[
                ("page", "dapi"),
                ("s", "post"),
                ("q", "index"),
                ("json", "1"),
                ("tags", tags.as_str()),
                ("limit", limit.as_str()),
                ("pid", "0"),
                ("user_id", self.user_id.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        Ok(parse_posts(&body))
    }

    fn source_name(&self) -> &str {
        "Gelbooru"
    }
}

/// Extract the `post` array from a search response.
///
/// Anything that is not an object with an array-valued `post` field counts
/// as zero posts; Gelbooru omits the field entirely when nothing matches.
pub fn parse_posts(body: &str) -> Vec<Post> {
    let doc: Value = match serde_json::from_str(body) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::warn!("Search response is not JSON, treating as empty: {}", err);
            return Vec::new();
        }
    };

    let Some(items) = doc.get("post").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Post>(item.clone()) {
            Ok(post) => Some(post),
            Err(err) => {
                tracing::warn!("Skipping unreadable post entry: {}", err);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    const SEARCH_RESPONSE: &str = r#"{
        "@attributes": {"limit": 6, "offset": 0, "count": 3},
        "post": [
            {"id": 103, "file_url": "https://img.example.com/103.png", "tags": "catgirl solo", "rating": "general"},
            {"id": 102, "file_url": "https://img.example.com/102.png", "tags": "catgirl", "rating": "sensitive"},
            {"id": 101, "file_url": "https://img.example.com/101.png", "tags": "catgirl smile", "rating": "general"}
        ]
    }"#;

    fn search() -> SearchConfig {
        SearchConfig::new(["catgirl"], ["rating:general"])
    }

    async fn server_with(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.php"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn fetch_sends_query_and_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.php"))
            .and(query_param("page", "dapi"))
            .and(query_param("s", "post"))
            .and(query_param("q", "index"))
            .and(query_param("json", "1"))
            .and(query_param("tags", "catgirl rating:general"))
            .and(query_param("limit", "6"))
            .and(query_param("pid", "0"))
            .and(query_param("user_id", "42"))
            .and(query_param("api_key", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(SEARCH_RESPONSE, "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let client = GelbooruClient::with_base_url(server.uri(), "42", "key");
        let posts = client.fetch_posts(&search()).await.unwrap();

        let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["103", "102", "101"]);
        assert_eq!(posts[1].rating, "sensitive");
    }

    #[tokio::test]
    async fn missing_post_field_is_empty_not_error() {
        let server = server_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"@attributes": {"count": 0}}"#, "application/json"),
        )
        .await;

        let client = GelbooruClient::with_base_url(server.uri(), "42", "key");
        assert!(client.fetch_posts(&search()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_json_body_is_empty_not_error() {
        let server = server_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>")).await;

        let client = GelbooruClient::with_base_url(server.uri(), "42", "key");
        assert!(client.fetch_posts(&search()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn http_error_is_reported_as_failure() {
        let server = server_with(ResponseTemplate::new(503)).await;

        let client = GelbooruClient::with_base_url(server.uri(), "42", "key");
        let result = client.fetch_posts(&search()).await;

        assert!(matches!(result, Err(SourceError::Status { status: 503 })));
    }

    #[tokio::test]
    async fn unreachable_host_is_reported_as_failure() {
        let client = GelbooruClient::with_base_url("http://127.0.0.1:1", "42", "key");
        let result = client.fetch_posts(&search()).await;

        assert!(matches!(result, Err(SourceError::Network { .. })));
    }

    #[test]
    fn parse_posts_skips_entries_without_id() {
        let posts = parse_posts(r#"{"post": [{"id": 5, "tags": "a"}, {"tags": "b"}]}"#);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "5");
    }

    #[test]
    fn parse_posts_rejects_non_array_post_field() {
        assert!(parse_posts(r#"{"post": {"id": 5}}"#).is_empty());
        assert!(parse_posts("[]").is_empty());
    }

    #[test]
    fn post_page_url_points_at_public_site() {
        assert_eq!(
            post_page_url("103"),
            "https://gelbooru.com/index.php?page=post&s=view&id=103"
        );
    }
}
