use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Url;
use serde::Deserialize;
use tracing::info;

use crate::config::{ConversionConfig, FeedSource};
use crate::error::{absorb_failure, FetchError};
use crate::fetcher::BoundedFetcher;
use crate::model::{EntryKind, RawItem, StreamEntry};
use crate::source::{SourceAdapter, Window};

#[derive(Debug, Deserialize)]
struct ConversionResponse {
    status: String,
    #[serde(default)]
    items: Vec<ConvertedItem>,
}

#[derive(Debug, Deserialize)]
struct ConvertedItem {
    title: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    content: Option<String>,
    description: Option<String>,
    link: Option<String>,
}

/// Fetches a list of named feeds through the feed-to-JSON conversion
/// service and tags every item with the feed it came from.
pub struct FeedAdapter {
    kind: EntryKind,
    sources: Vec<FeedSource>,
    fetcher: BoundedFetcher,
    endpoint: Url,
    conversion: ConversionConfig,
}

impl FeedAdapter {
    pub fn new(
        kind: EntryKind,
        sources: Vec<FeedSource>,
        fetcher: BoundedFetcher,
        conversion: ConversionConfig,
    ) -> anyhow::Result<Self> {
        let endpoint = Url::parse(&conversion.endpoint)?;
        Ok(Self {
            kind,
            sources,
            fetcher,
            endpoint,
            conversion,
        })
    }

    /// Conversion-service URL for one feed, with the feed URL encoded into
    /// the configured query parameter.
    pub fn conversion_url(&self, source: &FeedSource) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair(&self.conversion.query_param, &source.url);
        url
    }

    /// Fetch one feed. Any failure yields an empty list.
    pub async fn fetch_feed(&self, source: &FeedSource) -> Vec<RawItem> {
        absorb_failure(&source.name, self.try_fetch_feed(source).await)
    }

    async fn try_fetch_feed(&self, source: &FeedSource) -> Result<Vec<RawItem>, FetchError> {
        info!("Fetching feed: {} ({})", source.name, source.url);

        let url = self.conversion_url(source);
        let body = self
            .fetcher
            .fetch_bounded(url.as_str(), self.conversion.timeout())
            .await?;

        Self::parse_conversion(&body, source)
    }

    pub fn parse_conversion(body: &[u8], source: &FeedSource) -> Result<Vec<RawItem>, FetchError> {
        let response: ConversionResponse = serde_json::from_slice(body)?;
        if response.status != "ok" {
            return Err(FetchError::UpstreamStatus(response.status));
        }

        let items = response
            .items
            .into_iter()
            .map(|item| {
                let summary = item
                    .content
                    .filter(|content| !content.is_empty())
                    .or(item.description)
                    .unwrap_or_default();

                RawItem {
                    title: item.title.unwrap_or_else(|| "Untitled".to_string()),
                    published_at: item.pub_date.unwrap_or_default(),
                    summary,
                    link: item.link.filter(|link| !link.is_empty()),
                    source_name: source.name.clone(),
                }
            })
            .collect();

        Ok(items)
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    fn kind(&self) -> EntryKind {
        self.kind
    }

    async fn fetch(&self, _window: &Window) -> Vec<StreamEntry> {
        let results = join_all(self.sources.iter().map(|source| self.fetch_feed(source))).await;

        let entries: Vec<StreamEntry> = results
            .into_iter()
            .flatten()
            .filter_map(|item| item.into_entry(self.kind))
            .collect();

        info!(
            "Fetched {} {} items from {} feeds",
            entries.len(),
            self.kind.as_str(),
            self.sources.len()
        );
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(name: &str, url: &str) -> FeedSource {
        FeedSource {
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    fn adapter(server: &MockServer, sources: Vec<FeedSource>, timeout_ms: u64) -> FeedAdapter {
        let conversion = ConversionConfig {
            endpoint: format!("{}/v1/api.json", server.uri()),
            query_param: "rss_url".to_string(),
            timeout_ms,
        };
        FeedAdapter::new(
            EntryKind::News,
            sources,
            BoundedFetcher::new().unwrap(),
            conversion,
        )
        .unwrap()
    }

    fn ok_body(title: &str) -> serde_json::Value {
        serde_json::json!({
            "status": "ok",
            "items": [{
                "title": title,
                "pubDate": Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                "content": "<p>Body</p>",
                "description": "Short",
                "link": "https://example.com/a"
            }]
        })
    }

    mod parse_conversion_tests {
        use super::*;

        #[test]
        fn test_parse_ok_response() {
            let body = br#"{
                "status": "ok",
                "items": [
                    {"title": "A", "pubDate": "2024-12-09 12:00:00", "content": "full", "description": "short", "link": "https://a.example.com"},
                    {"title": "B", "pubDate": "2024-12-09 10:00:00", "content": "", "description": "only description"}
                ]
            }"#;

            let items =
                FeedAdapter::parse_conversion(body, &source("Dark Reading", "https://x")).unwrap();

            assert_eq!(items.len(), 2);
            assert_eq!(items[0].title, "A");
            assert_eq!(items[0].summary, "full");
            assert_eq!(items[0].source_name, "Dark Reading");
            assert_eq!(items[0].link.as_deref(), Some("https://a.example.com"));
            assert_eq!(items[1].summary, "only description");
            assert_eq!(items[1].published_at, "2024-12-09 10:00:00");
            assert!(items[1].link.is_none());
        }

        #[test]
        fn test_parse_error_status() {
            let body = br#"{"status": "error", "message": "rss_url is invalid"}"#;
            let result = FeedAdapter::parse_conversion(body, &source("Feed", "https://x"));
            assert!(matches!(result, Err(FetchError::UpstreamStatus(s)) if s == "error"));
        }

        #[test]
        fn test_parse_malformed_payload() {
            let result = FeedAdapter::parse_conversion(b"<html>", &source("Feed", "https://x"));
            assert!(matches!(result, Err(FetchError::MalformedResponse(_))));
        }

        #[test]
        fn test_parse_missing_title_defaults() {
            let body = br#"{"status": "ok", "items": [{"pubDate": "2024-12-09 12:00:00"}]}"#;
            let items = FeedAdapter::parse_conversion(body, &source("Feed", "https://x")).unwrap();
            assert_eq!(items[0].title, "Untitled");
            assert_eq!(items[0].summary, "");
        }
    }

    mod fetch_tests {
        use super::*;
        use std::time::Duration;

        #[tokio::test]
        async fn test_conversion_url_encodes_feed_url() {
            let server = MockServer::start().await;
            let adapter = adapter(&server, vec![], 5000);

            let url = adapter.conversion_url(&source("THN", "https://feeds.example.com/a?b=c"));

            assert!(url
                .as_str()
                .ends_with("/v1/api.json?rss_url=https%3A%2F%2Ffeeds.example.com%2Fa%3Fb%3Dc"));
        }

        #[tokio::test]
        async fn test_fetch_feed_tags_source() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/v1/api.json"))
                .and(query_param("rss_url", "https://krebsonsecurity.com/feed/"))
                .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("Krebs post")))
                .mount(&server)
                .await;

            let krebs = source("Krebs on Security", "https://krebsonsecurity.com/feed/");
            let adapter = adapter(&server, vec![krebs.clone()], 5000);

            let items = adapter.fetch_feed(&krebs).await;

            assert_eq!(items.len(), 1);
            assert_eq!(items[0].title, "Krebs post");
            assert_eq!(items[0].source_name, "Krebs on Security");
        }

        #[tokio::test]
        async fn test_failing_feed_does_not_block_siblings() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(query_param("rss_url", "https://good.example.com/feed"))
                .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("Good")))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(query_param("rss_url", "https://bad.example.com/feed"))
                .respond_with(ResponseTemplate::new(500))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(query_param("rss_url", "https://slow.example.com/feed"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(ok_body("Slow"))
                        .set_delay(Duration::from_millis(500)),
                )
                .mount(&server)
                .await;

            let adapter = adapter(
                &server,
                vec![
                    source("Good", "https://good.example.com/feed"),
                    source("Bad", "https://bad.example.com/feed"),
                    source("Slow", "https://slow.example.com/feed"),
                ],
                100,
            );
            let window = Window::ending_at(Utc::now(), 1);

            let entries = adapter.fetch(&window).await;

            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].identity(), "Good");
            assert_eq!(entries[0].kind(), EntryKind::News);
        }

        #[tokio::test]
        async fn test_unparseable_pub_date_is_dropped() {
            let server = MockServer::start().await;
            let mut body = ok_body("Dated");
            body["items"]
                .as_array_mut()
                .unwrap()
                .push(serde_json::json!({"title": "Undated", "pubDate": "sometime last week"}));
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .mount(&server)
                .await;

            let adapter = adapter(&server, vec![source("Feed", "https://feed.example.com")], 5000);
            let entries = adapter.fetch(&Window::ending_at(Utc::now(), 1)).await;

            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].identity(), "Dated");
        }

        #[tokio::test]
        async fn test_non_ok_status_yields_empty() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(serde_json::json!({"status": "error", "items": []})),
                )
                .mount(&server)
                .await;

            let feed = source("Feed", "https://feed.example.com");
            let adapter = adapter(&server, vec![feed.clone()], 5000);

            assert!(adapter.fetch_feed(&feed).await.is_empty());
        }
    }
}
