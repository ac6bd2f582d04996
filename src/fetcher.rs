use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::error::FetchError;

/// HTTP client whose requests each race their own deadline.
#[derive(Clone)]
pub struct BoundedFetcher {
    client: Client,
}

impl BoundedFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent("IntelStream/1.0 (Security Feed Aggregator)")
            .build()?;

        Ok(Self { client })
    }

    /// Fetch `url` and return the raw body, failing with
    /// [`FetchError::Timeout`] if headers and body have not both arrived
    /// within `timeout`.
    ///
    /// Elapsing the deadline drops the in-flight request. There is no retry.
    pub async fn fetch_bounded(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        debug!("GET {} (deadline {:?})", url, timeout);

        let request = async {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::UpstreamStatus(status.to_string()));
            }
            let body = response.bytes().await?;
            Ok::<_, FetchError>(body.to_vec())
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        }
    }
}
