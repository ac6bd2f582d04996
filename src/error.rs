use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Failures a single upstream fetch can end in.
///
/// None of these leave an adapter: [`absorb_failure`] turns every one of them
/// into "zero items from this source".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("upstream reported status '{0}'")]
    UpstreamStatus(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::MalformedResponse(err.to_string())
    }
}

/// Downgrade a failed source fetch to an empty result.
///
/// One dead source degrades the aggregate view; it never aborts the batch.
pub fn absorb_failure<T>(source: &str, result: Result<Vec<T>, FetchError>) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(e) => {
            warn!("Source '{}' contributed no items: {}", source, e);
            Vec::new()
        }
    }
}
