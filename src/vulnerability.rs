//! Date-ranged vulnerability (CVE) queries and record normalization.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::VulnerabilityConfig;
use crate::error::{absorb_failure, FetchError};
use crate::fetcher::BoundedFetcher;
use crate::model::{
    parse_vulnerability_timestamp, EntryKind, Severity, StreamEntry, VulnerabilityEntry,
};
use crate::source::{SourceAdapter, Window};

pub const UNKNOWN_SOFTWARE: &str = "Unknown Software";
pub const NO_DESCRIPTION: &str = "No description provided";

/// The query endpoint rejects zone-suffixed timestamps.
const QUERY_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

#[derive(Debug, Deserialize)]
struct VulnerabilityPage {
    vulnerabilities: Option<Vec<VulnerabilityItem>>,
}

#[derive(Debug, Deserialize)]
struct VulnerabilityItem {
    cve: CveRecord,
}

#[derive(Debug, Deserialize)]
pub struct CveRecord {
    pub id: String,
    pub published: String,
    #[serde(default)]
    pub descriptions: Vec<Description>,
    pub metrics: Option<Metrics>,
    pub configurations: Option<Vec<Configuration>>,
}

#[derive(Debug, Deserialize)]
pub struct Description {
    pub value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Metrics {
    #[serde(rename = "cvssMetricV31", default)]
    pub v31: Vec<Metric>,
    #[serde(rename = "cvssMetricV30", default)]
    pub v30: Vec<Metric>,
    #[serde(rename = "cvssMetricV2", default)]
    pub v2: Vec<Metric>,
}

#[derive(Debug, Deserialize)]
pub struct Metric {
    #[serde(rename = "cvssData")]
    pub cvss_data: Option<CvssData>,
}

#[derive(Debug, Deserialize)]
pub struct CvssData {
    #[serde(rename = "baseScore")]
    pub base_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub nodes: Vec<Node>,
}

#[derive(Debug, Deserialize)]
pub struct Node {
    #[serde(rename = "cpeMatch", default)]
    pub cpe_match: Vec<CpeMatch>,
}

#[derive(Debug, Deserialize)]
pub struct CpeMatch {
    pub criteria: Option<String>,
}

/// Score from the first metric family present, preferring v3.1, then v3.0,
/// then v2. Zero when none is.
pub fn severity_score(metrics: Option<&Metrics>) -> f64 {
    let Some(metrics) = metrics else {
        return 0.0;
    };

    [&metrics.v31, &metrics.v30, &metrics.v2]
        .into_iter()
        .find_map(|family| family.first())
        .and_then(|metric| metric.cvss_data.as_ref())
        .and_then(|data| data.base_score)
        .unwrap_or(0.0)
}

/// Vendor and product of the first CPE criteria string with at least five
/// fields, e.g. `cpe:2.3:a:microsoft:windows_10:...` is `MICROSOFT WINDOWS 10`.
pub fn software_label(configurations: Option<&[Configuration]>) -> String {
    configurations
        .into_iter()
        .flatten()
        .flat_map(|config| &config.nodes)
        .flat_map(|node| &node.cpe_match)
        .filter_map(|matcher| matcher.criteria.as_deref())
        .find_map(label_from_criteria)
        .unwrap_or_else(|| UNKNOWN_SOFTWARE.to_string())
}

fn label_from_criteria(criteria: &str) -> Option<String> {
    let parts: Vec<&str> = criteria.split(':').collect();
    if parts.len() < 5 {
        return None;
    }
    Some(
        format!("{} {}", parts[3], parts[4])
            .to_uppercase()
            .replace('_', " "),
    )
}

/// Normalize one record. `None` when its publish time cannot be read.
pub fn normalize(record: CveRecord) -> Option<VulnerabilityEntry> {
    let Some(published_at) = parse_vulnerability_timestamp(&record.published) else {
        warn!(
            "Dropping {}: unreadable publish time '{}'",
            record.id, record.published
        );
        return None;
    };

    let severity = Severity::new(severity_score(record.metrics.as_ref()));
    let software = software_label(record.configurations.as_deref());
    let description = record
        .descriptions
        .into_iter()
        .next()
        .and_then(|d| d.value)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| NO_DESCRIPTION.to_string());

    Some(VulnerabilityEntry {
        id: record.id,
        published_at,
        description,
        severity,
        software,
    })
}

pub fn format_query_timestamp(at: DateTime<Utc>) -> String {
    at.format(QUERY_TIMESTAMP_FORMAT).to_string()
}

pub struct VulnerabilityAdapter {
    fetcher: BoundedFetcher,
    config: VulnerabilityConfig,
}

impl VulnerabilityAdapter {
    pub fn new(fetcher: BoundedFetcher, config: VulnerabilityConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn query_url(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        format!(
            "{}?pubStartDate={}&pubEndDate={}",
            self.config.endpoint,
            format_query_timestamp(start),
            format_query_timestamp(end)
        )
    }

    /// Records published between `start` and `end`. Any failure yields an
    /// empty list.
    pub async fn fetch_vulnerabilities(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<StreamEntry> {
        absorb_failure(
            "vulnerabilities",
            self.try_fetch_vulnerabilities(start, end).await,
        )
    }

    async fn try_fetch_vulnerabilities(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StreamEntry>, FetchError> {
        let url = self.query_url(start, end);
        info!("Querying vulnerabilities: {}", url);

        let body = self.fetcher.fetch_bounded(&url, self.config.timeout()).await?;
        let entries = Self::parse_page(&body)?;

        info!("Fetched {} vulnerabilities", entries.len());
        Ok(entries)
    }

    pub fn parse_page(body: &[u8]) -> Result<Vec<StreamEntry>, FetchError> {
        let page: VulnerabilityPage = serde_json::from_slice(body)?;

        Ok(page
            .vulnerabilities
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| normalize(item.cve))
            .map(StreamEntry::Vulnerability)
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for VulnerabilityAdapter {
    fn kind(&self) -> EntryKind {
        EntryKind::Vulnerability
    }

    async fn fetch(&self, window: &Window) -> Vec<StreamEntry> {
        self.fetch_vulnerabilities(window.start, window.end).await
    }
}
