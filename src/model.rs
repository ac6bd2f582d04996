//! Stream entries and the items they are built from.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::warn;

/// Label shown as the source of every vulnerability entry.
pub const VULNERABILITY_SOURCE: &str = "NVD ALERT";

const NVD_DETAIL_URL: &str = "https://nvd.nist.gov/vuln/detail/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    News,
    Breach,
    Vulnerability,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::News => "news",
            EntryKind::Breach => "breach",
            EntryKind::Vulnerability => "vulnerability",
        }
    }
}

/// A feed item as the conversion service hands it over, tagged with the
/// name of the feed it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub title: String,
    pub published_at: String,
    pub summary: String,
    pub link: Option<String>,
    pub source_name: String,
}

impl RawItem {
    /// Convert into a stream entry of `kind`.
    ///
    /// Returns `None` when the timestamp cannot be parsed, or when `kind` is
    /// [`EntryKind::Vulnerability`], which feeds never produce.
    pub fn into_entry(self, kind: EntryKind) -> Option<StreamEntry> {
        let Some(published_at) = parse_feed_timestamp(&self.published_at) else {
            warn!(
                "Dropping '{}' from {}: unparseable timestamp '{}'",
                self.title, self.source_name, self.published_at
            );
            return None;
        };
        let entry = FeedEntry {
            title: self.title,
            published_at,
            source: self.source_name,
            summary: self.summary,
            link: self.link,
        };

        match kind {
            EntryKind::News => Some(StreamEntry::News(entry)),
            EntryKind::Breach => Some(StreamEntry::Breach(entry)),
            EntryKind::Vulnerability => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedEntry {
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub source: String,
    pub summary: String,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VulnerabilityEntry {
    pub id: String,
    pub published_at: DateTime<Utc>,
    pub description: String,
    pub severity: Severity,
    pub software: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Critical,
    High,
    Medium,
}

impl Tier {
    pub fn from_score(score: f64) -> Self {
        if score >= 9.0 {
            Tier::Critical
        } else if score >= 7.0 {
            Tier::High
        } else {
            Tier::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Critical => "CRITICAL",
            Tier::High => "HIGH",
            Tier::Medium => "MEDIUM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Severity {
    pub score: f64,
    pub tier: Tier,
}

impl Severity {
    /// Scores outside [0, 10] are clamped.
    pub fn new(score: f64) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 10.0) };
        Self {
            score,
            tier: Tier::from_score(score),
        }
    }
}

/// One entry of the unified stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StreamEntry {
    News(FeedEntry),
    Breach(FeedEntry),
    Vulnerability(VulnerabilityEntry),
}

impl StreamEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            StreamEntry::News(_) => EntryKind::News,
            StreamEntry::Breach(_) => EntryKind::Breach,
            StreamEntry::Vulnerability(_) => EntryKind::Vulnerability,
        }
    }

    /// De-duplication key, shared across all kinds.
    pub fn identity(&self) -> &str {
        match self {
            StreamEntry::News(item) | StreamEntry::Breach(item) => &item.title,
            StreamEntry::Vulnerability(vuln) => &vuln.id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            StreamEntry::News(item) | StreamEntry::Breach(item) => item.published_at,
            StreamEntry::Vulnerability(vuln) => vuln.published_at,
        }
    }

    pub fn display_source(&self) -> &str {
        match self {
            StreamEntry::News(item) | StreamEntry::Breach(item) => &item.source,
            StreamEntry::Vulnerability(_) => VULNERABILITY_SOURCE,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            StreamEntry::News(item) | StreamEntry::Breach(item) => &item.summary,
            StreamEntry::Vulnerability(vuln) => &vuln.description,
        }
    }

    pub fn link(&self) -> Option<String> {
        match self {
            StreamEntry::News(item) | StreamEntry::Breach(item) => item.link.clone(),
            StreamEntry::Vulnerability(vuln) => Some(format!("{}{}", NVD_DETAIL_URL, vuln.id)),
        }
    }
}

/// Parse a feed `pubDate`: RFC 3339, RFC 2822, or the converter's naive
/// `YYYY-MM-DD HH:MM:SS`, which is UTC.
pub fn parse_feed_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parse a vulnerability `published` value, which carries no zone suffix
/// and is UTC.
pub fn parse_vulnerability_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
