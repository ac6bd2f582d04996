use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::model::{EntryKind, StreamEntry};

/// A look-back horizon ending at a fixed instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub days: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn ending_at(end: DateTime<Utc>, days: u32) -> Self {
        let start = end
            .checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { days, start, end }
    }

    /// Strictly newer than the window start.
    pub fn admits(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp > self.start
    }

    /// Keep only entries inside the window; sources may answer more loosely
    /// than asked.
    pub fn retain_recent(&self, mut entries: Vec<StreamEntry>) -> Vec<StreamEntry> {
        entries.retain(|entry| self.admits(entry.timestamp()));
        entries
    }
}

/// Uniform fetch contract the window selector drives.
///
/// Implementations never fail: a source that could not be reached
/// contributes an empty list.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> EntryKind;

    async fn fetch(&self, window: &Window) -> Vec<StreamEntry>;
}
