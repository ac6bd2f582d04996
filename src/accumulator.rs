use std::collections::HashSet;
use std::sync::Arc;

use crate::model::StreamEntry;
use crate::notify::StreamObserver;

/// The de-duplicated, newest-first stream.
///
/// Identity is unique across kinds and the list is sorted descending by
/// timestamp after every merge.
pub struct StreamAccumulator {
    entries: Vec<StreamEntry>,
    observer: Arc<dyn StreamObserver>,
}

impl StreamAccumulator {
    pub fn new(observer: Arc<dyn StreamObserver>) -> Self {
        Self {
            entries: Vec::new(),
            observer,
        }
    }

    /// Add `incoming`, re-sort, drop repeated identities and notify the
    /// observer with the full stream.
    ///
    /// Sorting happens before de-duplication, so among entries sharing an
    /// identity the newest one survives. The sort is stable and existing
    /// entries precede new ones, so an unchanged re-merge is a no-op.
    pub fn merge(&mut self, incoming: Vec<StreamEntry>) {
        self.entries.extend(incoming);
        self.entries
            .sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));

        let mut seen = HashSet::with_capacity(self.entries.len());
        self.entries
            .retain(|entry| seen.insert(entry.identity().to_string()));

        self.observer.on_stream_updated(&self.entries);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn snapshot(&self) -> Vec<StreamEntry> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FeedEntry, Severity, VulnerabilityEntry};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        updates: Mutex<Vec<Vec<String>>>,
    }

    impl StreamObserver for Recorder {
        fn on_stream_updated(&self, entries: &[StreamEntry]) {
            self.updates
                .lock()
                .push(entries.iter().map(|e| e.identity().to_string()).collect());
        }

        fn on_exhausted(&self, _message: &str) {}
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 9, 12, 0, 0).unwrap()
    }

    fn news(title: &str, hours_ago: i64) -> StreamEntry {
        StreamEntry::News(FeedEntry {
            title: title.to_string(),
            published_at: base() - Duration::hours(hours_ago),
            source: "The Hacker News".to_string(),
            summary: format!("{} summary", title),
            link: None,
        })
    }

    fn breach(title: &str, hours_ago: i64) -> StreamEntry {
        StreamEntry::Breach(FeedEntry {
            title: title.to_string(),
            published_at: base() - Duration::hours(hours_ago),
            source: "DataBreaches.net".to_string(),
            summary: String::new(),
            link: None,
        })
    }

    fn cve(id: &str, hours_ago: i64, description: &str) -> StreamEntry {
        StreamEntry::Vulnerability(VulnerabilityEntry {
            id: id.to_string(),
            published_at: base() - Duration::hours(hours_ago),
            description: description.to_string(),
            severity: Severity::new(7.5),
            software: "Unknown Software".to_string(),
        })
    }

    fn accumulator() -> (StreamAccumulator, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (StreamAccumulator::new(recorder.clone()), recorder)
    }

    fn assert_sorted_desc(entries: &[StreamEntry]) {
        for pair in entries.windows(2) {
            assert!(pair[0].timestamp() >= pair[1].timestamp());
        }
    }

    fn identities(acc: &StreamAccumulator) -> Vec<String> {
        acc.snapshot()
            .iter()
            .map(|e| e.identity().to_string())
            .collect()
    }

    mod ordering_tests {
        use super::*;

        #[test]
        fn test_merge_sorts_newest_first() {
            let (mut acc, _) = accumulator();
            acc.merge(vec![news("old", 10), news("new", 1), news("mid", 5)]);
            assert_eq!(identities(&acc), vec!["new", "mid", "old"]);
        }

        #[test]
        fn test_sorted_for_any_interleaving() {
            let batches = [
                vec![news("a", 3), news("b", 20)],
                vec![breach("c", 1), breach("d", 30)],
                vec![cve("CVE-1", 2, "x"), cve("CVE-2", 12, "y")],
            ];
            let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

            let mut results = Vec::new();
            for order in orders {
                let (mut acc, _) = accumulator();
                for index in order {
                    acc.merge(batches[index].clone());
                    assert_sorted_desc(&acc.snapshot());
                }
                results.push(identities(&acc));
            }

            assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
            assert_eq!(results[0], vec!["c", "CVE-1", "a", "CVE-2", "b", "d"]);
        }
    }

    mod dedup_tests {
        use super::*;

        #[test]
        fn test_duplicate_keeps_newest_timestamp() {
            let (mut acc, _) = accumulator();
            acc.merge(vec![news("Same story", 8)]);
            acc.merge(vec![news("Same story", 2), news("Same story", 5)]);

            let snapshot = acc.snapshot();
            assert_eq!(snapshot.len(), 1);
            assert_eq!(snapshot[0].timestamp(), base() - Duration::hours(2));
        }

        #[test]
        fn test_identity_shared_across_kinds() {
            let (mut acc, _) = accumulator();
            acc.merge(vec![news("Shared headline", 4)]);
            acc.merge(vec![breach("Shared headline", 1)]);

            let snapshot = acc.snapshot();
            assert_eq!(snapshot.len(), 1);
            assert_eq!(snapshot[0].kind(), crate::model::EntryKind::Breach);
        }

        #[test]
        fn test_duplicate_vulnerability_keeps_later_content() {
            let (mut acc, _) = accumulator();
            acc.merge(vec![cve("CVE-2024-0001", 20, "initial analysis")]);
            acc.merge(vec![cve("CVE-2024-0001", 3, "updated analysis")]);

            let snapshot = acc.snapshot();
            assert_eq!(snapshot.len(), 1);
            assert_eq!(snapshot[0].body(), "updated analysis");
        }

        #[test]
        fn test_remerge_unchanged_is_idempotent() {
            let (mut acc, _) = accumulator();
            let batch = vec![news("a", 1), breach("b", 2), cve("CVE-3", 3, "z")];
            acc.merge(batch.clone());
            let before = acc.snapshot();

            acc.merge(batch);

            assert_eq!(acc.snapshot(), before);
        }

        #[test]
        fn test_equal_timestamps_keep_existing_entry() {
            let (mut acc, _) = accumulator();
            acc.merge(vec![cve("CVE-7", 1, "first")]);
            acc.merge(vec![cve("CVE-7", 1, "second")]);

            assert_eq!(acc.snapshot()[0].body(), "first");
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn test_every_merge_notifies_full_stream() {
            let (mut acc, recorder) = accumulator();
            acc.merge(vec![news("a", 2)]);
            acc.merge(vec![]);
            acc.merge(vec![news("b", 1)]);

            let updates = recorder.updates.lock();
            assert_eq!(updates.len(), 3);
            assert_eq!(updates[1], vec!["a"]);
            assert_eq!(updates[2], vec!["b", "a"]);
        }

        #[test]
        fn test_clear_empties_without_notifying() {
            let (mut acc, recorder) = accumulator();
            acc.merge(vec![news("a", 2), news("b", 3)]);
            assert_eq!(acc.len(), 2);

            acc.clear();

            assert!(acc.is_empty());
            assert_eq!(recorder.updates.lock().len(), 1);
        }
    }
}
