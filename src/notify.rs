use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::StreamEntry;

/// Presentation-side receiver of stream updates.
///
/// Calls happen inside a merge, so implementations must return quickly and
/// must not call back into the pipeline.
pub trait StreamObserver: Send + Sync {
    /// The accumulator changed; `entries` is the complete ordered stream.
    fn on_stream_updated(&self, entries: &[StreamEntry]);

    /// Every window on the ladder came back empty.
    fn on_exhausted(&self, message: &str);

    /// A fetch attempt at `window_days` is starting.
    fn on_attempt(&self, _window_days: u32) {}
}

/// Latest published state of the stream, as read by the HTTP surface.
#[derive(Debug, Clone, Default)]
pub struct BoardState {
    pub entries: Arc<Vec<StreamEntry>>,
    pub window_days: Option<u32>,
    pub message: Option<String>,
}

/// Observer that keeps the most recent snapshot for readers.
#[derive(Debug, Default)]
pub struct StreamBoard {
    state: RwLock<BoardState>,
}

impl StreamBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BoardState {
        self.state.read().clone()
    }
}

impl StreamObserver for StreamBoard {
    fn on_stream_updated(&self, entries: &[StreamEntry]) {
        let mut state = self.state.write();
        state.entries = Arc::new(entries.to_vec());
        state.message = None;
    }

    fn on_exhausted(&self, message: &str) {
        let mut state = self.state.write();
        state.entries = Arc::new(Vec::new());
        state.message = Some(message.to_string());
    }

    fn on_attempt(&self, window_days: u32) {
        self.state.write().window_days = Some(window_days);
    }
}

/// Display label for a look-back window.
pub fn window_label(window_days: u32) -> String {
    if window_days == 1 {
        "LAST 24H".to_string()
    } else {
        format!("LAST {} DAYS", window_days)
    }
}
