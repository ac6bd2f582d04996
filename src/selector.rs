use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::accumulator::StreamAccumulator;
use crate::config::Config;
use crate::feeds::FeedAdapter;
use crate::fetcher::BoundedFetcher;
use crate::model::{EntryKind, StreamEntry};
use crate::notify::StreamObserver;
use crate::source::{SourceAdapter, Window};
use crate::vulnerability::VulnerabilityAdapter;

pub const DEFAULT_LADDER: [u32; 3] = [1, 3, 7];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Attempting(u32),
    Settled(u32),
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Settled { window_days: u32, count: usize },
    Exhausted,
}

/// The three adapters every attempt fans out to.
pub struct Sources {
    pub news: Arc<dyn SourceAdapter>,
    pub breach: Arc<dyn SourceAdapter>,
    pub vulnerabilities: Arc<dyn SourceAdapter>,
}

impl Sources {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let fetcher = BoundedFetcher::new()?;

        let news = FeedAdapter::new(
            EntryKind::News,
            config.news.clone(),
            fetcher.clone(),
            config.conversion.clone(),
        )?;
        let breach = FeedAdapter::new(
            EntryKind::Breach,
            config.breach.clone(),
            fetcher.clone(),
            config.conversion.clone(),
        )?;
        let vulnerabilities = VulnerabilityAdapter::new(fetcher, config.vulnerabilities.clone());

        Ok(Self {
            news: Arc::new(news),
            breach: Arc::new(breach),
            vulnerabilities: Arc::new(vulnerabilities),
        })
    }

    fn all(&self) -> [&Arc<dyn SourceAdapter>; 3] {
        [&self.news, &self.breach, &self.vulnerabilities]
    }
}

/// Clears the refresh flag when dropped, including during a panic unwind.
struct RefreshGuard<'a>(&'a AtomicBool);

impl<'a> RefreshGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Finds the narrowest window on the ladder that yields any entries.
///
/// Owns the stream accumulator; nothing else mutates it.
pub struct WindowSelector {
    sources: Sources,
    ladder: Vec<u32>,
    accumulator: Mutex<StreamAccumulator>,
    observer: Arc<dyn StreamObserver>,
    refreshing: AtomicBool,
}

impl WindowSelector {
    /// An empty `ladder` falls back to [`DEFAULT_LADDER`].
    pub fn new(sources: Sources, ladder: Vec<u32>, observer: Arc<dyn StreamObserver>) -> Self {
        let ladder = if ladder.is_empty() {
            DEFAULT_LADDER.to_vec()
        } else {
            ladder
        };

        Self {
            sources,
            ladder,
            accumulator: Mutex::new(StreamAccumulator::new(observer.clone())),
            observer,
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &Config, observer: Arc<dyn StreamObserver>) -> anyhow::Result<Self> {
        let sources = Sources::from_config(config)?;
        Ok(Self::new(sources, config.window_ladder.clone(), observer))
    }

    pub fn ladder(&self) -> &[u32] {
        &self.ladder
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Run one full cycle unless one is already running, in which case
    /// this returns `None` immediately.
    pub async fn refresh(&self) -> Option<CycleOutcome> {
        let Some(_guard) = RefreshGuard::acquire(&self.refreshing) else {
            info!("Refresh already in progress, skipping");
            return None;
        };

        Some(self.run_cycle().await)
    }

    /// Current stream. Waits for a running cycle to finish.
    pub async fn current_snapshot(&self) -> Vec<StreamEntry> {
        self.accumulator.lock().await.snapshot()
    }

    /// Transition out of `Attempting(window_days)` given its result count.
    pub fn next_state(&self, window_days: u32, count: usize) -> WindowState {
        if count > 0 {
            return WindowState::Settled(window_days);
        }

        self.ladder
            .iter()
            .copied()
            .find(|&days| days > window_days)
            .map_or(WindowState::Exhausted, WindowState::Attempting)
    }

    pub fn exhausted_message(&self) -> String {
        let widest = self.ladder.last().copied().unwrap_or_default();
        format!("No recent intelligence found (Last {} Days).", widest)
    }

    async fn run_cycle(&self) -> CycleOutcome {
        let mut accumulator = self.accumulator.lock().await;
        let mut state = WindowState::Attempting(self.ladder[0]);

        loop {
            state = match state {
                WindowState::Attempting(days) => {
                    let count = self.attempt(&mut accumulator, days).await;
                    let next = self.next_state(days, count);
                    if let WindowState::Attempting(wider) = next {
                        info!("{}-day window empty, extending to {} days", days, wider);
                    }
                    next
                }
                WindowState::Settled(days) => {
                    let count = accumulator.len();
                    info!("Settled on {}-day window with {} entries", days, count);
                    return CycleOutcome::Settled {
                        window_days: days,
                        count,
                    };
                }
                WindowState::Exhausted => {
                    let message = self.exhausted_message();
                    warn!("{}", message);
                    self.observer.on_exhausted(&message);
                    return CycleOutcome::Exhausted;
                }
            };
        }
    }

    /// One clean-slate fetch at `window_days`. Returns the stream size once
    /// all three sources have been merged.
    async fn attempt(&self, accumulator: &mut StreamAccumulator, window_days: u32) -> usize {
        info!("Attempting fetch with {} day window", window_days);
        self.observer.on_attempt(window_days);
        accumulator.clear();

        let window = Window::ending_at(Utc::now(), window_days);

        let mut pending: FuturesUnordered<_> = self
            .sources
            .all()
            .into_iter()
            .map(|adapter| async move { (adapter.kind(), adapter.fetch(&window).await) })
            .collect();

        while let Some((kind, entries)) = pending.next().await {
            let fetched = entries.len();
            let recent = window.retain_recent(entries);
            debug!(
                "{} of {} {} entries inside {}-day window",
                recent.len(),
                fetched,
                kind.as_str(),
                window_days
            );
            accumulator.merge(recent);
        }

        accumulator.len()
    }
}
