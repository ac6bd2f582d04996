use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::selector::{CycleOutcome, WindowSelector};

/// Run a cycle now, then one per `interval` tick, forever.
///
/// Ticks are scheduled from the start time, not from the end of the previous
/// cycle. A tick that comes due while a cycle is still running is skipped.
pub async fn start_background_refresh(selector: Arc<WindowSelector>, interval: Duration) {
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // First tick completes immediately
    timer.tick().await;
    info!("Starting initial feed fetch");
    run_isolated(&selector).await;

    loop {
        timer.tick().await;
        info!("Starting scheduled feed refresh");
        run_isolated(&selector).await;
    }
}

/// Run one gated cycle on its own task so a panic inside it is logged
/// instead of ending the caller.
pub async fn run_isolated(selector: &Arc<WindowSelector>) -> Option<CycleOutcome> {
    let selector = selector.clone();
    match tokio::spawn(async move { selector.refresh().await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Refresh cycle aborted: {}", e);
            None
        }
    }
}
