//! The periodic reaper (§6): sweeps finished subscriber sessions out of the
//! registry on a fixed cadence so a long-running server doesn't accumulate
//! dead task handles between disconnects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::broadcaster::Broadcaster;
use crate::config;

pub async fn run(broadcaster: Broadcaster, shutdown: Arc<AtomicBool>) {
    let mut interval = tokio::time::interval(config::REAP_INTERVAL);
    loop {
        interval.tick().await;
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let before = broadcaster.session_count().await;
        broadcaster.reap_finished().await;
        let after = broadcaster.session_count().await;
        if before != after {
            debug!(reaped = before - after, remaining = after, "reaped finished sessions");
        }
    }
}
