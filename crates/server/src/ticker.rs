//! Periodic timer that reports the real time elapsed between fires.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

/// Runs a callback every `period` until stopped or until the callback
/// returns `false`. Aborted when dropped.
#[derive(Debug)]
pub struct Ticker {
    handle: JoinHandle<()>,
}

impl Ticker {
    pub fn start<F, Fut>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut(Duration) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let start = Instant::now();
            let mut interval = interval_at(start + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = start;
            loop {
                interval.tick().await;
                let now = Instant::now();
                let elapsed = now - last;
                last = now;
                if !on_tick(elapsed).await {
                    break;
                }
            }
        });
        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
