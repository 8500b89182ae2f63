// src/exam/timer.rs

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Calls `on_tick` once per `period` until it returns false.
///
/// The first call happens one full period after spawning.
pub fn spawn_periodic<F, Fut>(period: Duration, mut on_tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // `interval` fires immediately; swallow that one.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !on_tick().await {
                break;
            }
        }
    })
}
