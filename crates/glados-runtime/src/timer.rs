//! Timer Driver: one [`Event::Timer`] per tick period.
//!
//! Ticks are produced by a `tokio` interval, independent of how busy the
//! router is. Missed ticks are delayed rather than bursted; the router's
//! due rule collapses any backlog anyway.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use glados_core::{Event, EventSender};

/// Handle to the ticking task.
pub struct TimerDriver {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TimerDriver {
    /// Starts ticking. The first tick fires one `period` from now.
    pub fn start(period: Duration, events: EventSender) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(period = ?period, "Timer driver started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        trace!("Tick");
                        if events.send(Event::Timer).is_err() {
                            debug!("Event queue closed, timer driver exiting");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Whether the ticking task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stops ticking and waits for the task. Safe to call twice.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Timer driver task failed");
            }
        }
    }
}

impl Drop for TimerDriver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glados_core::event_queue;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_period() {
        let (tx, mut rx) = event_queue();
        let mut timer = TimerDriver::start(Duration::from_secs(60), tx);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(62)).await;
        assert_eq!(rx.recv().await, Some(Event::Timer));
        assert_eq!(rx.recv().await, Some(Event::Timer));
        assert!(rx.try_recv().is_err());

        timer.stop().await;
        assert!(timer.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_prompt_and_idempotent() {
        let (tx, mut rx) = event_queue();
        let mut timer = TimerDriver::start(Duration::from_secs(3600), tx);

        let started = Instant::now();
        timer.stop().await;
        timer.stop().await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(timer.is_finished());
        drop(timer);
        assert_eq!(rx.recv().await, None);
    }
}
