//! Countdown tick producers.
//!
//! A `TickHandle` owns whatever produces ticks for one running attempt.
//! Dropping or cancelling the handle stops the producer, so the controller
//! only has to drop the handle when it leaves the in-progress phase.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Channel depth between a producer and its handle.
const TICK_BUFFER: usize = 8;

/// Source of countdown ticks. Acquired once per attempt.
pub trait TickSource: Send + Sync {
    fn acquire(&self) -> TickHandle;
}

/// Owner of a running tick producer.
#[derive(Debug)]
pub struct TickHandle {
    ticks: mpsc::Receiver<()>,
    task: Option<JoinHandle<()>>,
}

impl TickHandle {
    #[must_use]
    pub fn new(ticks: mpsc::Receiver<()>, task: Option<JoinHandle<()>>) -> Self {
        Self { ticks, task }
    }

    /// A handle that never yields a tick.
    #[must_use]
    pub fn inert() -> Self {
        let (_tx, rx) = mpsc::channel(1);
        Self::new(rx, None)
    }

    /// Wait for the next tick. `None` once the producer is gone.
    pub async fn next(&mut self) -> Option<()> {
        self.ticks.recv().await
    }

    /// Stop the producer and release the handle.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for TickHandle {
    fn drop(&mut self) {
        self.ticks.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Wall-clock ticks from a tokio interval, one per `period`.
#[derive(Debug, Clone, Copy)]
pub struct IntervalTicks {
    period: Duration,
}

impl IntervalTicks {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    #[must_use]
    pub fn every_second() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Default for IntervalTicks {
    fn default() -> Self {
        Self::every_second()
    }
}

impl TickSource for IntervalTicks {
    fn acquire(&self) -> TickHandle {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no tokio runtime available; countdown will not run");
            return TickHandle::inert();
        };

        let (tx, rx) = mpsc::channel(TICK_BUFFER);
        let period = self.period;
        let task = runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                interval.tick().await;
                if tx.send(()).await.is_err() {
                    break;
                }
            }
        });
        TickHandle::new(rx, Some(task))
    }
}

/// Caller-driven ticks for tests and scripted runs.
///
/// Clones share state: acquire through the controller, push from the test.
#[derive(Debug, Clone, Default)]
pub struct ManualTicks {
    senders: Arc<Mutex<Vec<mpsc::Sender<()>>>>,
}

impl ManualTicks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one tick to the most recently acquired live handle.
    ///
    /// Returns `false` when no handle is live or its buffer is full.
    pub fn push(&self) -> bool {
        let Ok(senders) = self.senders.lock() else {
            return false;
        };
        senders
            .iter()
            .rev()
            .find(|tx| !tx.is_closed())
            .is_some_and(|tx| tx.try_send(()).is_ok())
    }

    /// Number of handles acquired and not yet released.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.senders
            .lock()
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Number of handles ever acquired.
    #[must_use]
    pub fn acquired(&self) -> usize {
        self.senders.lock().map(|senders| senders.len()).unwrap_or(0)
    }
}

impl TickSource for ManualTicks {
    fn acquire(&self) -> TickHandle {
        let (tx, rx) = mpsc::channel(TICK_BUFFER);
        if let Ok(mut senders) = self.senders.lock() {
            senders.push(tx);
        }
        TickHandle::new(rx, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_ticks_reach_latest_handle() {
        let source = ManualTicks::new();
        let mut handle = source.acquire();
        assert_eq!(source.live_handles(), 1);

        assert!(source.push());
        assert_eq!(handle.next().await, Some(()));
    }

    #[tokio::test]
    async fn dropping_handle_releases_producer() {
        let source = ManualTicks::new();
        let handle = source.acquire();
        handle.cancel();

        assert_eq!(source.live_handles(), 0);
        assert_eq!(source.acquired(), 1);
        assert!(!source.push());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_ticks_once_per_period() {
        let mut handle = IntervalTicks::every_second().acquire();
        let started = Instant::now();

        assert_eq!(handle.next().await, Some(()));
        assert_eq!(handle.next().await, Some(()));
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn interval_without_runtime_is_inert() {
        let handle = IntervalTicks::every_second().acquire();
        assert!(handle.task.is_none());
    }
}
