//! Cancellable repeating task driving inbox poll cycles.
//!
//! At most one timer is active per [`Poller`]: starting it again cancels the previous
//! task first. Stopping only prevents further ticks; a cycle already in progress runs
//! to completion.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Whether a poller has an active timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// No timer.
    Idle,
    /// A timer is active.
    Running,
}

/// Owner of the periodic poll task.
///
/// Dropping the poller stops its task.
#[derive(Debug, Default)]
pub struct Poller {
    active: Option<PollerHandle>,
}

#[derive(Debug)]
struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    fn cancel(self) {
        // The task may already have exited; a closed channel is fine
        let _ = self.shutdown.send(true);
        drop(self.task);
    }
}

impl Poller {
    /// Creates an idle poller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts calling `tick` every `interval`, cancelling any previous timer.
    ///
    /// The first tick fires one `interval` after this call. Ticks never overlap: if a
    /// cycle outlasts the interval, the next one is delayed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(&mut self, interval: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop();

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => tick().await,
                }
            }

            debug!("Poller stopped");
        });

        debug!(interval_ms = interval.as_millis(), "Poller started");
        self.active = Some(PollerHandle { shutdown, task });
    }

    /// Stops the timer. Returns `true` if one was active.
    pub fn stop(&mut self) -> bool {
        match self.active.take() {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> PollerState {
        match &self.active {
            Some(handle) if !handle.task.is_finished() => PollerState::Running,
            _ => PollerState::Idle,
        }
    }

    /// Returns `true` if a timer is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == PollerState::Running
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
