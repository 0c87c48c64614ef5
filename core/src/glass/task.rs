use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Shortest period a task will tick at; tokio rejects a zero interval
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// A cancellable repeating task.
///
/// The first tick fires one `period` after spawning. Ticks that would pile up
/// behind a slow body are skipped, not replayed. The task stops when the body
/// returns `false`, when [`PeriodicTask::stop`] is called, or when the handle
/// is dropped. Periods below [`MIN_PERIOD`] are raised to it.
pub struct PeriodicTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut body: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let period = if period < MIN_PERIOD {
            warn!(target: "periodic_task", task = name, "Period below minimum, clamping");
            MIN_PERIOD
        } else {
            period
        };
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !body().await {
                    debug!(target: "periodic_task", task = name, "Task body asked to stop");
                    break;
                }
            }
        });
        debug!(target: "periodic_task", task = name, period_ms = period.as_millis() as u64, "Task started");
        Self { name, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(self) {
        // Drop does the work
        drop(self);
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            debug!(target: "periodic_task", task = self.name, "Task stopped");
            self.handle.abort();
        }
    }
}
