//! Named periodic tasks sharing a single shutdown signal.
//!
//! Each task runs its closure on a fixed interval and finishes its current
//! iteration when the shutdown watch flips; nothing is aborted mid-write.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct Scheduler {
    shutdown: watch::Receiver<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Spawn a named periodic task. The first run happens one full period
    /// after startup.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, period: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut shutdown = self.shutdown.clone();
        info!(task = name, ?period, "scheduling periodic task");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval fires immediately; swallow the first tick.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!(task = name, "periodic task tick");
                        task().await;
                    }
                    _ = shutdown.changed() => {
                        debug!(task = name, "periodic task stopped");
                        return;
                    }
                }
            }
        });
        self.handles.push((name, handle));
    }

    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Await every task after the shutdown signal has been sent.
    pub async fn join_all(self) {
        for (name, handle) in self.handles {
            if let Err(err) = handle.await {
                tracing::warn!(task = name, %err, "periodic task join failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn tasks_tick_and_stop_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let mut scheduler = Scheduler::new(rx);
        let runs = Arc::new(AtomicU32::new(0));

        let counter = runs.clone();
        scheduler.spawn("counter", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(scheduler.task_count(), 1);

        // Let the task install its timer, then step through several periods.
        tokio::task::yield_now().await;
        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(10)).await;
            tokio::task::yield_now().await;
        }
        assert!(runs.load(Ordering::SeqCst) >= 2);

        tx.send(true).unwrap();
        scheduler.join_all().await;
    }
}
