//! Timer service backed by a tokio runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eventsource_transport_traits::{Scheduler, Task, TransportError, TransportResult};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Runs delayed tasks on a tokio runtime.
///
/// Pending tasks are cancelled when [`Scheduler::shutdown`] is called; tasks
/// scheduled afterwards are dropped without running.
pub struct TokioScheduler {
    runtime: Handle,
    stopped: AtomicBool,
    /// Shutdown signal broadcaster
    shutdown_tx: broadcast::Sender<()>,
}

// Manual Debug implementation since broadcast::Sender doesn't implement Debug
impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .field("pending", &self.shutdown_tx.receiver_count())
            .finish()
    }
}

impl TokioScheduler {
    /// Creates a scheduler on the current tokio runtime.
    pub fn new() -> TransportResult<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            TransportError::ConfigurationError(format!("no tokio runtime available: {e}"))
        })?;
        Ok(Self::with_handle(runtime))
    }

    /// Creates a scheduler spawning onto `runtime`.
    pub fn with_handle(runtime: Handle) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            runtime,
            stopped: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Returns `true` once shut down.
    pub fn is_shutdown(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        if self.is_shutdown() {
            debug!("Scheduler is shut down, dropping task");
            return;
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    trace!("Scheduled task cancelled by shutdown");
                }
                () = tokio::time::sleep(delay) => task(),
            }
        });
    }

    fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        // No receivers just means nothing is pending.
        let _ = self.shutdown_tx.send(());
        debug!("Scheduler shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn counting_task(counter: &Arc<AtomicUsize>) -> Task {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_task_runs_after_delay() {
        let scheduler = TokioScheduler::new().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(Duration::from_millis(20), counting_task(&counter));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_tasks() {
        let scheduler = TokioScheduler::new().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(Duration::from_millis(100), counting_task(&counter));
        // Let the timer task subscribe and start sleeping.
        tokio::task::yield_now().await;
        scheduler.shutdown();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_shutdown());
    }

    #[tokio::test]
    async fn test_schedule_after_shutdown_is_dropped() {
        let scheduler = TokioScheduler::new().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.shutdown();
        scheduler.shutdown();
        scheduler.schedule(Duration::ZERO, counting_task(&counter));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        assert!(matches!(
            TokioScheduler::new(),
            Err(TransportError::ConfigurationError(_))
        ));
    }
}
