//! Driver spawns and manages processing tasks

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

use super::processor::{ProcessResult, Processor};

/// Default wait after a [`ProcessResult::Noop`].
pub const DEFAULT_NOOP_DELAY: Duration = Duration::from_millis(100);

/// Consecutive processing errors after which the driver gives up.
pub const MAX_ERRORS: u32 = 10;

/// Lifecycle of a driven processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Running,
    /// The processor returned [`ProcessResult::Finish`].
    Finished,
    /// Stopped through the cancellation token.
    Stopped,
    /// Too many consecutive errors.
    Failed,
}

/// Handle to a spawned processing task
pub struct DriverHandle {
    /// Receiver for lifecycle updates
    pub state: watch::Receiver<DriverState>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DriverHandle {
    /// Requests shutdown; the current `process` call is abandoned at its next await point.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        *self.state.borrow() == DriverState::Running
    }

    /// Waits for the task to end and returns how it ended.
    pub async fn join(self) -> DriverState {
        if let Err(error) = self.task.await {
            error!(%error, "Processing task panicked");
            return DriverState::Failed;
        }
        *self.state.borrow()
    }
}

/// Runs a [`Processor`] in a loop on the tokio runtime.
pub struct Driver;

impl Driver {
    /// Spawn a processing task with the default noop delay
    pub fn spawn<P: Processor>(processor: P) -> DriverHandle {
        Self::spawn_with_delay(processor, DEFAULT_NOOP_DELAY)
    }

    pub fn spawn_with_delay<P: Processor>(processor: P, noop_delay: Duration) -> DriverHandle {
        let (state_tx, state_rx) = watch::channel(DriverState::Running);
        let cancel = CancellationToken::new();
        let cancel_task = cancel.clone();
        let task = tokio::spawn(async move {
            let state = Self::service_task(processor, noop_delay, cancel_task).await;
            state_tx.send_replace(state);
        });
        DriverHandle { state: state_rx, cancel, task }
    }

    async fn service_task<P: Processor>(
        mut processor: P,
        noop_delay: Duration,
        cancel: CancellationToken,
    ) -> DriverState {
        info!("Processing task started");
        let mut iterations = 0u64;
        let mut error_count = 0u32;

        let state = loop {
            if cancel.is_cancelled() {
                break DriverState::Stopped;
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => break DriverState::Stopped,
                result = processor.process() => result,
            };

            match result {
                Ok(ProcessResult::Normal) => {
                    iterations += 1;
                    error_count = 0;
                    // Let other tasks run between busy iterations
                    tokio::task::yield_now().await;
                }
                Ok(ProcessResult::Noop) => {
                    error_count = 0;
                    trace!(delay_ms = noop_delay.as_millis() as u64, "Nothing to process");
                    tokio::select! {
                        _ = cancel.cancelled() => break DriverState::Stopped,
                        _ = tokio::time::sleep(noop_delay) => {}
                    }
                }
                Ok(ProcessResult::Finish) => {
                    iterations += 1;
                    break DriverState::Finished;
                }
                Err(e) => {
                    error_count += 1;
                    error!("Processing error ({}/{}): {}", error_count, MAX_ERRORS, e);
                    if error_count >= MAX_ERRORS {
                        error!("Too many processing errors, shutting down");
                        break DriverState::Failed;
                    }
                    // Exponential backoff: 100ms, 200ms, 400ms, ...
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break DriverState::Stopped,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        };

        processor.stopped().await;
        info!(?state, iterations, "Processing task ended");
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Countdown {
        remaining: usize,
        stopped: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Processor for Countdown {
        async fn process(&mut self) -> crate::Result<ProcessResult> {
            if self.remaining == 0 {
                return Ok(ProcessResult::Finish);
            }
            self.remaining -= 1;
            Ok(if self.remaining % 2 == 0 { ProcessResult::Normal } else { ProcessResult::Noop })
        }

        async fn stopped(&mut self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl Processor for Failing {
        async fn process(&mut self) -> crate::Result<ProcessResult> {
            Err(PortError::StreamInput { reason: "always".into() })
        }
    }

    #[tokio::test]
    async fn finishes_when_processor_does() {
        let _ = tracing_subscriber::fmt::try_init();
        let stopped = Arc::new(AtomicUsize::new(0));
        let handle = Driver::spawn_with_delay(
            Countdown { remaining: 4, stopped: Arc::clone(&stopped) },
            Duration::from_millis(1),
        );
        assert_eq!(handle.join().await, DriverState::Finished);
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_cancels_idle_loop() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let handle = Driver::spawn_with_delay(
            Countdown { remaining: usize::MAX, stopped: Arc::clone(&stopped) },
            Duration::from_secs(60),
        );
        tokio::task::yield_now().await;
        assert!(handle.is_running());
        handle.stop();
        assert_eq!(handle.join().await, DriverState::Stopped);
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_repeated_errors() {
        let handle = Driver::spawn(Failing);
        assert_eq!(handle.join().await, DriverState::Failed);
    }
}
