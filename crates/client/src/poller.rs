//! Status polling state machine.
//!
//! A [`PollingSession`] owns one poll loop for one submitted job:
//! `QUEUED -> RUNNING -> {SUCCESS | FAILED | ERROR}` with the two
//! orthogonal exits `TimedOut` and `Cancelled` reachable from any
//! non-terminal state. The session terminates exactly once and resets
//! its shared active flag exactly once, so an outside observer (e.g. a
//! cancel button handler) can safely watch for completion.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use taskbridge_core::types::{JobHandle, JobStatus};

use crate::service::JobService;

/// Tunable polling policy. These are defaults, not protocol constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between consecutive status requests.
    pub interval: Duration,
    /// Wall-clock limit measured from session start, independent of how
    /// many polls actually occurred.
    pub deadline: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3_000),
            deadline: Duration::from_millis(210_000),
        }
    }
}

/// Progress report passed to the optional callback on every
/// non-terminal poll.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// 1-based count of status requests issued so far.
    pub poll_count: u32,
    /// Status the service reported on this poll.
    pub status: JobStatus,
    /// Wall-clock time since the session started.
    pub elapsed: Duration,
}

/// Callback invoked with a [`ProgressUpdate`] per non-terminal poll.
/// A panicking callback is caught and logged, never allowed to abort
/// the loop.
pub type ProgressFn<'a> = &'a mut (dyn FnMut(ProgressUpdate) + Send);

/// How one polling session ended. Exactly one outcome per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The service reported `SUCCESS` / `COMPLETED`.
    Success { poll_count: u32, elapsed: Duration },
    /// The service reported failure (non-zero code or `FAILED`/`ERROR`
    /// status), with its message.
    Failed { message: String, poll_count: u32 },
    /// A status request failed at the HTTP level. Terminal: a broken
    /// status endpoint is not expected to self-heal within the horizon.
    TransportError { message: String, poll_count: u32 },
    /// The deadline elapsed before a terminal status.
    TimedOut { poll_count: u32, elapsed: Duration },
    /// The caller cancelled the session.
    Cancelled { poll_count: u32 },
}

/// One poll loop for one job. Created per submission, consumed by
/// [`run`](Self::run), never reused.
pub struct PollingSession {
    handle: JobHandle,
    config: PollConfig,
    cancel: CancellationToken,
    active: Arc<AtomicBool>,
}

impl PollingSession {
    pub fn new(handle: JobHandle, config: PollConfig, cancel: CancellationToken) -> Self {
        Self {
            handle,
            config,
            cancel,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag that is `true` exactly while [`run`](Self::run) is
    /// looping. Reset to `false` exactly once on termination.
    pub fn active_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.active)
    }

    /// Poll until a terminal state, timeout, or cancellation.
    ///
    /// Iteration order is fixed: the cancellation check runs at the top,
    /// before the network call, so a cancel request always wins a race
    /// with an in-flight status check (at worst one request completes
    /// after the cancel). The service `code` is authoritative: a
    /// non-zero code terminates as `Failed` even when the status string
    /// still says `RUNNING`.
    pub async fn run<S>(self, service: &S, mut progress: Option<ProgressFn<'_>>) -> PollOutcome
    where
        S: JobService + ?Sized,
    {
        self.active.store(true, Ordering::SeqCst);
        let start = tokio::time::Instant::now();
        let mut poll_count: u32 = 0;
        let mut last_status = JobStatus::Queued;

        tracing::debug!(
            task_id = %self.handle.task_id,
            interval_ms = self.config.interval.as_millis() as u64,
            deadline_ms = self.config.deadline.as_millis() as u64,
            "Polling started",
        );

        let outcome = loop {
            if self.cancel.is_cancelled() {
                break PollOutcome::Cancelled { poll_count };
            }

            poll_count += 1;
            let snapshot = match service.status(&self.handle.task_id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    break PollOutcome::TransportError {
                        message: e.to_string(),
                        poll_count,
                    };
                }
            };
            let elapsed = start.elapsed();
            last_status = snapshot.status.clone();

            tracing::debug!(
                task_id = %self.handle.task_id,
                poll_count,
                status = %snapshot.status,
                code = snapshot.code,
                elapsed_ms = elapsed.as_millis() as u64,
                "Poll tick",
            );

            if snapshot.code != 0 {
                break PollOutcome::Failed {
                    message: snapshot
                        .message
                        .unwrap_or_else(|| format!("service code {}", snapshot.code)),
                    poll_count,
                };
            }
            if snapshot.status.is_failure() {
                break PollOutcome::Failed {
                    message: snapshot
                        .message
                        .unwrap_or_else(|| format!("task reported {}", snapshot.status)),
                    poll_count,
                };
            }
            if snapshot.status.is_success() {
                break PollOutcome::Success {
                    poll_count,
                    elapsed,
                };
            }

            if let Some(callback) = progress.as_deref_mut() {
                let update = ProgressUpdate {
                    poll_count,
                    status: snapshot.status,
                    elapsed,
                };
                if std::panic::catch_unwind(AssertUnwindSafe(|| callback(update))).is_err() {
                    tracing::warn!(
                        task_id = %self.handle.task_id,
                        poll_count,
                        "Progress callback panicked; polling continues",
                    );
                }
            }

            if elapsed > self.config.deadline {
                break PollOutcome::TimedOut {
                    poll_count,
                    elapsed,
                };
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    break PollOutcome::Cancelled { poll_count };
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        };

        // Exactly-once reset, observable from outside the loop.
        let was_active = self.active.swap(false, Ordering::SeqCst);
        debug_assert!(was_active, "polling session terminated twice");

        tracing::info!(
            task_id = %self.handle.task_id,
            last_status = %last_status,
            poll_count,
            outcome = ?outcome,
            "Polling finished",
        );

        outcome
    }
}
