//! Render deadline enforcement.
//!
//! One background task for the lifetime of the handler. Each pass snapshots
//! the in-flight jobs and waits on their completion signals, each bounded by
//! the job's own deadline (`started_at + max_render`). A job still running at
//! its deadline is dropped from tracking so the next miss can start a new
//! render. The job itself is not cancelled: it keeps its renderer and may
//! still populate the cache late. When nothing is in flight the task sleeps
//! until a job is registered.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::tracker::{InFlightJob, InFlightTracker};

/// Reaps render jobs that exceed the maximum render duration.
pub struct Watchdog {
    tracker: Arc<InFlightTracker>,
    max_render: Duration,
}

impl Watchdog {
    pub fn new(tracker: Arc<InFlightTracker>, max_render: Duration) -> Self {
        Self { tracker, max_render }
    }

    /// Run until `shutdown` turns true.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::debug!(max_render_ms = self.max_render.as_millis() as u64, "render watchdog started");
            loop {
                tokio::select! {
                    biased;
                    () = stopped(&mut shutdown) => break,
                    reaped = self.scan() => {
                        if reaped > 0 {
                            tracing::debug!(reaped, in_flight = self.tracker.len(), "watchdog pass finished");
                        }
                    }
                }
            }
            tracing::debug!("render watchdog stopped");
        })
    }

    /// One pass over the in-flight jobs. Returns how many were reaped.
    pub async fn scan(&self) -> usize {
        let jobs = self.tracker.snapshot();
        if jobs.is_empty() {
            self.tracker.wait_for_jobs().await;
            return 0;
        }

        join_all(jobs.into_iter().map(|(key, job)| self.watch(key, job)))
            .await
            .into_iter()
            .filter(|reaped| *reaped)
            .count()
    }

    async fn watch(&self, key: String, mut job: InFlightJob) -> bool {
        let deadline = tokio::time::Instant::from_std(job.started_at + self.max_render);
        if tokio::time::timeout_at(deadline, job.finished()).await.is_ok() {
            return false;
        }

        let reaped = self.tracker.remove(&key, job.id);
        if reaped {
            tracing::warn!(
                url = %key,
                elapsed_ms = job.started_at.elapsed().as_millis() as u64,
                "render exceeded {}ms; no longer tracking it",
                self.max_render.as_millis()
            );
        }
        reaped
    }
}

/// Resolve once the shutdown flag is raised or its sender is gone.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
