//! Ownership of one audit job's state
//!
//! The controller is the only writer of its [`AuditJob`]. Every mutation,
//! including the synchronous store write that goes with it, happens under
//! one short-lived lock that is never held across an await; readers get
//! cloned snapshots. Terminal states are broadcast on a watch
//! channel so waiters need not poll.

use crate::report::AuditReport;
use crate::state::{AuditJob, JobProgress, JobState};
use crate::storage::JobStore;
use crate::AuditError;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use uuid::Uuid;

/// Age after which any progress update refreshes the heartbeat
const HEARTBEAT_MAX_AGE_SECS: i64 = 30;

/// Whether a state change may go ahead when the store rejects it
#[derive(Debug, Clone, Copy)]
enum Persist {
    BestEffort,
    Required,
}

struct Inner {
    job: AuditJob,
    /// Items processed since the last heartbeat
    since_heartbeat: u64,
}

/// Controller of a single audit job
pub struct JobController {
    id: Uuid,
    inner: Mutex<Inner>,
    cancel: Arc<AtomicBool>,
    heartbeat_every: u64,
    store: Arc<dyn JobStore>,
    state_tx: watch::Sender<JobState>,
}

impl JobController {
    /// Wraps a PENDING job
    pub fn new(job: AuditJob, heartbeat_every: u64, store: Arc<dyn JobStore>) -> Self {
        let (state_tx, _) = watch::channel(job.state);
        Self {
            id: job.id,
            inner: Mutex::new(Inner {
                job,
                since_heartbeat: 0,
            }),
            cancel: Arc::new(AtomicBool::new(false)),
            heartbeat_every: heartbeat_every.max(1),
            store,
            state_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// A copy of the job as it is right now
    pub fn snapshot(&self) -> AuditJob {
        self.lock().job.clone()
    }

    pub fn state(&self) -> JobState {
        self.lock().job.state
    }

    /// Shared cancellation flag, checked by every stage before new work
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Subscribes to state changes
    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state_tx.subscribe()
    }

    /// Waits until the job reaches a terminal state
    pub async fn wait(&self) -> JobState {
        let mut rx = self.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if state.is_terminal() {
                return state;
            }
            if rx.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// Moves the job to `to`, refreshing its heartbeat
    pub fn transition(&self, to: JobState) -> Result<(), AuditError> {
        self.transition_with(to, Persist::BestEffort, |_| {})
    }

    /// Applies a transition to a copy of the job, saves the copy and only
    /// then makes it current
    ///
    /// The save happens under the lock so the store sees transitions in the
    /// same order as readers do. With [`Persist::Required`] a failed save
    /// leaves the job unchanged and is returned.
    fn transition_with(
        &self,
        to: JobState,
        persist: Persist,
        apply: impl FnOnce(&mut AuditJob),
    ) -> Result<(), AuditError> {
        let mut inner = self.lock();
        let from = inner.job.state;
        if !from.can_transition_to(to) {
            return Err(AuditError::InvalidTransition { from, to });
        }

        let mut job = inner.job.clone();
        let now = Utc::now();
        job.state = to;
        job.updated_at = now;
        job.heartbeat_at = now;
        apply(&mut job);

        if let Err(e) = self.store.save_job(&job) {
            match persist {
                Persist::Required => {
                    tracing::error!(job = %self.id, to = %to, error = %e, "failed to persist job state");
                    return Err(e.into());
                }
                Persist::BestEffort => {
                    tracing::warn!(job = %self.id, to = %to, error = %e, "failed to persist job state");
                }
            }
        }

        inner.job = job;
        inner.since_heartbeat = 0;
        // published under the lock so waiters see states in commit order
        self.state_tx.send_replace(to);
        drop(inner);

        tracing::info!(job = %self.id, from = %from, to = %to, "job state changed");
        Ok(())
    }

    /// Marks the job FAILED; no report is kept
    pub fn fail(&self, reason: impl Into<String>) -> Result<(), AuditError> {
        let reason = reason.into();
        tracing::error!(job = %self.id, reason = %reason, "job failed");
        self.transition_with(JobState::Failed, Persist::BestEffort, |job| {
            job.failure_reason = Some(reason);
            job.report = None;
        })
    }

    /// Requests cancellation
    ///
    /// Sets the shared flag and moves the job to CANCELLED. In-flight work
    /// finishes on its own; nothing new is started. Returns false if the job
    /// had already finished.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.cancel.store(true, Ordering::SeqCst);
        let reason = reason.into();
        match self.transition_with(JobState::Cancelled, Persist::BestEffort, |job| {
            job.failure_reason = Some(reason);
            job.report = None;
        }) {
            Ok(()) => true,
            Err(_) => false,
        }
    }

    /// Attaches the final report and marks the job COMPLETE
    ///
    /// The COMPLETE row must reach the store; if it does not, the job stays
    /// AGGREGATING and the storage error is returned.
    pub fn complete(&self, report: AuditReport) -> Result<(), AuditError> {
        self.transition_with(JobState::Complete, Persist::Required, |job| {
            job.report = Some(report);
        })
    }

    /// Applies a progress update
    ///
    /// Every `heartbeat_every` updates refresh the heartbeat, as does any
    /// update arriving once the heartbeat is older than 30 seconds.
    pub fn record(&self, update: impl FnOnce(&mut JobProgress)) {
        let mut inner = self.lock();
        update(&mut inner.job.progress);

        let now = Utc::now();
        inner.job.updated_at = now;
        inner.since_heartbeat += 1;
        let stale =
            inner.job.heartbeat_age(now) >= chrono::Duration::seconds(HEARTBEAT_MAX_AGE_SECS);
        if inner.since_heartbeat < self.heartbeat_every && !stale {
            return;
        }
        inner.since_heartbeat = 0;
        inner.job.heartbeat_at = now;
        if inner.job.state.is_terminal() {
            return;
        }

        if let Err(e) = self.store.save_job(&inner.job) {
            tracing::warn!(job = %self.id, error = %e, "failed to persist heartbeat");
        }
    }

    /// Time since the last heartbeat
    pub fn heartbeat_age(&self) -> chrono::Duration {
        self.lock().job.heartbeat_age(Utc::now())
    }
}
