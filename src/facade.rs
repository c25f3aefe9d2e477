//! Entry point for front-ends
//!
//! [`AuditService`] wires the crawler, downloader, validator and aggregator
//! under one [`JobController`] per audit and answers status queries. Running
//! jobs live in an explicit registry; finished jobs are served from the job
//! store. A finished job leaves the registry the first time its final state is
//! read, when the next audit starts, or on a supervisor pass, whichever comes
//! first.

use crate::config::{validate_job_options, AuditOptions, Config};
use crate::crawler::build_http_client;
use crate::job::{run_job, JobController, PipelineContext};
use crate::report::AuditReport;
use crate::state::{AuditJob, JobState};
use crate::storage::{remove_stale_job_dirs, JobStore, SqliteJobStore, StorageError};
use crate::url::normalize_url;
use crate::validator::ValidatorInvoker;
use crate::AuditError;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Reason recorded on jobs found unfinished when the store is reopened
pub const INTERRUPTED_REASON: &str = "interrupted by restart";

/// Errors returned to callers of the service
#[derive(Debug, Error)]
pub enum FacadeError {
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Report for job {id} is not ready (state: {state})")]
    NotReady { id: Uuid, state: JobState },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The audit service
pub struct AuditService {
    config: Arc<Config>,
    client: Client,
    invoker: Arc<ValidatorInvoker>,
    store: Arc<dyn JobStore>,
    jobs: Mutex<HashMap<Uuid, Arc<JobController>>>,
}

impl AuditService {
    /// Opens the service on the configured SQLite store
    ///
    /// Expired job directories are removed and jobs left unfinished by a
    /// previous process are marked CANCELLED.
    pub fn open(config: Config) -> Result<Self, AuditError> {
        let store = SqliteJobStore::open(&config.storage.database_path)?;

        let retention = Duration::from_secs(u64::from(config.storage.retention_days) * 86_400);
        match remove_stale_job_dirs(&config.storage.work_dir, retention) {
            Ok(0) => {}
            Ok(n) => tracing::info!(removed = n, "retention cleanup finished"),
            Err(e) => tracing::warn!(error = %e, "retention cleanup failed"),
        }

        let interrupted = store.mark_interrupted(INTERRUPTED_REASON)?;
        if interrupted > 0 {
            tracing::warn!(jobs = interrupted, "marked interrupted jobs as cancelled");
        }

        Self::with_store(config, Arc::new(store))
    }

    /// Creates the service on an existing store
    pub fn with_store(config: Config, store: Arc<dyn JobStore>) -> Result<Self, AuditError> {
        let client = build_http_client(&config.user_agent)?;
        let invoker = Arc::new(ValidatorInvoker::new(&config.validator));

        Ok(Self {
            config: Arc::new(config),
            client,
            invoker,
            store,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<JobController>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn controller(&self, id: Uuid) -> Option<Arc<JobController>> {
        self.registry().get(&id).cloned()
    }

    /// Options used when a caller does not supply any
    pub fn default_options(&self) -> AuditOptions {
        self.config.default_options()
    }

    /// Validates the request, records a PENDING job and starts it
    ///
    /// Must be called from within a tokio runtime; the job runs on its own task.
    pub fn start_audit(&self, url: &str, options: AuditOptions) -> Result<Uuid, FacadeError> {
        let target = normalize_url(url).map_err(|e| FacadeError::InvalidRequest(e.to_string()))?;
        validate_job_options(&options, &self.config)
            .map_err(|e| FacadeError::InvalidRequest(e.to_string()))?;

        let job = AuditJob::new(target.as_str(), options);
        let id = job.id;
        self.store.save_job(&job)?;

        let controller = Arc::new(JobController::new(
            job,
            self.config.supervisor.heartbeat_every,
            self.store.clone(),
        ));
        {
            let mut registry = self.registry();
            registry.retain(|_, c| c.state().is_active());
            registry.insert(id, controller.clone());
        }

        let ctx = PipelineContext {
            client: self.client.clone(),
            config: self.config.clone(),
            invoker: self.invoker.clone(),
            store: self.store.clone(),
        };
        tokio::spawn(run_job(controller, ctx));

        tracing::info!(job = %id, url = %target, "audit started");
        Ok(id)
    }

    /// Current snapshot of a job
    pub fn get_status(&self, id: Uuid) -> Result<AuditJob, FacadeError> {
        if let Some(controller) = self.controller(id) {
            let job = controller.snapshot();
            if job.state.is_terminal() {
                self.registry().remove(&id);
            }
            return Ok(job);
        }
        self.store.load_job(id)?.ok_or(FacadeError::NotFound(id))
    }

    /// The final report of a COMPLETE job
    pub fn get_report(&self, id: Uuid) -> Result<AuditReport, FacadeError> {
        let job = self.get_status(id)?;
        match (job.state, job.report) {
            (JobState::Complete, Some(report)) => Ok(report),
            (state, _) => Err(FacadeError::NotReady { id, state }),
        }
    }

    /// Requests cancellation of a job
    ///
    /// Returns false if the job had already finished.
    pub fn cancel(&self, id: Uuid) -> Result<bool, FacadeError> {
        if let Some(controller) = self.controller(id) {
            return Ok(controller.cancel("cancelled by request"));
        }
        match self.store.load_job(id)? {
            Some(_) => Ok(false),
            None => Err(FacadeError::NotFound(id)),
        }
    }

    /// Waits for a job to finish and returns its final snapshot
    pub async fn wait(&self, id: Uuid) -> Result<AuditJob, FacadeError> {
        if let Some(controller) = self.controller(id) {
            controller.wait().await;
        }
        self.get_status(id)
    }

    /// All persisted jobs, newest first
    pub fn list_jobs(&self) -> Result<Vec<AuditJob>, FacadeError> {
        Ok(self.store.list_jobs()?)
    }

    /// Cancels running jobs whose heartbeat is older than `threshold`
    ///
    /// Finished jobs are dropped from the registry on the way; their state
    /// stays available from the store. Returns the ids of cancelled jobs.
    pub fn reap_stalled(&self, threshold: Duration) -> Vec<Uuid> {
        let controllers: Vec<Arc<JobController>> = {
            let mut registry = self.registry();
            registry.retain(|_, c| c.state().is_active());
            registry.values().cloned().collect()
        };

        let mut reaped = Vec::new();
        for controller in controllers {
            // a heartbeat in the future (clock skew) counts as fresh
            let age = controller.heartbeat_age().to_std().unwrap_or_default();
            if age <= threshold {
                continue;
            }
            let reason = format!("stalled: no heartbeat for {}s", age.as_secs());
            tracing::warn!(job = %controller.id(), reason = %reason, "cancelling stalled job");
            if controller.cancel(reason) {
                reaped.push(controller.id());
            }
        }
        reaped
    }

    /// Starts the stall supervisor; it stops once the service is dropped
    pub fn spawn_supervisor(self: &Arc<Self>) -> JoinHandle<()> {
        let service: Weak<Self> = Arc::downgrade(self);
        let every = Duration::from_secs(self.config.supervisor.check_interval_secs);
        let threshold = Duration::from_secs(self.config.supervisor.stall_threshold_secs);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(service) = service.upgrade() else {
                    break;
                };
                service.reap_stalled(threshold);
            }
        })
    }

    /// Number of validator processes started by this service
    pub fn validator_invocations(&self) -> u64 {
        self.invoker.invocations()
    }
}
