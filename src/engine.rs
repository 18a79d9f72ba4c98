use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::error::{MiniqError, Result};
use crate::scheduler::{Job, JobId, JobSpec, JobState, JobStore};
use crate::worker::{Dispatcher, KillSupervisor};

/// Result of a status query: one job, or every live job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusReport {
    Job(Job),
    Jobs(Vec<Job>),
}

/// Public entry point of the batch queue: submit, delete and status.
///
/// Each engine owns its own job store and dispatcher, so independent
/// engines (e.g. one per test) never share state. Cloning is cheap and
/// yields another handle to the same engine.
#[derive(Debug, Clone)]
pub struct QueueEngine {
    config: QueueConfig,
    store: Arc<RwLock<JobStore>>,
    killer: KillSupervisor,
    shutdown: CancellationToken,
}

impl QueueEngine {
    /// Build an engine and spawn its dispatcher on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MiniqError::InvalidConfig`] if a limit is zero.
    pub fn start(config: QueueConfig) -> Result<Self> {
        config.validate()?;

        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let store = Arc::new(RwLock::new(JobStore::new(dispatch_tx)));
        let shutdown = CancellationToken::new();

        let dispatcher = Dispatcher::new(store.clone(), config.max_running);
        tokio::spawn(dispatcher.run(dispatch_rx, shutdown.clone()));

        tracing::info!(
            max_queued = config.max_queued,
            max_running = config.max_running,
            kill_grace_period = ?config.kill_grace_period,
            "Queue engine started"
        );

        Ok(Self {
            killer: KillSupervisor::new(store.clone(), config.kill_grace_period),
            config,
            store,
            shutdown,
        })
    }

    /// Queue a script for execution.
    ///
    /// The capacity check counts every live job, running ones included.
    pub async fn submit(
        &self,
        script: impl Into<PathBuf>,
        num_nodes: i64,
        minutes: i64,
        cwd: impl Into<PathBuf>,
    ) -> Result<Job> {
        let spec = JobSpec::new(script, num_nodes, minutes, cwd)?;

        let mut store = self.store.write().await;
        if store.len() >= self.config.max_queued {
            tracing::warn!(max_queued = self.config.max_queued, "Queue full, submission rejected");
            return Err(MiniqError::QueueFull {
                max_queued: self.config.max_queued,
            });
        }
        let job = store.create(spec)?;

        tracing::info!(
            job_id = job.id,
            script = %job.script.display(),
            num_nodes = job.num_nodes,
            minutes = job.wall_time_minutes,
            "Job submitted"
        );
        Ok(job)
    }

    /// Delete a job.
    ///
    /// A queued job is removed at once and returned with state `deleted`.
    /// A running job is moved to `killing` and terminated in the background;
    /// it leaves the store once its process has exited.
    pub async fn delete(&self, id: JobId) -> Result<Job> {
        let mut store = self.store.write().await;
        let state = store
            .get(id)
            .map(|job| job.state)
            .ok_or(MiniqError::NotFound(id))?;

        match state {
            JobState::Running => {
                let job = self
                    .killer
                    .begin(&mut store, id)
                    .ok_or(MiniqError::NotFound(id))?;
                drop(store);
                tracing::info!(job_id = id, "Delete requested for running job");
                self.killer.spawn(id);
                Ok(job)
            }
            JobState::Killing => {
                tracing::debug!(job_id = id, "Job is already being killed");
                store.get(id).cloned().ok_or(MiniqError::NotFound(id))
            }
            JobState::Queued | JobState::Deleted => {
                let mut job = store.remove(id).ok_or(MiniqError::NotFound(id))?;
                job.state = JobState::Deleted;
                tracing::info!(job_id = id, "Queued job deleted");
                Ok(job)
            }
        }
    }

    /// Snapshot of one job, or of all live jobs when `id` is `None`.
    pub async fn status(&self, id: Option<JobId>) -> Result<StatusReport> {
        match id {
            Some(id) => self
                .get(id)
                .await
                .map(StatusReport::Job)
                .ok_or(MiniqError::NotFound(id)),
            None => Ok(StatusReport::Jobs(self.list().await)),
        }
    }

    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.store.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<Job> {
        self.store.read().await.list()
    }

    pub async fn running_count(&self) -> usize {
        self.store.read().await.running_count()
    }

    /// Stop admitting queued jobs.
    ///
    /// Jobs already running keep running. Queued jobs are never launched
    /// and stay `queued` until deleted. Once the dispatch loop has exited,
    /// submissions fail with [`MiniqError::DispatcherStopped`].
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
