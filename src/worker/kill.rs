use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::error::MiniqError;
use crate::scheduler::{Job, JobId, JobState, JobStore};
use crate::worker::ProcessSignal;

/// Graduated termination of running jobs: SIGTERM, grace period, SIGKILL.
///
/// The supervisor never removes jobs from the store. The dispatch task that
/// owns the process does that once the process has actually exited.
#[derive(Debug, Clone)]
pub struct KillSupervisor {
    store: Arc<RwLock<JobStore>>,
    grace_period: Duration,
}

impl KillSupervisor {
    pub fn new(store: Arc<RwLock<JobStore>>, grace_period: Duration) -> Self {
        Self {
            store,
            grace_period,
        }
    }

    /// Mark a running job as `killing` and return its snapshot.
    ///
    /// Must be called while holding the store's write lock, before
    /// [`KillSupervisor::spawn`].
    pub fn begin(&self, store: &mut JobStore, job_id: JobId) -> Option<Job> {
        if !store.set_state(job_id, JobState::Killing) {
            return None;
        }
        store.get(job_id).cloned()
    }

    /// Run [`KillSupervisor::terminate`] as a detached task.
    pub fn spawn(&self, job_id: JobId) -> JoinHandle<()> {
        let supervisor = self.clone();
        tokio::spawn(async move { supervisor.terminate(job_id).await })
    }

    /// Send SIGTERM, wait out the grace period, then send SIGKILL.
    ///
    /// A process that exits before either signal is not an error.
    pub async fn terminate(&self, job_id: JobId) {
        tracing::info!(job_id, grace_period = ?self.grace_period, "Terminating job");
        self.signal(job_id, ProcessSignal::Terminate).await;

        tokio::time::sleep(self.grace_period).await;

        self.signal(job_id, ProcessSignal::Kill).await;
    }

    async fn signal(&self, job_id: JobId, signal: ProcessSignal) {
        let result = {
            let store = self.store.read().await;
            match store.process(job_id) {
                Some(handle) => match signal {
                    ProcessSignal::Terminate => handle.terminate(),
                    ProcessSignal::Kill => handle.force_kill(),
                },
                None => Err(MiniqError::ProcessAlreadyGone(job_id)),
            }
        };

        match result {
            Ok(()) => tracing::debug!(job_id, ?signal, "Signal requested"),
            Err(MiniqError::ProcessAlreadyGone(_)) => {
                tracing::debug!(job_id, ?signal, "Process already gone, signal skipped")
            }
            Err(e) => tracing::warn!(job_id, ?signal, error = %e, "Failed to signal job"),
        }
    }
}
