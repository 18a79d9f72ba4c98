use std::collections::{BTreeMap, HashMap};

use tokio::sync::mpsc;

use crate::error::{MiniqError, Result};
use crate::scheduler::job::{Job, JobId, JobSpec, JobState};
use crate::worker::ProcessHandle;

/// Owns every live job record and the handles of their running processes.
///
/// Jobs are keyed by their monotonically increasing id, so iteration order is
/// submission order.
#[derive(Debug)]
pub struct JobStore {
    jobs: BTreeMap<JobId, Job>,
    processes: HashMap<JobId, ProcessHandle>,
    next_id: JobId,
    dispatch_tx: mpsc::UnboundedSender<JobId>,
}

impl JobStore {
    /// Create an empty store. Every created job id is sent on `dispatch_tx`.
    pub fn new(dispatch_tx: mpsc::UnboundedSender<JobId>) -> Self {
        Self {
            jobs: BTreeMap::new(),
            processes: HashMap::new(),
            next_id: 1,
            dispatch_tx,
        }
    }

    /// Insert a new queued job and hand it to the dispatcher.
    pub fn create(&mut self, spec: JobSpec) -> Result<Job> {
        let id = self.next_id;
        self.next_id += 1;

        let job = Job::new(id, spec);
        self.jobs.insert(id, job.clone());

        if self.dispatch_tx.send(id).is_err() {
            self.jobs.remove(&id);
            return Err(MiniqError::DispatcherStopped);
        }
        Ok(job)
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    /// Snapshot of all live jobs in submission order.
    pub fn list(&self) -> Vec<Job> {
        self.jobs.values().cloned().collect()
    }

    /// Delete a job record. Returns `None` if it was already gone.
    pub fn remove(&mut self, id: JobId) -> Option<Job> {
        self.jobs.remove(&id)
    }

    /// Change a job's state. Returns false if the job does not exist.
    pub fn set_state(&mut self, id: JobId, state: JobState) -> bool {
        match self.jobs.get_mut(&id) {
            Some(job) => {
                job.state = state;
                true
            }
            None => false,
        }
    }

    /// Mark a job running and attach its process handle in one step.
    pub fn start(&mut self, id: JobId, handle: ProcessHandle) -> bool {
        if !self.set_state(id, JobState::Running) {
            return false;
        }
        self.processes.insert(id, handle);
        true
    }

    /// Detach the process handle and drop the job record after its process exited.
    pub fn finish(&mut self, id: JobId) -> Option<Job> {
        self.processes.remove(&id);
        self.jobs.remove(&id)
    }

    pub fn process(&self, id: JobId) -> Option<&ProcessHandle> {
        self.processes.get(&id)
    }

    pub fn running_count(&self) -> usize {
        self.jobs
            .values()
            .filter(|j| j.state == JobState::Running)
            .count()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
