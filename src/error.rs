use thiserror::Error;

use crate::scheduler::JobId;

#[derive(Error, Debug)]
pub enum MiniqError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Queue is full ({max_queued} jobs)")]
    QueueFull { max_queued: usize },

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Failed to launch job {job_id}: {source}")]
    LaunchFailure {
        job_id: JobId,
        #[source]
        source: std::io::Error,
    },

    #[error("Process for job {0} has already exited")]
    ProcessAlreadyGone(JobId),

    #[error("Dispatcher is not running")]
    DispatcherStopped,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MiniqError {
    /// Stable identifier used in wire error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            MiniqError::InvalidRequest(_) => "invalid_request",
            MiniqError::QueueFull { .. } => "queue_full",
            MiniqError::NotFound(_) => "not_found",
            MiniqError::LaunchFailure { .. } => "launch_failure",
            MiniqError::ProcessAlreadyGone(_) => "process_already_gone",
            MiniqError::DispatcherStopped => "dispatcher_stopped",
            MiniqError::InvalidConfig(_) => "invalid_config",
        }
    }
}

pub type Result<T> = std::result::Result<T, MiniqError>;
