use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MiniqError, Result};

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Killing,
    /// Only ever reported on the snapshot returned by a delete of a queued job.
    Deleted,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Running => write!(f, "running"),
            JobState::Killing => write!(f, "killing"),
            JobState::Deleted => write!(f, "deleted"),
        }
    }
}

/// A validated resource request, ready to become a [`Job`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub script: PathBuf,
    pub cwd: PathBuf,
    pub num_nodes: u32,
    pub wall_time_minutes: u32,
}

impl JobSpec {
    /// Validate raw request values. Node count and wall time must be positive.
    pub fn new(
        script: impl Into<PathBuf>,
        num_nodes: i64,
        wall_time_minutes: i64,
        cwd: impl Into<PathBuf>,
    ) -> Result<Self> {
        let num_nodes = positive("num_nodes", num_nodes)?;
        let wall_time_minutes = positive("minutes", wall_time_minutes)?;
        Ok(Self {
            script: script.into(),
            cwd: cwd.into(),
            num_nodes,
            wall_time_minutes,
        })
    }
}

fn positive(field: &str, value: i64) -> Result<u32> {
    if value < 1 {
        return Err(MiniqError::InvalidRequest(format!(
            "{field} must be at least 1, got {value}"
        )));
    }
    u32::try_from(value)
        .map_err(|_| MiniqError::InvalidRequest(format!("{field} is too large: {value}")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "job_id")]
    pub id: JobId,
    pub script: PathBuf,
    pub cwd: PathBuf,
    pub num_nodes: u32,
    pub wall_time_minutes: u32,
    pub state: JobState,
    /// Carried through for status output, never computed.
    pub runtime: Option<String>,
    /// Carried through for status output, never computed.
    pub time_remaining: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId, spec: JobSpec) -> Self {
        Self {
            id,
            script: spec.script,
            cwd: spec.cwd,
            num_nodes: spec.num_nodes,
            wall_time_minutes: spec.wall_time_minutes,
            state: JobState::Queued,
            runtime: None,
            time_remaining: None,
            submitted_at: Utc::now(),
        }
    }

    /// Path of the combined stdout/stderr log for this job.
    pub fn output_path(&self) -> PathBuf {
        self.cwd.join(format!("{}.out", self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> JobSpec {
        JobSpec::new("/bin/true", 2, 30, "/tmp").unwrap()
    }

    #[test]
    fn job_starts_queued() {
        let job = Job::new(7, spec());
        assert_eq!(job.id, 7);
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.num_nodes, 2);
        assert_eq!(job.wall_time_minutes, 30);
        assert!(job.runtime.is_none());
        assert!(job.time_remaining.is_none());
    }

    #[test]
    fn output_path_is_in_working_directory() {
        let job = Job::new(12, spec());
        assert_eq!(job.output_path(), PathBuf::from("/tmp/12.out"));
    }

    #[test]
    fn spec_rejects_non_positive_values() {
        for (nodes, minutes) in [(0, 10), (10, 0), (-1, 10), (10, -5)] {
            let err = JobSpec::new("/bin/true", nodes, minutes, "/tmp").unwrap_err();
            assert!(matches!(err, MiniqError::InvalidRequest(_)), "{nodes} {minutes}");
        }
    }

    #[test]
    fn spec_rejects_values_beyond_u32() {
        let err = JobSpec::new("/bin/true", i64::from(u32::MAX) + 1, 1, "/tmp").unwrap_err();
        assert!(matches!(err, MiniqError::InvalidRequest(_)));
    }

    #[test]
    fn state_display_matches_wire_names() {
        for state in [
            JobState::Queued,
            JobState::Running,
            JobState::Killing,
            JobState::Deleted,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }

    #[test]
    fn snapshot_keeps_reserved_fields_in_json() {
        let value = serde_json::to_value(Job::new(3, spec())).unwrap();
        assert_eq!(value["job_id"], 3);
        assert_eq!(value["state"], "queued");
        assert!(value.get("runtime").unwrap().is_null());
        assert!(value.get("time_remaining").unwrap().is_null());
    }
}
