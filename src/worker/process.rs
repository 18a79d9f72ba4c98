use std::fs::File;
use std::process::{ExitStatus, Stdio};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::{MiniqError, Result};
use crate::scheduler::{Job, JobId};

/// Environment variable carrying the requested node count.
pub const NUM_NODES_ENV: &str = "MINIQ_NUM_NODES";
/// Environment variable carrying the requested wall time in minutes.
pub const WALLTIME_MINUTES_ENV: &str = "MINIQ_WALLTIME_MINUTES";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    /// SIGTERM
    Terminate,
    /// SIGKILL
    Kill,
}

/// Control side of a launched job process, held by the job store.
///
/// Signals are forwarded to the dispatch task that owns the child, so a
/// process that has already been reaped is never signalled by PID.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    job_id: JobId,
    pid: Option<u32>,
    signals: mpsc::UnboundedSender<ProcessSignal>,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn terminate(&self) -> Result<()> {
        self.send(ProcessSignal::Terminate)
    }

    pub fn force_kill(&self) -> Result<()> {
        self.send(ProcessSignal::Kill)
    }

    fn send(&self, signal: ProcessSignal) -> Result<()> {
        self.signals
            .send(signal)
            .map_err(|_| MiniqError::ProcessAlreadyGone(self.job_id))
    }
}

/// Owning side of a launched job process, driven by its dispatch task.
#[derive(Debug)]
pub struct RunningProcess {
    job_id: JobId,
    child: Child,
    signals: mpsc::UnboundedReceiver<ProcessSignal>,
}

/// Start `job.script` in `job.cwd` with stdout and stderr sent to the job's
/// output file.
pub fn launch(job: &Job) -> Result<(ProcessHandle, RunningProcess)> {
    let failure = |source| MiniqError::LaunchFailure {
        job_id: job.id,
        source,
    };

    let log = File::create(job.output_path()).map_err(failure)?;
    let err_log = log.try_clone().map_err(failure)?;

    let child = Command::new(&job.script)
        .current_dir(&job.cwd)
        .env(NUM_NODES_ENV, job.num_nodes.to_string())
        .env(WALLTIME_MINUTES_ENV, job.wall_time_minutes.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(err_log))
        .kill_on_drop(true)
        .spawn()
        .map_err(failure)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ProcessHandle {
        job_id: job.id,
        pid: child.id(),
        signals: tx,
    };
    let process = RunningProcess {
        job_id: job.id,
        child,
        signals: rx,
    };
    Ok((handle, process))
}

impl RunningProcess {
    /// Wait for the process to exit, delivering signals requested through
    /// its [`ProcessHandle`] in the meantime.
    pub async fn wait(mut self) -> std::io::Result<ExitStatus> {
        loop {
            tokio::select! {
                status = self.child.wait() => return status,
                Some(signal) = self.signals.recv() => self.deliver(signal),
            }
        }
    }

    fn deliver(&mut self, signal: ProcessSignal) {
        let job_id = self.job_id;
        match signal {
            ProcessSignal::Terminate => {
                let Some(pid) = self.child.id().and_then(|pid| i32::try_from(pid).ok()) else {
                    tracing::debug!(job_id, "Process already reaped, SIGTERM skipped");
                    return;
                };
                match kill(Pid::from_raw(pid), Signal::SIGTERM) {
                    Ok(()) => tracing::info!(job_id, pid, "Sent SIGTERM"),
                    Err(e) => tracing::debug!(job_id, pid, error = %e, "SIGTERM not delivered"),
                }
            }
            ProcessSignal::Kill => match self.child.start_kill() {
                Ok(()) => tracing::info!(job_id, "Sent SIGKILL"),
                Err(e) => tracing::debug!(job_id, error = %e, "SIGKILL not delivered"),
            },
        }
    }
}
