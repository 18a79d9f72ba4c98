use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::scheduler::{JobId, JobStore};
use crate::worker::process;

/// Admission-controlled execution engine.
///
/// Drains newly created job ids in submission order and spawns one dispatch
/// task per job. Each task waits for a run-slot, launches the job's script,
/// supervises it until exit and then drops the job from the store.
pub struct Dispatcher {
    store: Arc<RwLock<JobStore>>,
    run_slots: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(store: Arc<RwLock<JobStore>>, max_running: usize) -> Self {
        Self {
            store,
            run_slots: Arc::new(Semaphore::new(max_running)),
        }
    }

    /// Run the dispatch loop until `shutdown` fires or every sender is gone.
    ///
    /// Dispatch tasks are chained so that each one asks for a run-slot only
    /// after its predecessor got one; with the semaphore's FIFO wait queue
    /// this keeps admission in submission order.
    pub async fn run(
        self,
        mut queue: mpsc::UnboundedReceiver<JobId>,
        shutdown: CancellationToken,
    ) {
        let mut previous: Option<oneshot::Receiver<()>> = None;

        loop {
            let job_id = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Dispatcher shutting down");
                    break;
                }
                next = queue.recv() => match next {
                    Some(job_id) => job_id,
                    None => break,
                },
            };

            let (admitted_tx, admitted_rx) = oneshot::channel();
            let turn = previous.replace(admitted_rx);
            let store = self.store.clone();
            let run_slots = self.run_slots.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                dispatch(store, run_slots, job_id, turn, admitted_tx, shutdown).await;
            });
        }
    }
}

async fn dispatch(
    store: Arc<RwLock<JobStore>>,
    run_slots: Arc<Semaphore>,
    job_id: JobId,
    turn: Option<oneshot::Receiver<()>>,
    admitted: oneshot::Sender<()>,
    shutdown: CancellationToken,
) {
    if let Some(turn) = turn {
        // An error only means the predecessor task is gone, which also frees our turn.
        let _ = turn.await;
    }

    let _permit = match run_slots.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!(job_id, "Run-slot semaphore closed, job not started");
            return;
        }
    };
    let _ = admitted.send(());

    let running = {
        let mut store = store.write().await;
        let Some(job) = store.get(job_id).cloned() else {
            tracing::debug!(job_id, "Job deleted while queued, skipping");
            return;
        };
        if shutdown.is_cancelled() {
            tracing::debug!(job_id, "Dispatcher stopped, job left queued");
            return;
        }

        match process::launch(&job) {
            Ok((handle, running)) => {
                tracing::info!(
                    job_id,
                    pid = ?handle.pid(),
                    script = %job.script.display(),
                    "Job started"
                );
                store.start(job_id, handle);
                running
            }
            Err(e) => {
                store.remove(job_id);
                tracing::error!(job_id, error = %e, "Job launch failed");
                return;
            }
        }
    };

    let status = running.wait().await;
    store.write().await.finish(job_id);

    match status {
        Ok(status) => tracing::info!(job_id, exit_code = ?status.code(), "Job exited"),
        Err(e) => tracing::warn!(job_id, error = %e, "Failed to wait for job process"),
    }
}
