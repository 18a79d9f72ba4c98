//! Job execution: launching scripts, supervising them and killing them.
//!
//! # Components
//!
//! - [`Dispatcher`]: drains the submission queue and runs jobs under a
//!   run-slot semaphore
//! - [`KillSupervisor`]: SIGTERM, grace period, SIGKILL for deleted running jobs
//! - [`process`]: the [`ProcessHandle`] kept in the job store and the
//!   launch helper
//!
//! # Execution Flow
//!
//! 1. A dispatch task waits for its turn and a free run-slot
//! 2. [`process::launch`] starts the script in the job's working directory
//!    with output going to `<cwd>/<id>.out`
//! 3. The task waits for exit while forwarding kill signals
//! 4. The job is dropped from the store and the run-slot is released

pub mod dispatcher;
pub mod kill;
pub mod process;

pub use dispatcher::Dispatcher;
pub use kill::KillSupervisor;
pub use process::{ProcessHandle, ProcessSignal};
