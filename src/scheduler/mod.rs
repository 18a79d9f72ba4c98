pub mod job;
pub mod store;

pub use job::{Job, JobId, JobSpec, JobState};
pub use store::JobStore;
