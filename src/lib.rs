pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod server;
pub mod shutdown;
pub mod worker;

pub use engine::{QueueEngine, StatusReport};
pub use error::{MiniqError, Result};
