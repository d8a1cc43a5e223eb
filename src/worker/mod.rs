//! # Agent Workers
//!
//! The contract agent implementations fulfil and the pool that drives them
//! against the per-agent-type queues.

pub mod errors;
pub mod pool;
pub mod traits;

pub use errors::WorkerError;
pub use pool::WorkerPool;
pub use traits::{AgentWorker, ProgressReporter, WorkerJob};
