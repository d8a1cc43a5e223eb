//! # Job Queues
//!
//! One logical queue per agent type behind the [`JobQueue`] trait, with an
//! in-process backend and the backoff policy applied to transient failures.

pub mod backoff;
pub mod errors;
pub mod in_memory;
pub mod traits;
pub mod types;

pub use backoff::BackoffCalculator;
pub use errors::{QueueError, QueueResult};
pub use in_memory::InMemoryJobQueue;
pub use traits::JobQueue;
pub use types::{FailureOutcome, Job, JobHandle, JobId, QueueStats};
