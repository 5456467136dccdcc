//! Redis Streams analysis queue.
//!
//! This crate provides:
//! - Job enqueueing via Redis Streams with a priority lane
//! - Worker consumption with retry counters and a dead-letter stream
//! - Progress events via Redis Pub/Sub

pub mod error;
pub mod job;
pub mod progress;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{AnalyzeMediaJob, JobPriority, DEFAULT_PRIORITY};
pub use progress::{ProgressChannel, ProgressEvent};
pub use queue::{Delivery, JobQueue, QueueConfig};
