//! Bounded worker pool for asynchronous operation jobs.
//!
//! A [`Dispatcher`] owns a bounded [`JobQueue`] feeding a fixed set of
//! workers. Submission is non-blocking: when the queue is at capacity the
//! push fails immediately instead of waiting. Jobs are handed to workers in
//! submission order.

pub mod dispatcher;
pub mod job;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use job::{Job, JobQueue, PushError};
