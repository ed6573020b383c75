//! Shared infrastructure: request pacing and retry-with-resync.

pub mod pacer;
pub mod retry;

pub use pacer::RequestPacer;
pub use retry::{with_resync, FailureKind, Retryable, RetryPolicy};
