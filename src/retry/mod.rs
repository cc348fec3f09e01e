pub mod auto_retry;
pub mod backoff;
pub mod scheduler;

pub use auto_retry::AutoRetry;
pub use backoff::BackoffPolicy;
pub use scheduler::{OperationError, RetryConfig, RetryScheduler, RetryState};
