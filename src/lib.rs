//! timeline-rs: timing primitives for build timeline dashboards.
//!
//! This crate packages the range-merging and tick-scale math behind build
//! timing charts together with the retry controllers that keep the data
//! feeding those charts resilient to transient failures.

pub mod core;
pub mod error;
pub mod retry;
pub mod telemetry;

pub use crate::core::{
    TimeRange, calc_duration, calc_offset, format_time, make_ticks, merge_time_ranges,
};
pub use error::{TimelineError, TimelineResult};
pub use retry::{AutoRetry, BackoffPolicy, RetryConfig, RetryScheduler, RetryState};
