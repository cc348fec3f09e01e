pub mod ticks;
pub mod time_range;

pub use ticks::{TICK_LADDER, format_time, make_ticks};
pub use time_range::{TimeRange, calc_duration, calc_offset, merge_time_ranges};
