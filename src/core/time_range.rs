use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TimelineError, TimelineResult};

/// A closed wall-clock interval reported by an upstream timing event.
///
/// Provisioner and agent event sources report the platform's zero-value
/// timestamp when the true start of a stage is unknown. Such starts are
/// treated as "no data" rather than as the year one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl TimeRange {
    #[must_use]
    pub fn new(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            ended_at,
        }
    }

    /// The sentinel used for unknown starts.
    ///
    /// Callers mapping upstream payloads should substitute this value for
    /// timestamps that fail to parse.
    #[must_use]
    pub fn zero_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap()
    }

    /// A start is valid when it falls after the platform's zero-value epoch.
    #[must_use]
    pub fn has_valid_start(&self) -> bool {
        self.started_at.year() > 1
    }
}

/// Computes the single range covering every input range.
///
/// The merged end is the maximum `ended_at`. The merged start is the earliest
/// *valid* `started_at`; when every start carries the zero-value sentinel the
/// result collapses to a zero-width instant at the merged end, so charts never
/// render a multi-century bar from placeholder data.
pub fn merge_time_ranges(ranges: &[TimeRange]) -> TimelineResult<TimeRange> {
    let Some(ended_at) = ranges.iter().map(|range| range.ended_at).max() else {
        return Err(TimelineError::InvalidData(
            "merged range cannot be built from empty input".to_owned(),
        ));
    };

    let started_at = ranges
        .iter()
        .filter(|range| range.has_valid_start())
        .map(|range| range.started_at)
        .min()
        .unwrap_or(ended_at);

    Ok(TimeRange {
        started_at,
        ended_at,
    })
}

/// Duration of a range in milliseconds.
#[must_use]
pub fn calc_duration(range: &TimeRange) -> i64 {
    range
        .ended_at
        .signed_duration_since(range.started_at)
        .num_milliseconds()
}

/// Offset of `range` within `base`, in milliseconds.
///
/// Negative offsets are passed through untouched: a sub-range that reports a
/// start before its base is an upstream inconsistency to surface, not hide.
#[must_use]
pub fn calc_offset(range: &TimeRange, base: &TimeRange) -> i64 {
    range
        .started_at
        .signed_duration_since(base.started_at)
        .num_milliseconds()
}
