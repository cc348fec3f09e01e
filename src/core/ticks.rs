//! Tick scale selection and duration label formatting for timing axes.

const SECOND_MS: f64 = 1_000.0;
const MINUTE_MS: f64 = 60.0 * SECOND_MS;
const HOUR_MS: f64 = 60.0 * MINUTE_MS;
const DAY_MS: f64 = 24.0 * HOUR_MS;
const WEEK_MS: f64 = 7.0 * DAY_MS;
const YEAR_MS: f64 = 365.0 * DAY_MS;

/// Candidate tick scales in milliseconds, largest first.
pub const TICK_LADDER: [f64; 10] = [
    YEAR_MS,
    WEEK_MS,
    DAY_MS,
    HOUR_MS,
    5.0 * MINUTE_MS,
    MINUTE_MS,
    10.0 * SECOND_MS,
    5.0 * SECOND_MS,
    500.0,
    100.0,
];

/// Picks a tick scale for the given total duration and produces evenly
/// spaced tick positions.
///
/// The selected scale is the largest ladder entry strictly less than the
/// total. When no entry qualifies (durations at or below 100ms) the ladder
/// wraps to its largest entry; downstream consumers rely on this fallback.
///
/// Ticks start one scale-unit in, never at zero: `ticks[i] = (i + 1) * scale`.
#[must_use]
pub fn make_ticks(total_duration_ms: f64) -> (Vec<f64>, f64) {
    let scale = TICK_LADDER
        .iter()
        .copied()
        .find(|&entry| total_duration_ms > entry)
        .unwrap_or(TICK_LADDER[0]);

    let count = (total_duration_ms / scale).ceil();
    let count = if count.is_finite() && count > 0.0 {
        count as usize
    } else {
        0
    };

    let ticks = (0..count).map(|i| (i + 1) as f64 * scale).collect();
    (ticks, scale)
}

/// Formats a millisecond duration as a compact unit string, e.g. `1,500ms`,
/// `1.5s`, `2d`.
///
/// The unit is chosen against the magnitude of the value, so negative
/// durations keep their sign and pick the same unit as their absolute value.
#[must_use]
pub fn format_time(ms: f64) -> String {
    let magnitude = ms.abs();
    let (divisor, suffix, max_fraction_digits) = if magnitude >= YEAR_MS {
        (YEAR_MS, "y", 0)
    } else if magnitude >= WEEK_MS {
        (WEEK_MS, "w", 0)
    } else if magnitude >= DAY_MS {
        (DAY_MS, "d", 0)
    } else if magnitude >= HOUR_MS {
        (HOUR_MS, "h", 0)
    } else if magnitude >= MINUTE_MS {
        (MINUTE_MS, "m", 1)
    } else if magnitude >= SECOND_MS {
        (SECOND_MS, "s", 2)
    } else {
        (1.0, "ms", 2)
    };

    format!(
        "{}{}",
        format_grouped(ms / divisor, max_fraction_digits),
        suffix
    )
}

/// Formats with at most `max_fraction_digits` fraction digits, trimming
/// trailing zeros, and grouping integer digits in threes.
fn format_grouped(value: f64, max_fraction_digits: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let rendered = format!("{value:.max_fraction_digits$}");
    let (mantissa, fraction) = match rendered.split_once('.') {
        Some((mantissa, fraction)) => (mantissa, fraction.trim_end_matches('0')),
        None => (rendered.as_str(), ""),
    };

    let (sign, digits) = match mantissa.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", mantissa),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    if fraction.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{fraction}")
    }
}
