//! Tracing setup for applications embedding `timeline-rs`.
//!
//! The retry controllers emit `tracing` events at their state transitions;
//! nothing is logged unless the host installs a subscriber. Call
//! `init_default_tracing` for a sensible default, or wire your own
//! subscriber and filters.

/// Installs a default `tracing` subscriber when the `telemetry` feature is enabled.
///
/// The filter honors `RUST_LOG` and falls back to `timeline_rs=info`.
/// Returns `true` when initialization succeeds, `false` when the feature is
/// disabled or a global subscriber was already set by the host application.
#[must_use]
pub fn init_default_tracing() -> bool {
    #[cfg(feature = "telemetry")]
    {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("timeline_rs=info"));

        return tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init()
            .is_ok();
    }

    #[cfg(not(feature = "telemetry"))]
    {
        false
    }
}
