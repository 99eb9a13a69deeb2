use once_cell::sync::Lazy;
use std::time::{Duration, Instant};

// The single, static reference point for all time calculations in the cache.
// Initialized lazily on first use so ticks stay small and monotonic.
static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Sentinel tick for entries that never expire.
pub(crate) const NEVER: u64 = u64::MAX;

/// Returns the current tick: nanoseconds elapsed since the process epoch.
#[inline]
pub(crate) fn now() -> u64 {
  Instant::now().saturating_duration_since(*EPOCH).as_nanos() as u64
}

/// Returns the absolute tick `duration` from now, saturating at [`NEVER`].
#[inline]
pub(crate) fn tick_after(duration: Duration) -> u64 {
  now().saturating_add(duration.as_nanos() as u64)
}
