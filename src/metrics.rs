use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// Internal, thread-safe counters for the cache.
///
/// Hit/miss recording is gated by `collect_stats` so a cache built without
/// statistics pays nothing but a branch on the hot path. Eviction and
/// expiration counts come from the maintenance actor and are kept
/// unconditionally.
#[derive(Debug)]
pub(crate) struct Metrics {
  enabled: bool,
  hits: CachePadded<AtomicU64>,
  misses: CachePadded<AtomicU64>,
  evictions: CachePadded<AtomicU64>,
  expirations: CachePadded<AtomicU64>,
  rejected_inserts: CachePadded<AtomicU64>,
}

impl Metrics {
  pub(crate) fn new(enabled: bool) -> Self {
    Self {
      enabled,
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      evictions: CachePadded::new(AtomicU64::new(0)),
      expirations: CachePadded::new(AtomicU64::new(0)),
      rejected_inserts: CachePadded::new(AtomicU64::new(0)),
    }
  }

  #[inline]
  pub(crate) fn record_hit(&self) {
    if self.enabled {
      self.hits.fetch_add(1, Ordering::Relaxed);
    }
  }

  #[inline]
  pub(crate) fn record_miss(&self) {
    if self.enabled {
      self.misses.fetch_add(1, Ordering::Relaxed);
    }
  }

  #[inline]
  pub(crate) fn record_rejected_insert(&self) {
    self.rejected_inserts.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_evictions(&self, count: u64) {
    if count > 0 {
      self.evictions.fetch_add(count, Ordering::Relaxed);
    }
  }

  pub(crate) fn record_expirations(&self, count: u64) {
    if count > 0 {
      self.expirations.fetch_add(count, Ordering::Relaxed);
    }
  }

  /// Zeroes every counter. Used by `clear`.
  pub(crate) fn reset(&self) {
    self.hits.store(0, Ordering::Relaxed);
    self.misses.store(0, Ordering::Relaxed);
    self.evictions.store(0, Ordering::Relaxed);
    self.expirations.store(0, Ordering::Relaxed);
    self.rejected_inserts.store(0, Ordering::Relaxed);
  }

  pub(crate) fn snapshot(&self) -> Stats {
    Stats {
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      evictions: self.evictions.load(Ordering::Relaxed),
      expirations: self.expirations.load(Ordering::Relaxed),
      rejected_inserts: self.rejected_inserts.load(Ordering::Relaxed),
    }
  }
}

/// A point-in-time snapshot of the cache's cumulative statistics.
#[derive(Clone, PartialEq, Eq)]
pub struct Stats {
  /// The number of successful lookups.
  pub hits: u64,
  /// The number of failed lookups.
  pub misses: u64,
  /// Entries removed by the admission/eviction policy.
  pub evictions: u64,
  /// Entries removed because their TTL elapsed.
  pub expirations: u64,
  /// Inserts rejected up front (zero cost or cost above capacity).
  pub rejected_inserts: u64,
}

impl Stats {
  /// The hit ratio, `hits / (hits + misses)`, or `0.0` when no lookups
  /// have been recorded.
  pub fn ratio(&self) -> f64 {
    let total = self.hits + self.misses;
    if total == 0 {
      0.0
    } else {
      self.hits as f64 / total as f64
    }
  }
}

impl fmt::Debug for Stats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Stats")
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field("ratio", &format!("{:.4}", self.ratio()))
      .field("evictions", &self.evictions)
      .field("expirations", &self.expirations)
      .field("rejected_inserts", &self.rejected_inserts)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ratio_is_zero_without_lookups() {
    let metrics = Metrics::new(true);
    assert_eq!(metrics.snapshot().ratio(), 0.0);
  }

  #[test]
  fn disabled_metrics_ignore_lookups() {
    let metrics = Metrics::new(false);
    metrics.record_hit();
    metrics.record_miss();
    let snap = metrics.snapshot();
    assert_eq!(snap.hits, 0);
    assert_eq!(snap.misses, 0);
  }

  #[test]
  fn reset_zeroes_counters() {
    let metrics = Metrics::new(true);
    metrics.record_hit();
    metrics.record_evictions(3);
    metrics.reset();
    let snap = metrics.snapshot();
    assert_eq!(snap.hits, 0);
    assert_eq!(snap.evictions, 0);
  }
}
