//! Hierarchical timing wheel for per-entry TTLs.
//!
//! Five levels of power-of-two spans: roughly 1.07 s, 1.14 m, 1.22 h,
//! 1.63 d and 6.5 d per bucket. An entry is bucketed at the coarsest level
//! whose span still resolves its remaining lifetime; advancing the wheel
//! re-buckets long-lived entries downward until they expire out of level
//! zero. Insertion and expiration are O(1) amortized.

use crate::entry::Node;
use crate::time;

use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;

/// Buckets per level.
const BUCKETS: [u64; 5] = [64, 64, 32, 4, 1];
/// log2 of each level's bucket span in nanoseconds.
const SHIFT: [u32; 5] = [30, 36, 42, 47, 49];
const LEVELS: usize = 5;

pub(crate) struct TimingWheel<K, V> {
  wheel: Vec<Vec<VecDeque<Arc<Node<K, V>>>>>,
  /// The tick the wheel was last advanced to.
  nanos: u64,
}

impl<K, V> TimingWheel<K, V> {
  pub(crate) fn new() -> Self {
    let wheel = BUCKETS
      .iter()
      .map(|&buckets| (0..buckets).map(|_| VecDeque::new()).collect())
      .collect();
    Self {
      wheel,
      nanos: time::now(),
    }
  }

  /// Buckets `node` by its absolute expiration tick.
  pub(crate) fn schedule(&mut self, node: Arc<Node<K, V>>) {
    let (level, bucket) = self.location(node.expires_at());
    self.wheel[level][bucket].push_back(node);
  }

  /// Advances the wheel to `now`, expiring entries whose tick has passed
  /// and cascading the rest into finer levels. Dead nodes are dropped as
  /// their buckets are traversed.
  pub(crate) fn advance(&mut self, now: u64, expired: &mut Vec<Arc<Node<K, V>>>) {
    let previous = self.nanos;
    if now <= previous {
      return;
    }
    self.nanos = now;

    for level in 0..LEVELS {
      let previous_ticks = previous >> SHIFT[level];
      let current_ticks = now >> SHIFT[level];
      if current_ticks <= previous_ticks {
        break;
      }

      // Start at the previous cursor position inclusive: an entry due
      // within the current bucket's span would otherwise wait a full
      // rotation.
      let mask = BUCKETS[level] - 1;
      let steps = (current_ticks - previous_ticks + 1).min(BUCKETS[level]);
      for step in 0..steps {
        let bucket = ((previous_ticks + step) & mask) as usize;
        let drained = mem::take(&mut self.wheel[level][bucket]);
        for node in drained {
          if node.is_dead() {
            continue;
          }
          if node.expires_at() <= now {
            expired.push(node);
          } else {
            // Not due yet: this bucket covered a span wider than the
            // node's remaining lifetime. Re-bucket it at a finer level.
            self.schedule(node);
          }
        }
      }
    }
  }

  pub(crate) fn clear(&mut self) {
    for level in &mut self.wheel {
      for bucket in level {
        bucket.clear();
      }
    }
    self.nanos = time::now();
  }

  /// The (level, bucket) an absolute expiration tick belongs to: the
  /// finest level whose full rotation still covers the remaining duration.
  fn location(&self, expires_at: u64) -> (usize, usize) {
    let duration = expires_at.saturating_sub(self.nanos);
    for level in 0..LEVELS - 1 {
      if duration < (BUCKETS[level] << SHIFT[level]) {
        let bucket = ((expires_at >> SHIFT[level]) & (BUCKETS[level] - 1)) as usize;
        return (level, bucket);
      }
    }
    (LEVELS - 1, 0)
  }
}
