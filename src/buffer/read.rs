//! Striped lossy read buffer.
//!
//! Cache hits are recorded by offering the node to this buffer: one
//! lock-free push, no stripe or policy lock. The maintenance actor drains
//! the buffer into the policy. When a ring fills up, offers are silently
//! dropped; the policy only needs a sample of reads, and losing the
//! occasional one is better than stalling a reader.

use crate::entry::Node;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use crossbeam_utils::CachePadded;

/// Capacity of each ring. Power of two.
const RING_CAPACITY: usize = 64;

/// Global counter used to hand out a stable ring to each thread.
static RING_COUNTER: AtomicUsize = AtomicUsize::new(0);

thread_local! {
  /// The ring index for the current thread, assigned once on first use so
  /// threads spread across rings instead of colliding on one head pointer.
  static THREAD_RING: usize = RING_COUNTER.fetch_add(1, Ordering::Relaxed);
}

/// A set of bounded rings, one per read stripe.
pub(crate) struct ReadBuffer<K, V> {
  rings: Box<[CachePadded<ArrayQueue<Arc<Node<K, V>>>>]>,
}

impl<K, V> ReadBuffer<K, V> {
  /// Creates a buffer with `num_rings` rings (rounded up to a power of
  /// two, at least one).
  pub(crate) fn new(num_rings: usize) -> Self {
    let num_rings = num_rings.max(1).next_power_of_two();
    let rings = (0..num_rings)
      .map(|_| CachePadded::new(ArrayQueue::new(RING_CAPACITY)))
      .collect::<Vec<_>>();
    Self {
      rings: rings.into_boxed_slice(),
    }
  }

  /// Records a read. Returns `true` when the chosen ring is under enough
  /// pressure (>= 75% full, or the push was dropped) that the caller
  /// should schedule a maintenance drain.
  #[inline]
  pub(crate) fn offer(&self, node: Arc<Node<K, V>>) -> bool {
    let ring = &self.rings[THREAD_RING.with(|r| *r) & (self.rings.len() - 1)];
    let dropped = ring.push(node).is_err();
    dropped || ring.len() * 4 >= RING_CAPACITY * 3
  }

  /// Moves every buffered read into `consumer`. Only the maintenance actor
  /// calls this, under the policy lock.
  pub(crate) fn drain(&self, mut consumer: impl FnMut(Arc<Node<K, V>>)) {
    for ring in self.rings.iter() {
      while let Some(node) = ring.pop() {
        consumer(node);
      }
    }
  }

  /// Discards every buffered read. Used by `clear`.
  pub(crate) fn discard(&self) {
    self.drain(|_| {});
  }
}
