//! Entry expiration.
//!
//! Two strategies, chosen at build time. A cache-wide fixed TTL keeps a
//! plain FIFO: entries are appended in insertion order and all share one
//! lifetime, so the head is always the soonest to expire. Per-entry TTLs
//! use a hierarchical timing wheel instead. Both structures are owned by
//! the maintenance actor and touched only under the policy lock.
//!
//! Removal is lazy: a deleted or replaced node stays queued until its slot
//! is traversed, where its dead flag makes it vanish. This keeps the hot
//! delete path free of any expiration bookkeeping.

pub(crate) mod wheel;

use crate::entry::Node;
use crate::time;
use wheel::TimingWheel;

use std::collections::VecDeque;
use std::sync::Arc;

pub(crate) enum ExpiryQueue<K, V> {
  /// No TTL configured; nothing to track.
  Disabled,
  /// Cache-wide fixed TTL.
  Fixed(FixedQueue<K, V>),
  /// Per-entry TTL.
  Wheel(TimingWheel<K, V>),
}

impl<K, V> ExpiryQueue<K, V> {
  /// Registers a node whose `expires_at` is set. Nodes that never expire
  /// are not tracked.
  pub(crate) fn schedule(&mut self, node: &Arc<Node<K, V>>) {
    if node.expires_at() == time::NEVER {
      return;
    }
    match self {
      ExpiryQueue::Disabled => {}
      ExpiryQueue::Fixed(queue) => queue.push(Arc::clone(node)),
      ExpiryQueue::Wheel(wheel) => wheel.schedule(Arc::clone(node)),
    }
  }

  /// Collects every node whose expiration tick has passed into `expired`.
  pub(crate) fn advance(&mut self, now: u64, expired: &mut Vec<Arc<Node<K, V>>>) {
    match self {
      ExpiryQueue::Disabled => {}
      ExpiryQueue::Fixed(queue) => queue.advance(now, expired),
      ExpiryQueue::Wheel(wheel) => wheel.advance(now, expired),
    }
  }

  pub(crate) fn clear(&mut self) {
    match self {
      ExpiryQueue::Disabled => {}
      ExpiryQueue::Fixed(queue) => queue.clear(),
      ExpiryQueue::Wheel(wheel) => wheel.clear(),
    }
  }
}

/// FIFO for the fixed-TTL variant. Insertion order is expiration order
/// because every entry shares the same lifetime.
pub(crate) struct FixedQueue<K, V> {
  queue: VecDeque<Arc<Node<K, V>>>,
}

impl<K, V> FixedQueue<K, V> {
  pub(crate) fn new() -> Self {
    Self {
      queue: VecDeque::new(),
    }
  }

  fn push(&mut self, node: Arc<Node<K, V>>) {
    self.queue.push_back(node);
  }

  fn advance(&mut self, now: u64, expired: &mut Vec<Arc<Node<K, V>>>) {
    while let Some(head) = self.queue.front() {
      if head.is_dead() {
        self.queue.pop_front();
        continue;
      }
      if head.expires_at() > now {
        break;
      }
      if let Some(node) = self.queue.pop_front() {
        expired.push(node);
      }
    }
  }

  fn clear(&mut self) {
    self.queue.clear();
  }
}
