//! Lossless bounded write buffer.
//!
//! Every table mutation publishes an event here for the maintenance actor
//! to apply to the policy. Unlike the read buffer, events must never be
//! dropped: a producer that finds the queue full runs an inline maintenance
//! drain and retries, which gives writers backpressure without parking them
//! behind the policy lock on the common path.

use crate::policy::WriteEvent;

use crossbeam_queue::ArrayQueue;

const QUEUE_CAPACITY: usize = 512;

pub(crate) struct WriteBuffer<K, V> {
  queue: ArrayQueue<WriteEvent<K, V>>,
}

impl<K, V> WriteBuffer<K, V> {
  pub(crate) fn new() -> Self {
    Self {
      queue: ArrayQueue::new(QUEUE_CAPACITY),
    }
  }

  /// Attempts to enqueue `event`, handing it back when the queue is full.
  #[inline]
  pub(crate) fn push(&self, event: WriteEvent<K, V>) -> Result<(), WriteEvent<K, V>> {
    self.queue.push(event)
  }

  #[inline]
  pub(crate) fn pop(&self) -> Option<WriteEvent<K, V>> {
    self.queue.pop()
  }

  /// Whether enough events have accumulated that the janitor should be
  /// woken rather than waiting for its next tick.
  #[inline]
  pub(crate) fn is_half_full(&self) -> bool {
    self.queue.len() * 2 >= QUEUE_CAPACITY
  }

  /// Discards every pending event. Used by `clear`.
  pub(crate) fn discard(&self) {
    while self.queue.pop().is_some() {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entry::Node;
  use crate::time;
  use std::sync::Arc;

  fn add_event(key: u64) -> WriteEvent<u64, u64> {
    WriteEvent::Add(Arc::new(Node::new(key, key, key, 1, time::NEVER)))
  }

  #[test]
  fn events_pop_in_publish_order() {
    let buffer: WriteBuffer<u64, u64> = WriteBuffer::new();
    for key in 0..10 {
      buffer.push(add_event(key)).unwrap();
    }
    for key in 0..10 {
      match buffer.pop() {
        Some(WriteEvent::Add(node)) => assert_eq!(*node.key(), key),
        other => panic!("unexpected event: {:?}", other.is_some()),
      }
    }
    assert!(buffer.pop().is_none());
  }

  #[test]
  fn full_queue_hands_the_event_back() {
    let buffer: WriteBuffer<u64, u64> = WriteBuffer::new();
    for key in 0..QUEUE_CAPACITY as u64 {
      buffer.push(add_event(key)).unwrap();
    }
    assert!(buffer.is_half_full());
    let rejected = buffer.push(add_event(9999));
    match rejected {
      Err(WriteEvent::Add(node)) => assert_eq!(*node.key(), 9999),
      _ => panic!("push into a full queue must return the event"),
    }
  }
}
