use crate::buffer::read::ReadBuffer;
use crate::buffer::write::WriteBuffer;
use crate::entry::Node;
use crate::expiry::{ExpiryQueue, FixedQueue};
use crate::expiry::wheel::TimingWheel;
use crate::metrics::{Metrics, Stats};
use crate::policy::tinylfu::TinyLfu;
use crate::policy::WriteEvent;
use crate::store::{hash_key, StripedTable};
use crate::task::janitor::Janitor;
use crate::time;

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use equivalent::Equivalent;
use parking_lot::Mutex;

/// Per-entry cost function. The default returns 1 for every entry.
pub(crate) type CostFn<K, V> = Arc<dyn Fn(&K, &V) -> u32 + Send + Sync>;

// Maintenance scheduling state. Only one drain runs at a time.
const DRAIN_IDLE: u8 = 0;
const DRAIN_REQUIRED: u8 = 1;
const DRAIN_PROCESSING: u8 = 2;

/// Everything the policy lock protects: the W-TinyLFU queues and the
/// expiration engine, mutated only by the maintenance actor.
pub(crate) struct PolicyCore<K, V> {
  tinylfu: TinyLfu<K, V>,
  expiry: ExpiryQueue<K, V>,
}

/// The internal, thread-safe core shared by every cache handle.
pub(crate) struct CacheShared<K, V, H> {
  pub(crate) store: StripedTable<K, V, H>,
  policy: Mutex<PolicyCore<K, V>>,
  read_buffer: ReadBuffer<K, V>,
  write_buffer: WriteBuffer<K, V>,
  drain_status: AtomicU8,
  pub(crate) metrics: Metrics,
  capacity: u64,
  ttl: Option<Duration>,
  cost: CostFn<K, V>,
  janitor: Mutex<Option<Janitor>>,
  closed: AtomicBool,
}

impl<K, V, H> fmt::Debug for CacheShared<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("capacity", &self.capacity)
      .field("ttl", &self.ttl)
      .field("stripes", &self.store.num_stripes())
      .finish_non_exhaustive()
  }
}

impl<K, V, H> Drop for CacheShared<K, V, H> {
  fn drop(&mut self) {
    if let Some(janitor) = self.janitor.get_mut().take() {
      janitor.stop();
    }
  }
}

impl<K, V, H> CacheShared<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  #[allow(clippy::too_many_arguments)]
  pub(crate) fn new(
    capacity: u64,
    num_stripes: usize,
    initial_capacity: Option<usize>,
    ttl: Option<Duration>,
    variable_ttl: bool,
    cost: CostFn<K, V>,
    collect_stats: bool,
    hasher: H,
  ) -> Self {
    let expiry = if variable_ttl {
      ExpiryQueue::Wheel(TimingWheel::new())
    } else if ttl.is_some() {
      ExpiryQueue::Fixed(FixedQueue::new())
    } else {
      ExpiryQueue::Disabled
    };

    Self {
      store: StripedTable::new(num_stripes, initial_capacity, hasher),
      policy: Mutex::new(PolicyCore {
        tinylfu: TinyLfu::new(capacity),
        expiry,
      }),
      read_buffer: ReadBuffer::new(num_stripes),
      write_buffer: WriteBuffer::new(),
      drain_status: AtomicU8::new(DRAIN_IDLE),
      metrics: Metrics::new(collect_stats),
      capacity,
      ttl,
      cost,
      janitor: Mutex::new(None),
      closed: AtomicBool::new(false),
    }
  }

  pub(crate) fn attach_janitor(&self, janitor: Janitor) {
    *self.janitor.lock() = Some(janitor);
  }

  pub(crate) fn capacity(&self) -> u64 {
    self.capacity
  }

  pub(crate) fn len(&self) -> usize {
    self.store.len()
  }

  pub(crate) fn stats(&self) -> Stats {
    self.metrics.snapshot()
  }

  pub(crate) fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  // --- Hot paths ---

  /// Looks up `key`, recording a hit or a miss. A dead or expired entry
  /// reads as absent even before maintenance collects it.
  pub(crate) fn get<Q>(&self, key: &Q) -> Option<V>
  where
    Q: Hash + Equivalent<K> + ?Sized,
    V: Clone,
  {
    if self.is_closed() {
      return None;
    }
    let now = time::now();
    let hash = hash_key(&self.store.hasher, key);

    let found = {
      let guard = self.store.stripe_for(hash).map.read();
      guard.get(key).cloned()
    };

    match found {
      Some(node) if node.is_visible(now) => {
        let value = node.value().clone();
        self.metrics.record_hit();
        self.after_read(node);
        Some(value)
      }
      _ => {
        self.metrics.record_miss();
        None
      }
    }
  }

  /// Same lookup as `get` but with no hit/miss accounting and no read
  /// event.
  pub(crate) fn contains<Q>(&self, key: &Q) -> bool
  where
    Q: Hash + Equivalent<K> + ?Sized,
  {
    if self.is_closed() {
      return false;
    }
    let now = time::now();
    let hash = hash_key(&self.store.hasher, key);
    let guard = self.store.stripe_for(hash).map.read();
    guard.get(key).map_or(false, |node| node.is_visible(now))
  }

  /// Inserts or replaces `key`. Returns `false` when the entry is
  /// uncacheable: zero cost, or a cost above the whole capacity.
  pub(crate) fn insert(&self, key: K, value: V, ttl_override: Option<Duration>) -> bool {
    if self.is_closed() {
      return false;
    }
    let cost = (self.cost)(&key, &value);
    if cost == 0 || cost as u64 > self.capacity {
      self.metrics.record_rejected_insert();
      return false;
    }

    let expires_at = match ttl_override.or(self.ttl) {
      Some(ttl) => time::tick_after(ttl),
      None => time::NEVER,
    };
    let hash = hash_key(&self.store.hasher, &key);
    let node = Arc::new(Node::new(key, value, hash, cost, expires_at));

    let stripe_index = self.store.stripe_index(hash);
    let event = {
      let stripe = self.store.stripe_for(hash);
      let mut guard = stripe.map.write();
      match guard.insert(node.key().clone(), Arc::clone(&node)) {
        Some(old) => {
          old.mark_dead();
          WriteEvent::Update {
            node,
            old_cost: old.cost(),
          }
        }
        None => {
          self.store.record_insert(stripe_index);
          WriteEvent::Add(node)
        }
      }
    };

    self.publish(event);
    true
  }

  /// Inserts `key` only when no live, unexpired mapping exists. Returns
  /// `false` (publishing nothing) when one does.
  pub(crate) fn insert_if_absent(&self, key: K, value: V, ttl_override: Option<Duration>) -> bool {
    if self.is_closed() {
      return false;
    }
    let cost = (self.cost)(&key, &value);
    if cost == 0 || cost as u64 > self.capacity {
      self.metrics.record_rejected_insert();
      return false;
    }

    let now = time::now();
    let expires_at = match ttl_override.or(self.ttl) {
      Some(ttl) => time::tick_after(ttl),
      None => time::NEVER,
    };
    let hash = hash_key(&self.store.hasher, &key);
    let stripe_index = self.store.stripe_index(hash);

    let event = {
      let stripe = self.store.stripe_for(hash);
      let mut guard = stripe.map.write();
      if let Some(existing) = guard.get(&key) {
        if existing.is_visible(now) {
          return false;
        }
      }
      let node = Arc::new(Node::new(key, value, hash, cost, expires_at));
      match guard.insert(node.key().clone(), Arc::clone(&node)) {
        Some(old) => {
          // The previous mapping was dead or expired; replace it.
          old.mark_dead();
          WriteEvent::Update {
            node,
            old_cost: old.cost(),
          }
        }
        None => {
          self.store.record_insert(stripe_index);
          WriteEvent::Add(node)
        }
      }
    };

    self.publish(event);
    true
  }

  /// Removes the mapping for `key`, if any.
  pub(crate) fn remove<Q>(&self, key: &Q)
  where
    Q: Hash + Equivalent<K> + ?Sized,
  {
    if self.is_closed() {
      return;
    }
    let hash = hash_key(&self.store.hasher, key);
    let stripe_index = self.store.stripe_index(hash);

    let removed = {
      let stripe = self.store.stripe_for(hash);
      let mut guard = stripe.map.write();
      guard.remove(key).map(|node| {
        node.mark_dead();
        self.store.record_remove(stripe_index);
        node
      })
    };

    if let Some(node) = removed {
      self.publish(WriteEvent::Remove(node));
    }
  }

  /// Removes every entry for which `predicate` returns `true`. The
  /// predicate runs under the stripe lock and must not reenter the cache.
  pub(crate) fn remove_if(&self, mut predicate: impl FnMut(&K, &V) -> bool) {
    if self.is_closed() {
      return;
    }
    let now = time::now();
    for (stripe_index, stripe) in self.store.iter_stripes().enumerate() {
      let removed = {
        let mut guard = stripe.map.write();
        let doomed: Vec<K> = guard
          .iter()
          .filter(|(_, node)| node.is_visible(now) && predicate(node.key(), node.value()))
          .map(|(key, _)| key.clone())
          .collect();

        doomed
          .iter()
          .filter_map(|key| {
            guard.remove(key).map(|node| {
              node.mark_dead();
              self.store.record_remove(stripe_index);
              node
            })
          })
          .collect::<Vec<_>>()
      };

      for node in removed {
        self.publish(WriteEvent::Remove(node));
      }
    }
  }

  /// Visits every live entry until `visitor` returns `false`. Entries are
  /// visited under their stripe's read lock, one stripe at a time, with no
  /// ordering guarantee; the visitor must not reenter the cache.
  pub(crate) fn iterate(&self, mut visitor: impl FnMut(&K, &V) -> bool) {
    if self.is_closed() {
      return;
    }
    let now = time::now();
    for stripe in self.store.iter_stripes() {
      let guard = stripe.map.read();
      for (key, node) in guard.iter() {
        if !node.is_visible(now) {
          continue;
        }
        if !visitor(key, node.value()) {
          return;
        }
      }
    }
  }

  // --- Write publication and maintenance ---

  /// Publishes a write event. The buffer is lossless: when it is full the
  /// producer drains the policy inline (blocking on the policy lock) and
  /// retries, which bounds the buffer without ever dropping a write.
  fn publish(&self, event: WriteEvent<K, V>) {
    let mut event = event;
    loop {
      match self.write_buffer.push(event) {
        Ok(()) => break,
        Err(returned) => {
          event = returned;
          self.run_maintenance();
        }
      }
    }
    if self.write_buffer.is_half_full() {
      self.schedule_drain();
    }
  }

  fn after_read(&self, node: Arc<Node<K, V>>) {
    if self.read_buffer.offer(node) {
      self.schedule_drain();
    }
  }

  /// Flags that a drain is wanted and nudges the janitor. No-op when a
  /// drain is already pending or running.
  fn schedule_drain(&self) {
    if self
      .drain_status
      .compare_exchange(DRAIN_IDLE, DRAIN_REQUIRED, Ordering::AcqRel, Ordering::Relaxed)
      .is_ok()
    {
      if let Some(janitor) = &*self.janitor.lock() {
        janitor.wake();
      }
    }
  }

  /// Runs a full maintenance pass, waiting for the policy lock.
  pub(crate) fn run_maintenance(&self) {
    let mut policy = self.policy.lock();
    self.drain(&mut policy);
  }

  /// Runs a maintenance pass only if the policy lock is free.
  pub(crate) fn try_run_maintenance(&self) {
    if let Some(mut policy) = self.policy.try_lock() {
      self.drain(&mut policy);
    }
  }

  /// One janitor tick.
  pub(crate) fn maintenance_tick(&self) {
    if !self.is_closed() {
      self.try_run_maintenance();
    }
  }

  /// The maintenance drain: applies buffered reads then writes to the
  /// policy, advances the expiration engine, and evicts down to capacity.
  /// Runs under the policy lock; the sole mutator of the policy.
  fn drain(&self, policy: &mut PolicyCore<K, V>) {
    self.drain_status.store(DRAIN_PROCESSING, Ordering::Release);
    let now = time::now();
    let PolicyCore { tinylfu, expiry } = policy;

    // Reads first: they only adjust recency/frequency and are cheap.
    self.read_buffer.drain(|node| {
      if node.is_alive() {
        tinylfu.on_read(&node);
      }
    });

    // Writes, in the order the stripe locks serialized them.
    let mut evicted = Vec::new();
    while let Some(event) = self.write_buffer.pop() {
      match event {
        WriteEvent::Add(node) => {
          if node.is_alive() {
            expiry.schedule(&node);
            tinylfu.on_add(node, &mut evicted);
          }
        }
        WriteEvent::Update { node, old_cost } => {
          if node.is_alive() {
            expiry.schedule(&node);
            tinylfu.on_update(node, old_cost, &mut evicted);
          }
        }
        WriteEvent::Remove(node) => tinylfu.on_remove(&node),
      }
    }

    // Expirations.
    let mut expired = Vec::new();
    expiry.advance(now, &mut expired);
    for node in &expired {
      tinylfu.on_remove(node);
    }

    // Capacity.
    tinylfu.evict_to_capacity(&mut evicted);

    let evictions = self.unmap_all(&evicted);
    let expirations = self.unmap_all(&expired);
    self.metrics.record_evictions(evictions);
    self.metrics.record_expirations(expirations);

    self.drain_status.store(DRAIN_IDLE, Ordering::Release);
  }

  /// Marks each node dead and removes its mapping, but only while the
  /// table still holds that exact node: a racing replacement must not be
  /// clobbered by a stale victim. Returns how many mappings were removed.
  fn unmap_all(&self, nodes: &[Arc<Node<K, V>>]) -> u64 {
    let mut removed = 0;
    for node in nodes {
      node.mark_dead();
      let stripe_index = self.store.stripe_index(node.hash());
      let stripe = self.store.stripe_for(node.hash());
      let mut guard = stripe.map.write();
      let same = guard
        .get(node.key())
        .map_or(false, |current| Arc::ptr_eq(current, node));
      if same {
        guard.remove(node.key());
        self.store.record_remove(stripe_index);
        removed += 1;
      }
    }
    removed
  }

  // --- Clear / close ---

  /// Purges every entry and resets policy, buffers, and statistics.
  ///
  /// Callers must have quiesced requests; concurrent operations may
  /// observe partially cleared state.
  pub(crate) fn clear(&self) {
    let mut policy = self.policy.lock();

    self.write_buffer.discard();
    self.read_buffer.discard();

    for stripe in self.store.iter_stripes() {
      let mut guard = stripe.map.write();
      for node in guard.values() {
        node.mark_dead();
      }
      guard.clear();
    }
    self.store.reset_len();

    policy.tinylfu.clear();
    policy.expiry.clear();
    self.metrics.reset();
    self.drain_status.store(DRAIN_IDLE, Ordering::Release);
  }

  /// Clears the cache and stops the janitor. Idempotent; a closed cache
  /// misses every read and rejects every write.
  pub(crate) fn close(&self) {
    if self.closed.swap(true, Ordering::AcqRel) {
      return;
    }
    if let Some(janitor) = self.janitor.lock().take() {
      janitor.stop();
    }
    self.clear();
  }
}
