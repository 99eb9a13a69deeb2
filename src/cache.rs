use crate::metrics::Stats;
use crate::shared::CacheShared;

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

use equivalent::Equivalent;

/// A bounded, thread-safe cache.
///
/// Entries are admitted and evicted by a W-TinyLFU policy; reads and
/// writes contend only on short stripe locks while policy work happens on
/// a background maintenance thread. Handles are cheap to clone and share
/// one underlying cache.
pub struct Cache<K, V, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<K, V, H>>,
}

/// A bounded, thread-safe cache whose entries each carry their own TTL,
/// supplied at insert time. Built with [`crate::Builder::variable_ttl`].
pub struct VariableTtlCache<K, V, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<K, V, H>>,
}

impl<K, V, H> Clone for Cache<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<K, V, H> Clone for VariableTtlCache<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<K, V, H> fmt::Debug for Cache<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Cache").field("shared", &self.shared).finish()
  }
}

impl<K, V, H> fmt::Debug for VariableTtlCache<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("VariableTtlCache")
      .field("shared", &self.shared)
      .finish()
  }
}

impl<K, V, H> Cache<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  /// Returns a clone of the value associated with `key`, recording a hit
  /// or a miss. Expired entries read as absent.
  pub fn get<Q>(&self, key: &Q) -> Option<V>
  where
    Q: Hash + Equivalent<K> + ?Sized,
    V: Clone,
  {
    self.shared.get(key)
  }

  /// Whether a live entry exists for `key`. Unlike [`Cache::get`], this
  /// records no statistics and does not count as an access for the policy.
  pub fn contains<Q>(&self, key: &Q) -> bool
  where
    Q: Hash + Equivalent<K> + ?Sized,
  {
    self.shared.contains(key)
  }

  /// Associates `value` with `key`, replacing any previous value.
  ///
  /// Returns `false` when the entry is uncacheable: its cost is 0 or
  /// exceeds the cache capacity.
  pub fn insert(&self, key: K, value: V) -> bool {
    self.shared.insert(key, value, None)
  }

  /// Associates `value` with `key` only if no live entry exists.
  ///
  /// Returns `false` when the key is already present, or when the entry is
  /// uncacheable.
  pub fn insert_if_absent(&self, key: K, value: V) -> bool {
    self.shared.insert_if_absent(key, value, None)
  }

  /// Removes the entry for `key`, if any.
  pub fn remove<Q>(&self, key: &Q)
  where
    Q: Hash + Equivalent<K> + ?Sized,
  {
    self.shared.remove(key)
  }

  /// Removes every entry for which `predicate` returns `true`. The
  /// predicate runs under a stripe lock and must not touch this cache.
  pub fn remove_if(&self, predicate: impl FnMut(&K, &V) -> bool) {
    self.shared.remove_if(predicate)
  }

  /// Visits every live entry at least once, in no particular order,
  /// stopping early when `visitor` returns `false`. The visitor runs under
  /// a stripe lock and must not touch this cache.
  pub fn iterate(&self, visitor: impl FnMut(&K, &V) -> bool) {
    self.shared.iterate(visitor)
  }

  /// Removes every entry and resets the policy and statistics.
  ///
  /// Must not run concurrently with other operations on this cache;
  /// callers are expected to quiesce first.
  pub fn clear(&self) {
    self.shared.clear()
  }

  /// Clears the cache and stops its maintenance thread. Idempotent. After
  /// closing, reads miss and writes return `false`.
  pub fn close(&self) {
    self.shared.close()
  }

  /// Blocks until a full maintenance pass has run: buffered events are
  /// applied, due expirations collected, and capacity enforced.
  pub fn flush(&self) {
    if !self.shared.is_closed() {
      self.shared.run_maintenance();
    }
  }

  /// The estimated number of resident entries. Converges to the true
  /// count when no operation is in flight.
  pub fn len(&self) -> usize {
    self.shared.len()
  }

  /// Whether the cache is (estimated to be) empty.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// The total weight budget.
  pub fn capacity(&self) -> u64 {
    self.shared.capacity()
  }

  /// A snapshot of the cache's cumulative statistics.
  pub fn stats(&self) -> Stats {
    self.shared.stats()
  }
}

impl<K, V, H> VariableTtlCache<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  /// Returns a clone of the value associated with `key`, recording a hit
  /// or a miss. Expired entries read as absent.
  pub fn get<Q>(&self, key: &Q) -> Option<V>
  where
    Q: Hash + Equivalent<K> + ?Sized,
    V: Clone,
  {
    self.shared.get(key)
  }

  /// Whether a live entry exists for `key`; no statistics are recorded.
  pub fn contains<Q>(&self, key: &Q) -> bool
  where
    Q: Hash + Equivalent<K> + ?Sized,
  {
    self.shared.contains(key)
  }

  /// Associates `value` with `key` for `ttl`, replacing any previous
  /// value. Returns `false` when the entry is uncacheable.
  pub fn insert(&self, key: K, value: V, ttl: Duration) -> bool {
    self.shared.insert(key, value, Some(ttl))
  }

  /// Associates `value` with `key` for `ttl` only if no live entry
  /// exists. Returns `false` when the key is already present, or when the
  /// entry is uncacheable.
  pub fn insert_if_absent(&self, key: K, value: V, ttl: Duration) -> bool {
    self.shared.insert_if_absent(key, value, Some(ttl))
  }

  /// Removes the entry for `key`, if any.
  pub fn remove<Q>(&self, key: &Q)
  where
    Q: Hash + Equivalent<K> + ?Sized,
  {
    self.shared.remove(key)
  }

  /// Removes every entry for which `predicate` returns `true`.
  pub fn remove_if(&self, predicate: impl FnMut(&K, &V) -> bool) {
    self.shared.remove_if(predicate)
  }

  /// Visits every live entry at least once, stopping early when `visitor`
  /// returns `false`.
  pub fn iterate(&self, visitor: impl FnMut(&K, &V) -> bool) {
    self.shared.iterate(visitor)
  }

  /// Removes every entry and resets the policy and statistics. Callers
  /// are expected to quiesce first.
  pub fn clear(&self) {
    self.shared.clear()
  }

  /// Clears the cache and stops its maintenance thread. Idempotent.
  pub fn close(&self) {
    self.shared.close()
  }

  /// Blocks until a full maintenance pass has run.
  pub fn flush(&self) {
    if !self.shared.is_closed() {
      self.shared.run_maintenance();
    }
  }

  /// The estimated number of resident entries.
  pub fn len(&self) -> usize {
    self.shared.len()
  }

  /// Whether the cache is (estimated to be) empty.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// The total weight budget.
  pub fn capacity(&self) -> u64 {
    self.shared.capacity()
  }

  /// A snapshot of the cache's cumulative statistics.
  pub fn stats(&self) -> Stats {
    self.shared.stats()
  }
}
