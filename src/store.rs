use crate::entry::Node;

use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use hashbrown::HashMap;
use parking_lot::RwLock;

/// Hashes a key with a `BuildHasher`.
#[inline]
pub(crate) fn hash_key<Q, H>(hasher: &H, key: &Q) -> u64
where
  Q: Hash + ?Sized,
  H: BuildHasher,
{
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

/// A single, independently locked partition of the hash table.
pub(crate) struct Stripe<K, V, H> {
  pub(crate) map: RwLock<HashMap<K, Arc<Node<K, V>>, H>>,
}

/// The hash table, partitioned into power-of-two stripes.
///
/// Stripe `i` owns exactly the keys whose hash satisfies
/// `hash & (stripes - 1) == i`, so a key lives in at most one stripe and
/// every operation on it takes only that stripe's lock. Growth is
/// per-stripe. The entry count is kept in a striped counter and is an
/// estimate while operations are in flight.
pub(crate) struct StripedTable<K, V, H> {
  stripes: Box<[CachePadded<Stripe<K, V, H>>]>,
  len: StripedCounter,
  pub(crate) hasher: H,
}

impl<K, V, H> StripedTable<K, V, H>
where
  H: BuildHasher + Clone,
{
  /// Creates a table with `num_stripes` stripes (must be a power of two),
  /// pre-sizing each stripe for `initial_capacity / num_stripes` entries
  /// when an initial capacity is given.
  pub(crate) fn new(num_stripes: usize, initial_capacity: Option<usize>, hasher: H) -> Self {
    debug_assert!(num_stripes.is_power_of_two());
    let per_stripe = initial_capacity
      .map(|n| (n + num_stripes - 1) / num_stripes)
      .unwrap_or(0);

    let mut stripes = Vec::with_capacity(num_stripes);
    for _ in 0..num_stripes {
      let map = HashMap::with_capacity_and_hasher(per_stripe, hasher.clone());
      stripes.push(CachePadded::new(Stripe {
        map: RwLock::new(map),
      }));
    }

    Self {
      stripes: stripes.into_boxed_slice(),
      len: StripedCounter::new(num_stripes),
      hasher,
    }
  }
}

impl<K, V, H> StripedTable<K, V, H> {
  #[inline]
  pub(crate) fn stripe_index(&self, hash: u64) -> usize {
    hash as usize & (self.stripes.len() - 1)
  }

  #[inline]
  pub(crate) fn stripe_for(&self, hash: u64) -> &Stripe<K, V, H> {
    &self.stripes[self.stripe_index(hash)]
  }

  pub(crate) fn iter_stripes(&self) -> impl Iterator<Item = &Stripe<K, V, H>> {
    self.stripes.iter().map(|padded| &**padded)
  }

  pub(crate) fn num_stripes(&self) -> usize {
    self.stripes.len()
  }

  /// Records an insertion into stripe `index`.
  #[inline]
  pub(crate) fn record_insert(&self, index: usize) {
    self.len.add(index, 1);
  }

  /// Records a removal from stripe `index`.
  #[inline]
  pub(crate) fn record_remove(&self, index: usize) {
    self.len.add(index, -1);
  }

  /// The estimated number of resident entries. Converges to the true count
  /// when no operation is in flight.
  pub(crate) fn len(&self) -> usize {
    self.len.sum().max(0) as usize
  }

  pub(crate) fn reset_len(&self) {
    self.len.reset();
  }
}

/// An eventually-consistent counter split into per-stripe cells so writers
/// on different stripes never contend on one cache line.
struct StripedCounter {
  cells: Box<[CachePadded<AtomicI64>]>,
}

impl StripedCounter {
  fn new(num_cells: usize) -> Self {
    let cells = (0..num_cells)
      .map(|_| CachePadded::new(AtomicI64::new(0)))
      .collect::<Vec<_>>();
    Self {
      cells: cells.into_boxed_slice(),
    }
  }

  #[inline]
  fn add(&self, index: usize, delta: i64) {
    self.cells[index].fetch_add(delta, Ordering::Relaxed);
  }

  fn sum(&self) -> i64 {
    self.cells.iter().map(|c| c.load(Ordering::Relaxed)).sum()
  }

  fn reset(&self) {
    for cell in self.cells.iter() {
      cell.store(0, Ordering::Relaxed);
    }
  }
}
