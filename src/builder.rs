use crate::cache::{Cache, VariableTtlCache};
use crate::error::BuildError;
use crate::shared::{CacheShared, CostFn};
use crate::task::janitor::Janitor;

use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_JANITOR_TICK: Duration = Duration::from_secs(1);

/// A builder for [`Cache`] instances.
///
/// `capacity` is the only required setting: the total weight budget across
/// all entries. With the default cost function every entry weighs 1, so
/// capacity is simply the maximum number of entries.
///
/// ```
/// use weir::Builder;
/// use std::time::Duration;
///
/// let cache = Builder::new(10_000)
///   .ttl(Duration::from_secs(60))
///   .collect_stats()
///   .build()
///   .unwrap();
/// cache.insert("a", 1);
/// assert_eq!(cache.get("a"), Some(1));
/// ```
pub struct Builder<K, V, H = ahash::RandomState> {
  capacity: u64,
  initial_capacity: Option<usize>,
  ttl: Option<Duration>,
  stripes: Option<usize>,
  janitor_tick: Duration,
  cost: Option<CostFn<K, V>>,
  collect_stats: bool,
  hasher: H,
}

impl<K, V> Builder<K, V, ahash::RandomState> {
  /// Creates a builder for a cache with the given weight capacity.
  pub fn new(capacity: u64) -> Self {
    Self::with_hasher(capacity, ahash::RandomState::new())
  }
}

impl<K, V, H> Builder<K, V, H>
where
  H: BuildHasher,
{
  /// Creates a builder that hashes keys with `hasher`.
  pub fn with_hasher(capacity: u64, hasher: H) -> Self {
    Self {
      capacity,
      initial_capacity: None,
      ttl: None,
      stripes: None,
      janitor_tick: DEFAULT_JANITOR_TICK,
      cost: None,
      collect_stats: false,
      hasher,
    }
  }

  /// Pre-sizes the hash table for roughly this many entries.
  pub fn initial_capacity(mut self, initial_capacity: usize) -> Self {
    self.initial_capacity = Some(initial_capacity);
    self
  }

  /// Gives every entry the same time-to-live, measured from its insert.
  pub fn ttl(mut self, ttl: Duration) -> Self {
    self.ttl = Some(ttl);
    self
  }

  /// Sets a per-entry cost function. Entries whose cost is 0 or above the
  /// cache capacity are uncacheable: inserting them returns `false`.
  pub fn cost(mut self, cost: impl Fn(&K, &V) -> u32 + Send + Sync + 'static) -> Self {
    self.cost = Some(Arc::new(cost));
    self
  }

  /// Enables hit/miss statistics collection.
  pub fn collect_stats(mut self) -> Self {
    self.collect_stats = true;
    self
  }

  /// Replaces the hasher (e.g. with a deterministically seeded one).
  pub fn hasher(mut self, hasher: H) -> Self {
    self.hasher = hasher;
    self
  }

  /// Overrides the number of hash-table stripes. Rounded up to a power of
  /// two; the default is derived from the available parallelism.
  pub fn stripes(mut self, stripes: usize) -> Self {
    self.stripes = Some(stripes);
    self
  }

  /// Sets the tick interval of the background maintenance thread.
  /// Primarily useful in tests that want prompt expiration.
  pub fn janitor_tick(mut self, tick: Duration) -> Self {
    self.janitor_tick = tick;
    self
  }

  /// Switches to per-entry TTLs: every insert supplies its own duration.
  /// Mutually exclusive with [`Builder::ttl`], which is discarded.
  pub fn variable_ttl(mut self) -> VariableTtlBuilder<K, V, H> {
    self.ttl = None;
    VariableTtlBuilder { inner: self }
  }

  fn validate(&self) -> Result<(), BuildError> {
    if self.capacity == 0 {
      return Err(BuildError::IllegalCapacity);
    }
    if self.initial_capacity == Some(0) {
      return Err(BuildError::IllegalInitialCapacity);
    }
    if self.ttl == Some(Duration::ZERO) {
      return Err(BuildError::IllegalTtl);
    }
    Ok(())
  }
}

impl<K, V, H> Builder<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Builds the cache, spawning its maintenance thread.
  pub fn build(self) -> Result<Cache<K, V, H>, BuildError> {
    self.validate()?;
    let shared = self.into_shared(false);
    Ok(Cache { shared })
  }

  fn into_shared(self, variable_ttl: bool) -> Arc<CacheShared<K, V, H>> {
    let num_stripes = self
      .stripes
      .unwrap_or_else(num_cpus::get)
      .max(1)
      .next_power_of_two();
    let cost = self.cost.unwrap_or_else(|| Arc::new(|_, _| 1));

    log::debug!(
      "building cache: capacity={}, stripes={}, ttl={:?}, variable_ttl={}",
      self.capacity,
      num_stripes,
      self.ttl,
      variable_ttl,
    );

    let shared = Arc::new(CacheShared::new(
      self.capacity,
      num_stripes,
      self.initial_capacity,
      self.ttl,
      variable_ttl,
      cost,
      self.collect_stats,
      self.hasher,
    ));

    // The janitor holds a weak reference so dropping the last handle tears
    // the whole cache down instead of leaking the thread.
    let weak = Arc::downgrade(&shared);
    let janitor = Janitor::spawn(self.janitor_tick, move || match weak.upgrade() {
      Some(shared) => {
        shared.maintenance_tick();
        !shared.is_closed()
      }
      None => false,
    });
    shared.attach_janitor(janitor);
    shared
  }
}

/// A [`Builder`] committed to per-entry TTLs; builds a
/// [`VariableTtlCache`] whose insert methods take a duration.
pub struct VariableTtlBuilder<K, V, H = ahash::RandomState> {
  inner: Builder<K, V, H>,
}

impl<K, V, H> VariableTtlBuilder<K, V, H>
where
  H: BuildHasher,
{
  /// Pre-sizes the hash table for roughly this many entries.
  pub fn initial_capacity(mut self, initial_capacity: usize) -> Self {
    self.inner = self.inner.initial_capacity(initial_capacity);
    self
  }

  /// Sets a per-entry cost function.
  pub fn cost(mut self, cost: impl Fn(&K, &V) -> u32 + Send + Sync + 'static) -> Self {
    self.inner = self.inner.cost(cost);
    self
  }

  /// Enables hit/miss statistics collection.
  pub fn collect_stats(mut self) -> Self {
    self.inner = self.inner.collect_stats();
    self
  }

  /// Replaces the hasher.
  pub fn hasher(mut self, hasher: H) -> Self {
    self.inner = self.inner.hasher(hasher);
    self
  }

  /// Overrides the number of hash-table stripes.
  pub fn stripes(mut self, stripes: usize) -> Self {
    self.inner = self.inner.stripes(stripes);
    self
  }

  /// Sets the tick interval of the background maintenance thread.
  pub fn janitor_tick(mut self, tick: Duration) -> Self {
    self.inner = self.inner.janitor_tick(tick);
    self
  }
}

impl<K, V, H> VariableTtlBuilder<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Builds the cache, spawning its maintenance thread.
  pub fn build(self) -> Result<VariableTtlCache<K, V, H>, BuildError> {
    self.inner.validate()?;
    let shared = self.inner.into_shared(true);
    Ok(VariableTtlCache { shared })
  }
}
