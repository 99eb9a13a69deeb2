//! W-TinyLFU admission and eviction.
//!
//! Capacity is split into a small window (~1%) and a main segment whose
//! probation and protected sub-queues form a segmented LRU. New arrivals
//! land in the window; when it overflows, its LRU entry competes against
//! the probation tail under the frequency sketch, so one-hit wonders are
//! rejected before they can displace entries with a proven history.
//!
//! The policy is single-threaded by construction: only the maintenance
//! actor touches it, under the policy lock, applying events drained from
//! the read and write buffers.

use crate::entry::Node;
use crate::policy::sketch::FrequencySketch;
use crate::rng::FastRng;

use std::hash::Hash;
use std::sync::Arc;

use hashbrown::HashMap;

// The first six arena slots are permanent head/tail sentinels, one pair
// per queue. Real entries start after them. Sentinels hold no node and are
// never indexed or evicted.
const WINDOW_HEAD: usize = 0;
const WINDOW_TAIL: usize = 1;
const PROBATION_HEAD: usize = 2;
const PROBATION_TAIL: usize = 3;
const PROTECTED_HEAD: usize = 4;
const PROTECTED_TAIL: usize = 5;
const SENTINEL_COUNT: usize = 6;
const NULL: usize = usize::MAX;

/// A losing candidate needs at least this estimated frequency before the
/// jitter coin is even flipped.
const JITTER_FREQUENCY_FLOOR: u8 = 5;
/// One admission in this many losing-but-warm candidates goes through
/// anyway, so an adversary cannot warm the sketch into a permanent lockout.
const JITTER_DENOMINATOR: u64 = 128;

/// Which queue an arena slot currently belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum QueueTag {
  Window,
  Probation,
  Protected,
}

struct Slot<K, V> {
  /// `None` only for sentinels and free-listed slots.
  node: Option<Arc<Node<K, V>>>,
  prev: usize,
  next: usize,
  queue: QueueTag,
}

pub(crate) struct TinyLfu<K, V> {
  sketch: FrequencySketch,
  rng: FastRng,

  /// Central slot arena; sentinels and entries both live here.
  slots: Vec<Slot<K, V>>,
  /// Maps keys to arena slots for O(1) event application.
  index: HashMap<K, usize, ahash::RandomState>,
  /// Recycled arena slots.
  free: Vec<usize>,

  window_weight: u64,
  probation_weight: u64,
  protected_weight: u64,

  capacity: u64,
  /// ~1% of capacity, at least 1.
  max_window: u64,
  /// 80% of the main segment (capacity minus the window).
  max_protected: u64,
}

impl<K, V> TinyLfu<K, V>
where
  K: Eq + Hash + Clone,
{
  pub(crate) fn new(capacity: u64) -> Self {
    let capacity = capacity.max(1);
    let max_window = (capacity / 100).max(1);
    let max_main = capacity - max_window;
    let max_protected = max_main * 4 / 5;

    let mut slots: Vec<Slot<K, V>> = Vec::with_capacity(SENTINEL_COUNT);
    let sentinel_queues = [
      QueueTag::Window,
      QueueTag::Window,
      QueueTag::Probation,
      QueueTag::Probation,
      QueueTag::Protected,
      QueueTag::Protected,
    ];
    for queue in sentinel_queues {
      slots.push(Slot {
        node: None,
        prev: NULL,
        next: NULL,
        queue,
      });
    }
    Self::wire_sentinels(&mut slots);

    Self {
      sketch: FrequencySketch::new(capacity),
      rng: FastRng::new(capacity ^ WINDOW_SEED),
      slots,
      index: HashMap::with_hasher(ahash::RandomState::new()),
      free: Vec::new(),
      window_weight: 0,
      probation_weight: 0,
      protected_weight: 0,
      capacity,
      max_window,
      max_protected,
    }
  }

  fn wire_sentinels(slots: &mut [Slot<K, V>]) {
    slots[WINDOW_HEAD].next = WINDOW_TAIL;
    slots[WINDOW_TAIL].prev = WINDOW_HEAD;
    slots[PROBATION_HEAD].next = PROBATION_TAIL;
    slots[PROBATION_TAIL].prev = PROBATION_HEAD;
    slots[PROTECTED_HEAD].next = PROTECTED_TAIL;
    slots[PROTECTED_TAIL].prev = PROTECTED_HEAD;
  }

  pub(crate) fn total_weight(&self) -> u64 {
    self.window_weight + self.probation_weight + self.protected_weight
  }

  // --- Event application ---

  /// A drained read: bump the sketch and refresh recency.
  pub(crate) fn on_read(&mut self, node: &Arc<Node<K, V>>) {
    self.sketch.increment(node.hash());
    if let Some(&idx) = self.index.get(node.key()) {
      match self.slots[idx].queue {
        QueueTag::Window => {
          self.unlink(idx);
          self.link_after(WINDOW_HEAD, idx);
        }
        QueueTag::Probation => self.promote_to_protected(idx),
        QueueTag::Protected => {
          self.unlink(idx);
          self.link_after(PROTECTED_HEAD, idx);
        }
      }
    }
  }

  /// A drained add: place at the window MRU and cascade any overflow
  /// through admission. Victims are appended to `evicted`.
  pub(crate) fn on_add(&mut self, node: Arc<Node<K, V>>, evicted: &mut Vec<Arc<Node<K, V>>>) {
    self.sketch.increment(node.hash());

    if let Some(&idx) = self.index.get(node.key()) {
      // A racing re-insert after the previous node was rejected; fold it
      // into an in-place update.
      let old_weight = self.weight_of(idx);
      self.apply_update(idx, node, old_weight, evicted);
      return;
    }

    let weight = node.cost() as u64;
    let key = node.key().clone();
    let idx = self.alloc(node);
    self.index.insert(key, idx);
    self.link_after(WINDOW_HEAD, idx);
    self.slots[idx].queue = QueueTag::Window;
    self.window_weight += weight;

    self.rebalance_window(evicted);
    self.evict_to_capacity(evicted);
  }

  /// A drained update: swap in the fresh node, apply the weight delta and
  /// refresh recency; evict while the total weight exceeds capacity.
  pub(crate) fn on_update(
    &mut self,
    node: Arc<Node<K, V>>,
    old_cost: u32,
    evicted: &mut Vec<Arc<Node<K, V>>>,
  ) {
    self.sketch.increment(node.hash());
    if let Some(&idx) = self.index.get(node.key()) {
      self.apply_update(idx, node, old_cost as u64, evicted);
    } else {
      // The replaced node was evicted between the table write and this
      // drain; the replacement is effectively a fresh arrival.
      let weight = node.cost() as u64;
      let key = node.key().clone();
      let idx = self.alloc(node);
      self.index.insert(key, idx);
      self.link_after(WINDOW_HEAD, idx);
      self.slots[idx].queue = QueueTag::Window;
      self.window_weight += weight;
      self.rebalance_window(evicted);
      self.evict_to_capacity(evicted);
    }
  }

  /// A drained remove (or an expired node): unlink and recycle the slot.
  pub(crate) fn on_remove(&mut self, node: &Arc<Node<K, V>>) {
    if let Some(&idx) = self.index.get(node.key()) {
      let weight = self.weight_of(idx);
      match self.slots[idx].queue {
        QueueTag::Window => self.window_weight -= weight,
        QueueTag::Probation => self.probation_weight -= weight,
        QueueTag::Protected => self.protected_weight -= weight,
      }
      self.unlink(idx);
      self.detach(idx);
    }
  }

  /// Evicts from the segments until the total weight fits the capacity.
  /// Victims come from the probation tail; only when probation is empty
  /// does the sweep fall back to protected, then the window.
  pub(crate) fn evict_to_capacity(&mut self, evicted: &mut Vec<Arc<Node<K, V>>>) {
    while self.total_weight() > self.capacity {
      let victim = self.next_victim();
      if victim == NULL {
        break;
      }
      let weight = self.weight_of(victim);
      match self.slots[victim].queue {
        QueueTag::Window => self.window_weight -= weight,
        QueueTag::Probation => self.probation_weight -= weight,
        QueueTag::Protected => self.protected_weight -= weight,
      }
      self.unlink(victim);
      if let Some(node) = self.detach(victim) {
        evicted.push(node);
      }
    }
  }

  fn next_victim(&self) -> usize {
    let probation = self.slots[PROBATION_TAIL].prev;
    if probation != PROBATION_HEAD {
      return probation;
    }
    let protected = self.slots[PROTECTED_TAIL].prev;
    if protected != PROTECTED_HEAD {
      return protected;
    }
    let window = self.slots[WINDOW_TAIL].prev;
    if window != WINDOW_HEAD {
      return window;
    }
    NULL
  }

  pub(crate) fn clear(&mut self) {
    self.slots.truncate(SENTINEL_COUNT);
    Self::wire_sentinels(&mut self.slots);
    self.index.clear();
    self.free.clear();
    self.window_weight = 0;
    self.probation_weight = 0;
    self.protected_weight = 0;
    self.sketch.clear();
  }

  // --- Update path ---

  fn apply_update(
    &mut self,
    idx: usize,
    node: Arc<Node<K, V>>,
    old_weight: u64,
    evicted: &mut Vec<Arc<Node<K, V>>>,
  ) {
    let new_weight = node.cost() as u64;
    self.slots[idx].node = Some(node);

    match self.slots[idx].queue {
      QueueTag::Window => {
        self.window_weight = self.window_weight - old_weight + new_weight;
        self.unlink(idx);
        self.link_after(WINDOW_HEAD, idx);
      }
      QueueTag::Probation => {
        self.probation_weight = self.probation_weight - old_weight + new_weight;
        self.unlink(idx);
        self.link_after(PROBATION_HEAD, idx);
      }
      QueueTag::Protected => {
        self.protected_weight = self.protected_weight - old_weight + new_weight;
        self.unlink(idx);
        self.link_after(PROTECTED_HEAD, idx);
      }
    }

    self.rebalance_window(evicted);
    self.evict_to_capacity(evicted);
  }

  // --- Window overflow and admission ---

  /// While the window is over its budget, its LRU entry becomes a
  /// candidate for the main segment. With room in main it enters probation
  /// directly; otherwise it competes with the probation tail.
  fn rebalance_window(&mut self, evicted: &mut Vec<Arc<Node<K, V>>>) {
    let max_main = self.capacity - self.max_window;

    while self.window_weight > self.max_window {
      let candidate = self.slots[WINDOW_TAIL].prev;
      if candidate == WINDOW_HEAD {
        break;
      }
      let candidate_weight = self.weight_of(candidate);
      self.unlink(candidate);
      self.window_weight -= candidate_weight;
      self.slots[candidate].queue = QueueTag::Probation;

      loop {
        let main_weight = self.probation_weight + self.protected_weight;
        if main_weight + candidate_weight <= max_main {
          self.link_after(PROBATION_HEAD, candidate);
          self.probation_weight += candidate_weight;
          break;
        }

        let victim = self.slots[PROBATION_TAIL].prev;
        if victim == PROBATION_HEAD {
          // Probation is empty; let the candidate in and leave any
          // overshoot to the capacity sweep.
          self.link_after(PROBATION_HEAD, candidate);
          self.probation_weight += candidate_weight;
          break;
        }

        if self.admit(candidate, victim) {
          let victim_weight = self.weight_of(victim);
          self.unlink(victim);
          self.probation_weight -= victim_weight;
          if let Some(node) = self.detach(victim) {
            evicted.push(node);
          }
        } else {
          if let Some(node) = self.detach(candidate) {
            evicted.push(node);
          }
          break;
        }
      }
    }
  }

  /// The admission gate: the candidate wins on higher estimated frequency;
  /// a tie goes to the newcomer when it is no heavier than the victim; a
  /// warm loser still gets through one time in [`JITTER_DENOMINATOR`].
  fn admit(&mut self, candidate: usize, victim: usize) -> bool {
    let (candidate_hash, candidate_weight) = self.identity_of(candidate);
    let (victim_hash, victim_weight) = self.identity_of(victim);

    let candidate_freq = self.sketch.frequency(candidate_hash);
    let victim_freq = self.sketch.frequency(victim_hash);

    if candidate_freq > victim_freq {
      return true;
    }
    if candidate_freq == victim_freq {
      return candidate_weight <= victim_weight;
    }
    candidate_freq >= JITTER_FREQUENCY_FLOOR && self.rng.coin(JITTER_DENOMINATOR)
  }

  // --- Promotion / demotion ---

  /// Moves a probation entry to the protected MRU, demoting protected LRU
  /// entries back to probation while protected is over its cap.
  fn promote_to_protected(&mut self, idx: usize) {
    let weight = self.weight_of(idx);
    self.unlink(idx);
    self.probation_weight -= weight;
    self.link_after(PROTECTED_HEAD, idx);
    self.slots[idx].queue = QueueTag::Protected;
    self.protected_weight += weight;

    while self.protected_weight > self.max_protected {
      let demoted = self.slots[PROTECTED_TAIL].prev;
      if demoted == PROTECTED_HEAD {
        break;
      }
      let demoted_weight = self.weight_of(demoted);
      self.unlink(demoted);
      self.protected_weight -= demoted_weight;
      self.link_after(PROBATION_HEAD, demoted);
      self.slots[demoted].queue = QueueTag::Probation;
      self.probation_weight += demoted_weight;
    }
  }

  // --- Arena helpers ---

  fn alloc(&mut self, node: Arc<Node<K, V>>) -> usize {
    if let Some(idx) = self.free.pop() {
      let slot = &mut self.slots[idx];
      slot.node = Some(node);
      slot.prev = NULL;
      slot.next = NULL;
      slot.queue = QueueTag::Window;
      idx
    } else {
      let idx = self.slots.len();
      self.slots.push(Slot {
        node: Some(node),
        prev: NULL,
        next: NULL,
        queue: QueueTag::Window,
      });
      idx
    }
  }

  /// Removes an already-unlinked slot from the index and recycles it,
  /// returning the node it held.
  fn detach(&mut self, idx: usize) -> Option<Arc<Node<K, V>>> {
    let node = self.slots[idx].node.take()?;
    self.index.remove(node.key());
    self.free.push(idx);
    Some(node)
  }

  #[inline]
  fn weight_of(&self, idx: usize) -> u64 {
    self.slots[idx].node.as_ref().map_or(0, |n| n.cost() as u64)
  }

  #[inline]
  fn identity_of(&self, idx: usize) -> (u64, u64) {
    self.slots[idx]
      .node
      .as_ref()
      .map_or((0, 0), |n| (n.hash(), n.cost() as u64))
  }

  /// Inserts slot `idx` immediately after sentinel `head` (MRU position).
  #[inline]
  fn link_after(&mut self, head: usize, idx: usize) {
    let old_first = self.slots[head].next;
    self.slots[idx].prev = head;
    self.slots[idx].next = old_first;
    self.slots[head].next = idx;
    self.slots[old_first].prev = idx;
  }

  #[inline]
  fn unlink(&mut self, idx: usize) {
    let prev = self.slots[idx].prev;
    let next = self.slots[idx].next;
    self.slots[prev].next = next;
    self.slots[next].prev = prev;
    self.slots[idx].prev = NULL;
    self.slots[idx].next = NULL;
  }
}

const WINDOW_SEED: u64 = 0xA076_1D64_78BD_642F;

#[cfg(test)]
mod tests {
  use super::*;
  use crate::time;

  fn node(key: u64, cost: u32) -> Arc<Node<u64, u64>> {
    // Key doubles as the hash so sketch behavior is deterministic per key.
    Arc::new(Node::new(key, key, key.wrapping_mul(0x9E37_79B9_7F4A_7C15), cost, time::NEVER))
  }

  fn policy(capacity: u64) -> TinyLfu<u64, u64> {
    TinyLfu::new(capacity)
  }

  #[test]
  fn add_then_remove_balances_weight() {
    let mut p = policy(10);
    let mut evicted = Vec::new();
    let n = node(1, 1);
    p.on_add(n.clone(), &mut evicted);
    assert!(evicted.is_empty());
    assert_eq!(p.total_weight(), 1);
    p.on_remove(&n);
    assert_eq!(p.total_weight(), 0);
  }

  #[test]
  fn weight_never_exceeds_capacity() {
    let capacity = 20;
    let mut p = policy(capacity);
    let mut evicted = Vec::new();
    for key in 0..100 {
      p.on_add(node(key, 1), &mut evicted);
    }
    assert!(
      p.total_weight() <= capacity,
      "weight {} over capacity {}",
      p.total_weight(),
      capacity
    );
    assert_eq!(evicted.len(), 80);
  }

  #[test]
  fn duplicate_add_updates_in_place() {
    let mut p = policy(10);
    let mut evicted = Vec::new();
    p.on_add(node(42, 1), &mut evicted);
    p.on_add(node(42, 1), &mut evicted);
    assert_eq!(p.total_weight(), 1);
  }

  #[test]
  fn update_applies_weight_delta() {
    let mut p = policy(10);
    let mut evicted = Vec::new();
    p.on_add(node(1, 2), &mut evicted);
    p.on_update(node(1, 6), 2, &mut evicted);
    assert_eq!(p.total_weight(), 6);
  }

  #[test]
  fn update_over_capacity_evicts() {
    let mut p = policy(10);
    let mut evicted = Vec::new();
    for key in 0..10 {
      p.on_add(node(key, 1), &mut evicted);
    }
    assert!(evicted.is_empty());
    p.on_update(node(9, 8), 1, &mut evicted);
    assert!(p.total_weight() <= 10);
    assert!(!evicted.is_empty());
  }

  #[test]
  fn remove_of_unknown_key_is_noop() {
    let mut p = policy(10);
    p.on_remove(&node(999, 1));
    assert_eq!(p.total_weight(), 0);
  }

  #[test]
  fn reads_promote_probation_entries() {
    let mut p = policy(200);
    let mut evicted = Vec::new();
    let nodes: Vec<_> = (0..100).map(|k| node(k, 1)).collect();
    for n in &nodes {
      p.on_add(n.clone(), &mut evicted);
    }
    // The window holds ~2 entries; the rest flowed into probation. A read
    // moves a probation entry into protected.
    let target = &nodes[0];
    let idx = *p.index.get(target.key()).unwrap();
    if p.slots[idx].queue == QueueTag::Probation {
      p.on_read(target);
      let idx = *p.index.get(target.key()).unwrap();
      assert_eq!(p.slots[idx].queue, QueueTag::Protected);
    }
  }

  #[test]
  fn protected_cap_demotes_back_to_probation() {
    let capacity = 100;
    let mut p = policy(capacity);
    let mut evicted = Vec::new();
    let nodes: Vec<_> = (0..capacity).map(|k| node(k, 1)).collect();
    for n in &nodes {
      p.on_add(n.clone(), &mut evicted);
    }
    // Touch everything repeatedly; protected must stay within its cap.
    for _ in 0..3 {
      for n in &nodes {
        p.on_read(n);
      }
    }
    assert!(p.protected_weight <= p.max_protected);
    assert!(p.total_weight() <= capacity);
  }

  #[test]
  fn hot_entries_survive_a_scan() {
    let capacity = 50;
    let mut p = policy(capacity);
    let mut evicted = Vec::new();

    let hot: Vec<_> = (0..20).map(|k| node(k, 1)).collect();
    for n in &hot {
      p.on_add(n.clone(), &mut evicted);
    }
    for _ in 0..8 {
      for n in &hot {
        p.on_read(n);
      }
    }

    // A flood of cold, one-shot keys.
    for key in 1_000..1_300 {
      p.on_add(node(key, 1), &mut evicted);
    }

    let survivors = (0..20u64).filter(|k| p.index.contains_key(k)).count();
    assert!(survivors >= 10, "only {survivors}/20 hot entries survived");
  }

  #[test]
  fn eviction_prefers_probation_over_protected() {
    let mut p = policy(100);
    let mut evicted = Vec::new();
    for key in 0..100 {
      p.on_add(node(key, 1), &mut evicted);
    }
    // Promote one entry so protected is non-empty.
    let promoted = node(5, 1);
    p.on_read(&promoted);
    p.on_read(&promoted);

    evicted.clear();
    p.on_add(node(500, 1), &mut evicted);
    p.on_add(node(501, 1), &mut evicted);
    for n in &evicted {
      assert_ne!(*n.key(), 5, "protected entry evicted while probation had victims");
    }
  }

  #[test]
  fn clear_resets_all_state() {
    let mut p = policy(10);
    let mut evicted = Vec::new();
    for key in 0..10 {
      p.on_add(node(key, 1), &mut evicted);
    }
    p.clear();
    assert_eq!(p.total_weight(), 0);
    assert!(p.index.is_empty());
    assert_eq!(p.slots.len(), SENTINEL_COUNT);

    // The arena must be reusable after a clear.
    p.on_add(node(1, 1), &mut evicted);
    assert_eq!(p.total_weight(), 1);
  }
}
