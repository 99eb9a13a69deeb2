//! Count-Min frequency sketch with periodic aging.
//!
//! Four 4-bit counters per key, packed sixteen to a `u64` word. The
//! estimate for a key is the minimum of its four counters, which bounds
//! the overestimation that hash collisions cause. Counters saturate at 15;
//! once the sample grows past a threshold every counter is halved, so the
//! sketch tracks the recent window of the workload rather than its whole
//! history.

/// Mixing seeds for the four index derivations.
const SEEDS: [u64; 4] = [
  0xC3A5_C85C_97CB_3127,
  0xB492_B66F_BE98_F273,
  0x9AE1_6A3B_2F90_404F,
  0xCBF2_9CE4_8422_2325,
];

const COUNTER_MASK: u64 = 0xF;
/// Clears the top bit of every 4-bit counter after a right shift.
const RESET_MASK: u64 = 0x7777_7777_7777_7777;

pub(crate) struct FrequencySketch {
  table: Vec<u64>,
  table_mask: u64,
  /// Increments recorded since the last aging pass.
  additions: u64,
  /// Aging threshold: ten times the table size.
  sample_size: u64,
}

impl FrequencySketch {
  /// Creates a sketch sized for `capacity` entries (rounded up to a power
  /// of two).
  pub(crate) fn new(capacity: u64) -> Self {
    let size = capacity.max(8).next_power_of_two();
    Self {
      table: vec![0; size as usize],
      table_mask: size - 1,
      additions: 0,
      sample_size: size.saturating_mul(10),
    }
  }

  /// Bumps the four counters for `hash`, saturating each at 15.
  pub(crate) fn increment(&mut self, hash: u64) {
    // The block of four counters within a word is picked by the low bits,
    // the word itself by a per-depth mix, so related keys still spread.
    let start = ((hash & 3) << 2) as usize;
    let mut added = false;
    for depth in 0..4 {
      let index = self.index_of(hash, depth);
      added |= self.increment_at(index, start + depth);
    }

    if added {
      self.additions += 1;
      if self.additions >= self.sample_size {
        self.age();
      }
    }
  }

  /// Estimates how often `hash` has been seen in the current window.
  pub(crate) fn frequency(&self, hash: u64) -> u8 {
    let start = ((hash & 3) << 2) as usize;
    let mut min = u8::MAX;
    for depth in 0..4 {
      let index = self.index_of(hash, depth);
      let shift = ((start + depth) << 2) as u64;
      let count = ((self.table[index] >> shift) & COUNTER_MASK) as u8;
      min = min.min(count);
    }
    min
  }

  /// Halves every counter and restarts the sample, preserving relative
  /// popularity while letting stale entries decay.
  fn age(&mut self) {
    for word in &mut self.table {
      *word = (*word >> 1) & RESET_MASK;
    }
    self.additions = 0;
  }

  pub(crate) fn clear(&mut self) {
    self.table.fill(0);
    self.additions = 0;
  }

  #[inline]
  fn index_of(&self, hash: u64, depth: usize) -> usize {
    let seed = SEEDS[depth];
    let mut mixed = hash.wrapping_add(seed).wrapping_mul(seed);
    mixed = mixed.wrapping_add(mixed >> 32);
    (mixed & self.table_mask) as usize
  }

  /// Increments the counter at `(word, slot)` unless it is saturated.
  #[inline]
  fn increment_at(&mut self, word: usize, slot: usize) -> bool {
    let shift = (slot << 2) as u64;
    if (self.table[word] >> shift) & COUNTER_MASK != COUNTER_MASK {
      self.table[word] += 1 << shift;
      true
    } else {
      false
    }
  }
}
