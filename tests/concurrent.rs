use weir::{Builder, Cache};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn parallelism() -> usize {
  thread::available_parallelism().map_or(4, |n| n.get())
}

fn new_cache(capacity: u64) -> Cache<u64, u64> {
  Builder::new(capacity)
    .ttl(Duration::from_secs(60))
    .collect_stats()
    .janitor_tick(Duration::from_millis(10))
    .build()
    .unwrap()
}

#[test]
fn concurrent_reads_of_a_resident_set_all_hit() {
  let size = 100;
  let cache = new_cache(size);

  for key in 0..size {
    cache.insert(key, key);
  }
  // A second pass of updates, like a warm production cache sees.
  for key in 0..size {
    cache.insert(key, key);
  }

  let failed = Arc::new(AtomicBool::new(false));
  let mut handles = Vec::new();
  for t in 0..parallelism() {
    let cache = cache.clone();
    let failed = Arc::clone(&failed);
    handles.push(thread::spawn(move || {
      let mut state = t as u64 + 1;
      for _ in 0..10_000 {
        // Cheap xorshift; the key universe equals the resident set.
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let key = state % size;
        match cache.get(&key) {
          Some(value) if value == key => {}
          other => {
            eprintln!("key {key} returned {other:?}");
            failed.store(true, Ordering::SeqCst);
            return;
          }
        }
      }
    }));
  }
  for handle in handles {
    handle.join().unwrap();
  }

  assert!(!failed.load(Ordering::SeqCst));
  assert_eq!(cache.stats().ratio(), 1.0);
}

#[test]
fn concurrent_writers_stay_within_capacity() {
  let capacity = 100;
  let cache = new_cache(capacity);

  let mut handles = Vec::new();
  for t in 0..8u64 {
    let cache = cache.clone();
    handles.push(thread::spawn(move || {
      for i in 0..2_000 {
        cache.insert(t * 10_000 + i, i);
      }
    }));
  }
  for handle in handles {
    handle.join().unwrap();
  }

  cache.flush();
  assert!(
    cache.len() <= capacity as usize,
    "len {} over capacity {capacity}",
    cache.len()
  );
}

#[test]
fn mixed_readers_writers_and_removers() {
  let capacity = 256;
  let cache = new_cache(capacity);

  let mut handles = Vec::new();
  for t in 0..parallelism() as u64 {
    let cache = cache.clone();
    handles.push(thread::spawn(move || {
      for i in 0..5_000u64 {
        let key = (t * 31 + i) % 512;
        match i % 5 {
          0 | 1 => {
            cache.insert(key, i);
          }
          2 | 3 => {
            let _ = cache.get(&key);
          }
          _ => cache.remove(&key),
        }
      }
    }));
  }
  for handle in handles {
    handle.join().unwrap();
  }

  cache.flush();
  assert!(cache.len() <= capacity as usize);

  // Everything the table still holds must be readable.
  cache.iterate(|key, _value| {
    assert!(*key < 512);
    true
  });
}

#[test]
fn write_followed_by_read_on_the_same_thread_is_consistent() {
  let cache = new_cache(1_000);
  for key in 0..500 {
    assert!(cache.insert(key, key * 2));
    assert_eq!(cache.get(&key), Some(key * 2), "stale read after insert of {key}");
  }
}

#[test]
fn close_while_other_handles_exist_is_safe() {
  let cache = new_cache(100);
  let other = cache.clone();
  cache.insert(1, 1);
  other.close();
  assert_eq!(cache.get(&1), None);
  assert!(!cache.insert(2, 2));
}
