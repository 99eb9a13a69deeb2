use weir::{BuildError, Builder};

use std::time::Duration;

#[test]
fn zero_capacity_is_rejected() {
  let result = Builder::<u64, u64>::new(0).build();
  assert_eq!(result.err(), Some(BuildError::IllegalCapacity));
}

#[test]
fn zero_capacity_is_rejected_for_variable_ttl() {
  let result = Builder::<u64, u64>::new(0).variable_ttl().build();
  assert_eq!(result.err(), Some(BuildError::IllegalCapacity));
}

#[test]
fn zero_initial_capacity_is_rejected() {
  let result = Builder::<u64, u64>::new(100).initial_capacity(0).build();
  assert_eq!(result.err(), Some(BuildError::IllegalInitialCapacity));

  let result = Builder::<u64, u64>::new(100)
    .ttl(Duration::from_secs(3600))
    .initial_capacity(0)
    .build();
  assert_eq!(result.err(), Some(BuildError::IllegalInitialCapacity));
}

#[test]
fn zero_ttl_is_rejected() {
  let result = Builder::<u64, u64>::new(100).ttl(Duration::ZERO).build();
  assert_eq!(result.err(), Some(BuildError::IllegalTtl));
}

#[test]
fn build_errors_display_something_useful() {
  let message = BuildError::IllegalCapacity.to_string();
  assert!(message.contains("capacity"));
}

#[test]
fn minimal_configuration_builds() {
  let cache = Builder::<u64, u64>::new(100).build().unwrap();
  assert_eq!(cache.capacity(), 100);
  assert!(cache.is_empty());
}

#[test]
fn full_configuration_builds() {
  let cache = Builder::<String, Vec<u8>>::new(1 << 20)
    .initial_capacity(4096)
    .ttl(Duration::from_secs(60))
    .cost(|_key, value| value.len() as u32)
    .collect_stats()
    .stripes(4)
    .janitor_tick(Duration::from_millis(10))
    .build()
    .unwrap();

  assert!(cache.insert("hello".to_string(), vec![0u8; 128]));
  assert_eq!(cache.get("hello"), Some(vec![0u8; 128]));
}

#[test]
fn variable_ttl_configuration_builds() {
  let cache = Builder::<u64, u64>::new(100)
    .variable_ttl()
    .initial_capacity(100)
    .collect_stats()
    .build()
    .unwrap();

  assert!(cache.insert(1, 1, Duration::from_secs(3600)));
  assert_eq!(cache.get(&1), Some(1));
}

#[test]
fn capacity_of_one_is_legal() {
  let cache = Builder::<u64, u64>::new(1).build().unwrap();
  assert!(cache.insert(1, 10));
  assert_eq!(cache.get(&1), Some(10));
}

#[test]
fn custom_hasher_is_honored() {
  let hasher = ahash::RandomState::with_seeds(1, 2, 3, 4);
  let cache = Builder::<u64, u64>::with_hasher(100, hasher).build().unwrap();
  assert!(cache.insert(7, 7));
  assert_eq!(cache.get(&7), Some(7));
}
