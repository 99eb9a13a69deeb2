use std::fmt;

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  /// The cache was configured with a capacity of zero. A bounded cache
  /// needs a positive weight budget.
  IllegalCapacity,
  /// An initial capacity of zero was requested. Leave it unset to let the
  /// stripes size themselves.
  IllegalInitialCapacity,
  /// A zero time-to-live was requested. Entries with a TTL must live for
  /// at least one tick.
  IllegalTtl,
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::IllegalCapacity => write!(f, "cache capacity must be greater than zero"),
      BuildError::IllegalInitialCapacity => {
        write!(f, "initial capacity must be greater than zero when set")
      }
      BuildError::IllegalTtl => write!(f, "time-to-live must be greater than zero"),
    }
  }
}

impl std::error::Error for BuildError {}
