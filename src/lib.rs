//! A bounded, thread-safe, in-memory cache with W-TinyLFU admission.
//!
//! `weir` keeps a hard weight budget over its entries and decides what to
//! keep with the TinyLFU family of policies: a small recency window in
//! front of a frequency-gated segmented LRU. On skewed workloads this gets
//! hit ratios close to the theoretical optimum while the hot paths stay
//! allocation-light and contention stays bounded.
//!
//! # Architecture
//!
//! - Reads and writes go through a striped hash table; a key touches only
//!   its stripe's lock.
//! - Reads record themselves in a lossy striped buffer; writes publish to
//!   a lossless bounded queue. Neither touches the policy.
//! - A background janitor (or a writer that finds the queue full) drains
//!   the buffers into the policy under a single policy lock, applies
//!   admission and eviction, and collects expired entries.
//!
//! # Expiration
//!
//! A cache-wide TTL ([`Builder::ttl`]) tracks entries in a FIFO; per-entry
//! TTLs ([`Builder::variable_ttl`]) use a hierarchical timing wheel.
//! Expired entries read as absent immediately and are collected by the
//! next maintenance pass.
//!
//! # Example
//!
//! ```
//! use weir::Builder;
//!
//! let cache = Builder::new(1_000).collect_stats().build().unwrap();
//! cache.insert("user:42", "ada");
//! assert_eq!(cache.get("user:42"), Some("ada"));
//! assert!(cache.stats().ratio() > 0.0);
//! ```

mod buffer;
mod builder;
mod cache;
mod entry;
mod error;
mod expiry;
mod metrics;
mod policy;
mod rng;
mod shared;
mod store;
mod task;
mod time;

pub use builder::{Builder, VariableTtlBuilder};
pub use cache::{Cache, VariableTtlCache};
pub use error::BuildError;
pub use metrics::Stats;
