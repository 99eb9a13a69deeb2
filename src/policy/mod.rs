pub(crate) mod sketch;
pub(crate) mod tinylfu;

use crate::entry::Node;
use std::sync::Arc;

/// A table mutation, published on the write buffer in the order the stripe
/// locks serialized it and applied by the maintenance actor in that order.
#[derive(Debug)]
pub(crate) enum WriteEvent<K, V> {
  /// A key that was not previously mapped gained a node.
  Add(Arc<Node<K, V>>),
  /// An existing mapping was replaced by a fresh node; `old_cost` is the
  /// replaced node's weight so the policy can apply the delta.
  Update {
    node: Arc<Node<K, V>>,
    old_cost: u32,
  },
  /// The mapping was removed from the table.
  Remove(Arc<Node<K, V>>),
}
