//! Slave pool
//!
//! Holds the slave handles in configured order and hands them out
//! round-robin. The pool never fans a call out; each selection yields exactly
//! one slave.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use docroute_core::NodeDescriptor;

use crate::connection::ConnectionProvider;
use crate::node::NodeHandle;

/// Cyclic selector over slave handles
#[derive(Debug)]
pub struct SlavePool {
    slaves: Vec<NodeHandle>,
    /// Index of the next slave to hand out, always `< slaves.len()` when non-empty
    cursor: AtomicUsize,
}

impl SlavePool {
    /// Pool over already-built handles, in the given order
    pub fn new(slaves: Vec<NodeHandle>) -> Self {
        Self {
            slaves,
            cursor: AtomicUsize::new(0),
        }
    }

    /// One lazily connected handle per configured slave
    pub fn from_descriptors(
        descriptors: &[NodeDescriptor],
        collection: &str,
        provider: Arc<dyn ConnectionProvider>,
    ) -> Self {
        let slaves = descriptors
            .iter()
            .enumerate()
            .map(|(index, descriptor)| {
                NodeHandle::slave(index, descriptor.clone(), collection, provider.clone())
            })
            .collect();
        Self::new(slaves)
    }

    /// True iff no slaves were configured
    pub fn is_empty(&self) -> bool {
        self.slaves.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slaves.len()
    }

    /// Next slave in round-robin order, starting at index 0
    ///
    /// Callers check [`is_empty`](Self::is_empty) first; an empty pool yields `None`.
    pub fn next(&self) -> Option<&NodeHandle> {
        let len = self.slaves.len();
        if len == 0 {
            return None;
        }

        let index = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len))
            .unwrap_or_else(|i| i);
        self.slaves.get(index)
    }

    pub fn get(&self, index: usize) -> Option<&NodeHandle> {
        self.slaves.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeHandle> {
        self.slaves.iter()
    }
}
