//! Process-wide direct-mode target, swapped atomically.

use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::target::record::{TargetRecord, TargetUpdate};

/// Holds the current `TargetRecord` behind an atomic pointer.
///
/// Readers get an immutable snapshot; writers publish a whole new record,
/// so no reader ever observes a mix of old and new fields.
#[derive(Debug)]
pub struct TargetCell {
    current: ArcSwap<TargetRecord>,
}

impl TargetCell {
    pub fn new(initial: TargetRecord) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    pub fn snapshot(&self) -> Arc<TargetRecord> {
        self.current.load_full()
    }

    pub fn replace(&self, record: TargetRecord) {
        self.current.store(Arc::new(record));
    }

    /// Merge `update` into the current record and publish the result.
    ///
    /// Uses read-copy-update so concurrent updates are applied one after
    /// another rather than overwriting each other's fields.
    pub fn apply(&self, update: &TargetUpdate) -> Arc<TargetRecord> {
        let mut published = None;
        self.current.rcu(|current| {
            let next = Arc::new(current.merged(update));
            published = Some(next.clone());
            next
        });
        published.unwrap_or_else(|| self.snapshot())
    }
}

impl Default for TargetCell {
    fn default() -> Self {
        Self::new(TargetRecord::default())
    }
}
