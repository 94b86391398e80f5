//! Round-robin target selection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::upstream::pool::TargetPool;
use crate::upstream::TargetSelector;

/// Rotates through targets, skipping ones known to be unreachable.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TargetSelector for RoundRobin {
    fn select(&self, pools: &[Arc<TargetPool>]) -> Option<Arc<TargetPool>> {
        if pools.is_empty() {
            return None;
        }

        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = pools.len();
        (0..len)
            .map(|i| &pools[(start + i) % len])
            .find(|pool| pool.is_healthy())
            .cloned()
    }
}
