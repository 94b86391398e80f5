//! Least-connections target selection.

use std::sync::Arc;

use crate::upstream::pool::TargetPool;
use crate::upstream::TargetSelector;

/// Picks the reachable target with the fewest in-flight exchanges.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl TargetSelector for LeastConnections {
    fn select(&self, pools: &[Arc<TargetPool>]) -> Option<Arc<TargetPool>> {
        // Ties go to the first target.
        pools
            .iter()
            .filter(|pool| pool.is_healthy())
            .min_by_key(|pool| pool.in_flight())
            .cloned()
    }
}
