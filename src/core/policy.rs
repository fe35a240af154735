//! Threshold policy: binary kill decision per lane.

use crate::config::types::{CostLane, CostLimits, Decision};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ThresholdPolicy {
    limits: CostLimits,
}

impl ThresholdPolicy {
    pub const fn new(limits: CostLimits) -> Self {
        Self { limits }
    }

    pub const fn limits(&self) -> &CostLimits {
        &self.limits
    }

    pub const fn limit(&self, lane: CostLane) -> u64 {
        self.limits.limit(lane)
    }

    /// `Terminate` iff `new_total` is strictly greater than the lane limit.
    pub const fn check_after_increment(&self, lane: CostLane, new_total: u64) -> Decision {
        if new_total > self.limits.limit(lane) {
            Decision::Terminate
        } else {
            Decision::Continue
        }
    }
}
