//! Coalescer configuration

use std::time::Duration;

/// Tuning for [`crate::RequestCoalescer`]
#[derive(Debug, Clone)]
pub struct CoalescerConfig {
    /// How long new callers keep joining an in-flight fetch before starting a
    /// fresh one; keeps a hung fetch from wedging its key forever
    pub max_wait_time: Duration,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            max_wait_time: Duration::from_secs(30),
        }
    }
}
