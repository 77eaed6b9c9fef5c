// src/stats/aggregator.rs
//! Share and throughput accounting for one session
//!
//! Only the session mutates [`Stats`], after it has checked that a worker
//! report belongs to the live generation.

use serde::Serialize;

/// Snapshot handed to the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MiningStats {
    /// Shares accepted by the pool
    pub accepted: u64,
    /// Shares rejected by the pool
    pub rejected: u64,
    /// Sum of the live generation's per-worker rates (H/s)
    pub hashrate: f64,
}

/// Result of submitting a share to the mining pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareResult {
    /// The share was accepted as valid
    Accepted,
    /// The share was rejected
    Rejected,
}

/// Running counters plus the live generation's per-slot rates
#[derive(Debug, Clone, Default)]
pub struct Stats {
    accepted: u64,
    rejected: u64,
    /// Latest rate per worker slot (H/s)
    slot_rates: Vec<f64>,
}

impl Stats {
    /// Creates zeroed stats for `slots` workers
    pub fn new(slots: usize) -> Self {
        Stats {
            accepted: 0,
            rejected: 0,
            slot_rates: vec![0.0; slots],
        }
    }

    /// Zeroes every slot rate; called whenever a generation ends
    pub fn reset_slots(&mut self, slots: usize) {
        self.slot_rates.clear();
        self.slot_rates.resize(slots, 0.0);
    }

    /// Zeroes counters and rates for a fresh session start
    pub fn reset(&mut self) {
        let slots = self.slot_rates.len();
        *self = Stats::new(slots);
    }

    /// Stores the latest rate of one slot and returns the new aggregate
    ///
    /// Returns `None` for an index outside the current generation.
    pub fn record_rate(&mut self, index: usize, rate: f64) -> Option<f64> {
        let slot = self.slot_rates.get_mut(index)?;
        *slot = rate;
        Some(self.hashrate())
    }

    /// Aggregate rate of the live generation (H/s)
    pub fn hashrate(&self) -> f64 {
        self.slot_rates.iter().sum()
    }

    /// Counts a pool verdict and returns the updated count for that verdict
    pub fn record_share(&mut self, result: ShareResult) -> u64 {
        match result {
            ShareResult::Accepted => {
                self.accepted += 1;
                self.accepted
            }
            ShareResult::Rejected => {
                self.rejected += 1;
                self.rejected
            }
        }
    }

    /// Shares accepted so far
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Shares rejected so far
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Current values for the presentation layer
    pub fn snapshot(&self) -> MiningStats {
        MiningStats {
            accepted: self.accepted,
            rejected: self.rejected,
            hashrate: self.hashrate(),
        }
    }
}
