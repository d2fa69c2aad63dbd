//! CPU utilisation as a percentage, derived from successive CPU-time samples.
//!
//! `/proc` only exposes cumulative CPU time, so the percentage is the CPU-time
//! delta over the wall-clock delta between two cycles. A process seen for the
//! first time gets its lifetime average instead.

use std::collections::{HashMap, HashSet};

/// Identifies one process incarnation: a recycled PID gets a new start time.
pub type ProcessKey = (u32, u64);

/// A cumulative CPU sample for a single process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuSample {
    /// User + system CPU time, seconds.
    pub cpu_total: f64,
    /// Process start time after boot, seconds.
    pub start_time: f64,
    /// System uptime when the sample was taken, seconds.
    pub uptime: f64,
}

/// Compute f64 delta, returning `None` on counter regression.
pub fn df64(curr: f64, prev: f64) -> Option<f64> {
    (curr >= prev).then_some(curr - prev)
}

/// Per-process CPU samples from the previous cycle.
#[derive(Debug, Default)]
pub struct CpuRateState {
    prev_sample: HashMap<ProcessKey, CpuSample>,
    seen: HashSet<ProcessKey>,
}

impl CpuRateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `sample` and returns the CPU percentage for this process.
    pub fn update(&mut self, key: ProcessKey, sample: CpuSample) -> f64 {
        self.seen.insert(key);
        let percent = match self.prev_sample.get(&key) {
            Some(prev) => interval_percent(prev, &sample),
            None => lifetime_percent(&sample),
        };
        self.prev_sample.insert(key, sample);
        percent
    }

    /// Drops samples of processes not updated since the previous call.
    pub fn evict_unseen(&mut self) {
        let seen = std::mem::take(&mut self.seen);
        self.prev_sample.retain(|key, _| seen.contains(key));
    }

    pub fn len(&self) -> usize {
        self.prev_sample.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prev_sample.is_empty()
    }
}

fn interval_percent(prev: &CpuSample, curr: &CpuSample) -> f64 {
    let (Some(cpu), Some(wall)) = (
        df64(curr.cpu_total, prev.cpu_total),
        df64(curr.uptime, prev.uptime),
    ) else {
        return 0.0;
    };
    if wall <= 0.0 {
        return 0.0;
    }
    100.0 * cpu / wall
}

fn lifetime_percent(sample: &CpuSample) -> f64 {
    match df64(sample.uptime, sample.start_time) {
        Some(alive) if alive > 0.0 => 100.0 * sample.cpu_total / alive,
        _ => 0.0,
    }
}
