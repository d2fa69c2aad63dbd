//! One sampling pass: enumerate, sample, publish.
//!
//! Scheduling (the sleep between passes) belongs to the caller; see the
//! exporter binary's tick loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::collector::{Collector, FileSystem};
use crate::labels::display_name;
use crate::metrics::MetricSet;

/// Outcome of a single pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Number of task-runner processes published.
    pub published: usize,
    /// Task runners published with a blank identity.
    pub unparsed: usize,
    /// Processes found under the proc root.
    pub scanned: usize,
    /// Live processes skipped because their command line was unreadable.
    pub unreadable: usize,
    /// `false` when the process table could not be listed.
    pub enumerated: bool,
    pub duration: Duration,
}

/// Owns the collector and writes into the shared metric set.
pub struct SamplingCycle<F: FileSystem> {
    collector: Collector<F>,
    metrics: Arc<MetricSet>,
}

impl<F: FileSystem> SamplingCycle<F> {
    pub fn new(collector: Collector<F>, metrics: Arc<MetricSet>) -> Self {
        Self { collector, metrics }
    }

    /// Runs one pass and republishes the metric set.
    ///
    /// A failure to list processes is logged and published as an empty
    /// cycle, so series of the previous cycle do not linger.
    pub fn run_once(&mut self) -> CycleReport {
        let start = Instant::now();

        let (processes, enumerated) = match self.collector.collect() {
            Ok(processes) => (processes, true),
            Err(e) => {
                warn!(error = %e, "failed to enumerate processes");
                (Vec::new(), false)
            }
        };

        for process in &processes {
            debug!(
                pid = process.pid,
                name = %display_name(&process.identity),
                rss = process.usage.mem_rss,
                cpu_percent = process.usage.cpu_percent,
                "task runner"
            );
        }

        self.metrics.publish(&processes);

        let stats = self.collector.last_stats().cloned().unwrap_or_default();
        CycleReport {
            published: processes.len(),
            unparsed: stats.unparsed,
            scanned: stats.scanned,
            unreadable: stats.unreadable,
            enumerated,
            duration: start.elapsed(),
        }
    }
}
