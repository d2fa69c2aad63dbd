//! Collector that turns the process table into task-runner sample records.

use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::collector::procfs::{CLK_TCK, CollectError, ProcessSampler, SmapsAggregation};
use crate::collector::traits::FileSystem;
use crate::matcher::match_cmdline;
use crate::model::TaskProcess;
use crate::rates::{CpuRateState, CpuSample};

/// Counters from the last `collect` call.
#[derive(Debug, Clone, Default)]
pub struct CollectorStats {
    /// Number of PIDs found under the proc root.
    pub scanned: usize,
    /// Number of task-runner processes sampled.
    pub matched: usize,
    /// Matched processes whose identity could not be parsed.
    pub unparsed: usize,
    /// Live processes whose command line could not be read.
    pub unreadable: usize,
    pub duration: Duration,
}

/// Enumerates processes, keeps the task runners and samples their resources.
pub struct Collector<F: FileSystem> {
    sampler: ProcessSampler<F>,
    cpu_rates: CpuRateState,
    last_stats: Option<CollectorStats>,
}

impl<F: FileSystem> Collector<F> {
    /// Creates a new collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            sampler: ProcessSampler::new(fs, proc_path),
            cpu_rates: CpuRateState::new(),
            last_stats: None,
        }
    }

    pub fn with_smaps_aggregation(mut self, policy: SmapsAggregation) -> Self {
        self.sampler = self.sampler.with_smaps_aggregation(policy);
        self
    }

    /// Counters from the last successful `collect` call.
    pub fn last_stats(&self) -> Option<&CollectorStats> {
        self.last_stats.as_ref()
    }

    /// Collects one sample record per task-runner process.
    ///
    /// Only a failure to list the proc root is reported as an error.
    /// Processes that exit while being read are skipped; a command line that
    /// fails for any other reason is logged and counted in
    /// [`CollectorStats::unreadable`]. Unreadable resource sources leave
    /// their fields at zero.
    pub fn collect(&mut self) -> Result<Vec<TaskProcess>, CollectError> {
        let start = Instant::now();
        self.last_stats = None;
        let pids = self.sampler.list_pids()?;
        let uptime = self.sampler.read_uptime();

        let mut stats = CollectorStats {
            scanned: pids.len(),
            ..Default::default()
        };
        let mut processes = Vec::new();

        for pid in pids {
            let cmdline = match self.sampler.read_cmdline(pid) {
                Ok(cmdline) => cmdline,
                Err(CollectError::ProcessGone(_)) => continue,
                Err(e) => {
                    stats.unreadable += 1;
                    warn!(pid, error = %e, "cannot read command line, process skipped");
                    continue;
                }
            };

            let Some(identity) = match_cmdline(&cmdline) else {
                continue;
            };
            if identity.is_blank() {
                stats.unparsed += 1;
                debug!(pid, cmdline = %cmdline, "task runner with unrecognised arguments");
            }

            let sample = self.sampler.sample(pid);
            let mut usage = sample.usage;

            if let (Some(cpu), Some(uptime)) = (sample.cpu, uptime) {
                let cpu_sample = CpuSample {
                    cpu_total: usage.cpu_user + usage.cpu_system,
                    start_time: cpu.starttime as f64 / CLK_TCK as f64,
                    uptime,
                };
                usage.cpu_percent = self.cpu_rates.update((pid, cpu.starttime), cpu_sample);
            }

            trace!(pid, ?identity, ?usage, "sampled task runner");
            processes.push(TaskProcess {
                pid,
                identity,
                usage,
            });
        }

        self.cpu_rates.evict_unseen();

        stats.matched = processes.len();
        stats.duration = start.elapsed();
        self.last_stats = Some(stats);

        Ok(processes)
    }
}
