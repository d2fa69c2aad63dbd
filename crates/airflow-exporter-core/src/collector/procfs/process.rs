//! Resource sampler reading per-process figures from `/proc/[pid]/`.
//!
//! Each source (`statm`, `smaps`, `stat`) is read independently. A source
//! that cannot be read or parsed only zeroes its own fields; the sample is
//! always produced.

use std::io::ErrorKind;
use std::path::Path;

use tracing::trace;

use crate::collector::procfs::parser::{
    SmapsRegion, parse_cmdline, parse_proc_stat, parse_smaps, parse_statm, parse_uptime,
};
use crate::collector::traits::FileSystem;
use crate::model::ResourceUsage;

/// Clock ticks per second (USER_HZ). Standard value for Linux.
pub const CLK_TCK: u64 = 100;

/// `errno` for a process that exited between listing and reading.
const ESRCH: i32 = 3;

/// Default page size in bytes.
const PAGE_SIZE: u64 = 4096;

/// Error type for collection failures.
#[derive(Debug)]
pub enum CollectError {
    /// Process disappeared during collection.
    ProcessGone(u32),
    /// I/O error reading process files.
    Io(std::io::Error),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::ProcessGone(pid) => write!(f, "process {} disappeared", pid),
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

/// How the per-region figures of `/proc/[pid]/smaps` are reduced to one
/// process-level value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SmapsAggregation {
    /// Use only the first mapped region. This is an approximation kept for
    /// compatibility with existing dashboards.
    #[default]
    FirstRegion,
    /// Sum the figures of every mapped region.
    Sum,
}

impl SmapsAggregation {
    /// Reduces `regions` according to the policy. Empty input gives zeros.
    pub fn aggregate(self, regions: &[SmapsRegion]) -> SmapsRegion {
        match self {
            SmapsAggregation::FirstRegion => regions.first().cloned().unwrap_or_default(),
            SmapsAggregation::Sum => {
                regions
                    .iter()
                    .fold(SmapsRegion::default(), |mut acc, region| {
                        acc.rss += region.rss;
                        acc.pss += region.pss;
                        acc.shared_clean += region.shared_clean;
                        acc.shared_dirty += region.shared_dirty;
                        acc.private_clean += region.private_clean;
                        acc.private_dirty += region.private_dirty;
                        acc.swap += region.swap;
                        acc
                    })
            }
        }
    }
}

/// Raw CPU accounting read from `/proc/[pid]/stat`, in clock ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTicks {
    pub utime: u64,
    pub stime: u64,
    pub starttime: u64,
}

/// Best-effort readings for one process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessSample {
    /// Memory and CPU-time readings; `cpu_percent` is left for the caller.
    pub usage: ResourceUsage,
    /// `None` when `/proc/[pid]/stat` was unavailable.
    pub cpu: Option<CpuTicks>,
}

/// Reads process listings and per-process resource figures from `/proc`.
pub struct ProcessSampler<F: FileSystem> {
    fs: F,
    proc_path: String,
    page_size: u64,
    smaps_aggregation: SmapsAggregation,
}

impl<F: FileSystem> ProcessSampler<F> {
    /// Creates a new sampler.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            page_size: PAGE_SIZE,
            smaps_aggregation: SmapsAggregation::default(),
        }
    }

    pub fn with_smaps_aggregation(mut self, policy: SmapsAggregation) -> Self {
        self.smaps_aggregation = policy;
        self
    }

    /// Lists the PIDs currently present under the proc root.
    pub fn list_pids(&self) -> Result<Vec<u32>, CollectError> {
        let entries = self.fs.read_dir(Path::new(&self.proc_path))?;

        let mut pids: Vec<u32> = entries
            .iter()
            .filter_map(|entry| entry.file_name().and_then(|n| n.to_str()))
            .filter_map(|name| name.parse::<u32>().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    /// Reads the space separated command line of a process.
    ///
    /// Only a vanished process maps to `ProcessGone`; any other read failure
    /// is returned as `Io`. Invalid UTF-8 in arguments is replaced, not
    /// rejected.
    pub fn read_cmdline(&self, pid: u32) -> Result<String, CollectError> {
        let content = self.read_pid_file(pid, "cmdline").map_err(|e| {
            if e.kind() == ErrorKind::NotFound || e.raw_os_error() == Some(ESRCH) {
                CollectError::ProcessGone(pid)
            } else {
                CollectError::Io(e)
            }
        })?;
        Ok(parse_cmdline(&content))
    }

    /// Reads the system uptime in seconds, used as the clock for CPU rates.
    pub fn read_uptime(&self) -> Option<f64> {
        let path = format!("{}/uptime", self.proc_path);
        self.fs
            .read_to_string(Path::new(&path))
            .ok()
            .and_then(|content| parse_uptime(&content).ok())
    }

    /// Samples memory and CPU time of one process.
    pub fn sample(&self, pid: u32) -> ProcessSample {
        let mut usage = ResourceUsage::default();

        match self
            .read_pid_file(pid, "statm")
            .map_err(|e| e.to_string())
            .and_then(|content| parse_statm(&content).map_err(|e| e.to_string()))
        {
            Ok(statm) => {
                let page = self.page_size as f64;
                usage.mem_rss = statm.resident as f64 * page;
                usage.mem_vms = statm.size as f64 * page;
                usage.mem_shared = statm.shared as f64 * page;
                usage.mem_text = statm.text as f64 * page;
                usage.mem_lib = statm.lib as f64 * page;
                usage.mem_data = statm.data as f64 * page;
            }
            Err(e) => trace!(pid, error = %e, "statm unavailable"),
        }

        match self
            .read_pid_file(pid, "smaps")
            .map_err(|e| e.to_string())
            .and_then(|content| parse_smaps(&content).map_err(|e| e.to_string()))
        {
            Ok(regions) => {
                let maps = self.smaps_aggregation.aggregate(&regions);
                usage.mem_uss = ((maps.private_clean + maps.private_dirty) * 1024) as f64;
                usage.mem_pss = (maps.pss * 1024) as f64;
                usage.mem_swap = (maps.swap * 1024) as f64;
            }
            Err(e) => trace!(pid, error = %e, "smaps unavailable"),
        }

        let cpu = match self
            .read_pid_file(pid, "stat")
            .map_err(|e| e.to_string())
            .and_then(|content| parse_proc_stat(&content).map_err(|e| e.to_string()))
        {
            Ok(stat) => {
                usage.cpu_user = stat.utime as f64 / CLK_TCK as f64;
                usage.cpu_system = stat.stime as f64 / CLK_TCK as f64;
                Some(CpuTicks {
                    utime: stat.utime,
                    stime: stat.stime,
                    starttime: stat.starttime,
                })
            }
            Err(e) => {
                trace!(pid, error = %e, "stat unavailable");
                None
            }
        };

        ProcessSample { usage, cpu }
    }

    /// Per-pid sources are decoded lossily: argv and mapped file names are
    /// arbitrary bytes.
    fn read_pid_file(&self, pid: u32, name: &str) -> std::io::Result<String> {
        let path = format!("{}/{}/{}", self.proc_path, pid, name);
        let bytes = self.fs.read(Path::new(&path))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
