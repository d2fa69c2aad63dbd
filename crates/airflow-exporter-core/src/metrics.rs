//! Gauge families published for scraping.
//!
//! One `GaugeVec` per resource dimension, all sharing the constant labels and
//! the per-process label schema. Each publish replaces the full contents, so
//! series of processes that exited disappear on the next cycle.

use std::sync::{PoisonError, RwLock};

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

use crate::labels::{ConstLabels, TASK_LABEL_NAMES, TaskLabels};
use crate::model::{ResourceUsage, TaskProcess};

/// Prefix shared by every published family.
pub const METRIC_PREFIX: &str = "airflow_process";

/// Error type for metric set failures.
#[derive(Debug)]
pub enum MetricsError {
    /// Registration failed, e.g. an invalid or duplicated label name.
    Registration(prometheus::Error),
    /// The registry could not be encoded in the text format.
    Encoding(prometheus::Error),
}

impl std::fmt::Display for MetricsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricsError::Registration(e) => write!(f, "metric registration failed: {}", e),
            MetricsError::Encoding(e) => write!(f, "metric encoding failed: {}", e),
        }
    }
}

impl std::error::Error for MetricsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MetricsError::Registration(e) | MetricsError::Encoding(e) => Some(e),
        }
    }
}

/// Resource dimensions, one gauge family each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    MemRss,
    MemVms,
    MemShared,
    MemText,
    MemData,
    MemLib,
    MemUss,
    MemPss,
    MemSwap,
    CpuPercent,
    CpuUser,
    CpuSystem,
}

impl Dimension {
    pub const ALL: [Dimension; 12] = [
        Dimension::MemRss,
        Dimension::MemVms,
        Dimension::MemShared,
        Dimension::MemText,
        Dimension::MemData,
        Dimension::MemLib,
        Dimension::MemUss,
        Dimension::MemPss,
        Dimension::MemSwap,
        Dimension::CpuPercent,
        Dimension::CpuUser,
        Dimension::CpuSystem,
    ];

    /// Family name suffix after [`METRIC_PREFIX`].
    pub fn suffix(self) -> &'static str {
        match self {
            Dimension::MemRss => "mem_rss",
            Dimension::MemVms => "mem_vms",
            Dimension::MemShared => "mem_shared",
            Dimension::MemText => "mem_text",
            Dimension::MemData => "mem_data",
            Dimension::MemLib => "mem_lib",
            Dimension::MemUss => "mem_uss",
            Dimension::MemPss => "mem_pss",
            Dimension::MemSwap => "mem_swap",
            Dimension::CpuPercent => "cpu_percent",
            Dimension::CpuUser => "cpu_times_user",
            Dimension::CpuSystem => "cpu_times_system",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Dimension::MemRss => "Non-swapped physical memory in bytes",
            Dimension::MemVms => "Amount of virtual memory in bytes",
            Dimension::MemShared => "Amount of shared memory in bytes",
            Dimension::MemText => "Memory devoted to executable code in bytes",
            Dimension::MemData => "Memory devoted to other than executable code in bytes",
            Dimension::MemLib => "Memory used by shared libraries in bytes",
            Dimension::MemUss => "Memory unique to the process, freed on exit, in bytes",
            Dimension::MemPss => {
                "Memory shared with other processes, divided evenly between them, in bytes"
            }
            Dimension::MemSwap => "Amount of swapped memory in bytes",
            Dimension::CpuPercent => "CPU utilisation of the process as a percentage of one core",
            Dimension::CpuUser => "CPU time spent in user mode in seconds",
            Dimension::CpuSystem => "CPU time spent in kernel mode in seconds",
        }
    }

    pub fn value(self, usage: &ResourceUsage) -> f64 {
        match self {
            Dimension::MemRss => usage.mem_rss,
            Dimension::MemVms => usage.mem_vms,
            Dimension::MemShared => usage.mem_shared,
            Dimension::MemText => usage.mem_text,
            Dimension::MemData => usage.mem_data,
            Dimension::MemLib => usage.mem_lib,
            Dimension::MemUss => usage.mem_uss,
            Dimension::MemPss => usage.mem_pss,
            Dimension::MemSwap => usage.mem_swap,
            Dimension::CpuPercent => usage.cpu_percent,
            Dimension::CpuUser => usage.cpu_user,
            Dimension::CpuSystem => usage.cpu_system,
        }
    }

    pub fn metric_name(self) -> String {
        format!("{}_{}", METRIC_PREFIX, self.suffix())
    }
}

/// The published gauge families.
///
/// `publish` and `render` are serialised by a reader/writer lock held only
/// for the reset-and-set pass and for `gather`, so a scrape sees either the
/// previous or the new cycle, never a mix.
pub struct MetricSet {
    registry: Registry,
    gauges: Vec<(Dimension, GaugeVec)>,
    publish_lock: RwLock<()>,
}

impl MetricSet {
    /// Creates and registers every gauge family.
    pub fn new(const_labels: ConstLabels) -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let const_labels = const_labels.into_inner();

        let mut gauges = Vec::with_capacity(Dimension::ALL.len());
        for dimension in Dimension::ALL {
            let opts = Opts::new(dimension.metric_name(), dimension.help())
                .const_labels(const_labels.clone());
            let vec = GaugeVec::new(opts, &TASK_LABEL_NAMES).map_err(MetricsError::Registration)?;
            registry
                .register(Box::new(vec.clone()))
                .map_err(MetricsError::Registration)?;
            gauges.push((dimension, vec));
        }

        Ok(Self {
            registry,
            gauges,
            publish_lock: RwLock::new(()),
        })
    }

    /// Replaces all published series with the given records.
    ///
    /// Records sharing the full label tuple collapse into one series; the
    /// last one wins.
    pub fn publish(&self, processes: &[TaskProcess]) {
        let _guard = self
            .publish_lock
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        for (_, vec) in &self.gauges {
            vec.reset();
        }

        for process in processes {
            let labels = TaskLabels::from(&process.identity);
            let values = labels.values();
            for (dimension, vec) in &self.gauges {
                vec.with_label_values(&values)
                    .set(dimension.value(&process.usage));
            }
        }
    }

    /// Encodes the current contents in the Prometheus text format.
    pub fn render(&self) -> Result<String, MetricsError> {
        let families = {
            let _guard = self
                .publish_lock
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            self.registry.gather()
        };

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .map_err(MetricsError::Encoding)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Content type of [`MetricSet::render`] output.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Number of published series in each family.
    pub fn series_count(&self) -> usize {
        let _guard = self
            .publish_lock
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        self.registry
            .gather()
            .iter()
            .find(|family| family.get_name() == Dimension::MemRss.metric_name())
            .map(|family| family.get_metric().len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskIdentity;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn task(pid: u32, workflow: &str, task_id: &str, rss: f64) -> TaskProcess {
        TaskProcess {
            pid,
            identity: TaskIdentity {
                workflow_id: workflow.to_string(),
                task_id: task_id.to_string(),
                execution_date: "2024-01-02T03:04:05".to_string(),
            },
            usage: ResourceUsage {
                mem_rss: rss,
                mem_vms: rss * 4.0,
                mem_data: rss / 2.0,
                cpu_user: 1.5,
                cpu_percent: 12.5,
                ..Default::default()
            },
        }
    }

    fn series_lines<'a>(text: &'a str, dimension: Dimension) -> Vec<&'a str> {
        let prefix = format!("{}{{", dimension.metric_name());
        text.lines().filter(|l| l.starts_with(&prefix)).collect()
    }

    fn metric_set() -> MetricSet {
        MetricSet::new(ConstLabels::build("host1", None, &[])).unwrap()
    }

    #[test]
    fn publishes_one_series_per_dimension_per_process() {
        let metrics = metric_set();
        metrics.publish(&[task(1, "my_dag", "extract_op", 1024.0), task(2, "my_dag", "load", 2048.0)]);

        let text = metrics.render().unwrap();
        for dimension in Dimension::ALL {
            assert_eq!(series_lines(&text, dimension).len(), 2, "{:?}", dimension);
        }
        assert_eq!(metrics.series_count(), 2);
    }

    #[test]
    fn series_carry_task_and_const_labels() {
        let custom = vec!["team".to_string(), "env".to_string()];
        let metrics =
            MetricSet::new(ConstLabels::build("host1", Some("override-host"), &custom)).unwrap();
        metrics.publish(&[task(1, "my_dag", "extract_op", 1024.0)]);

        let text = metrics.render().unwrap();
        let lines = series_lines(&text, Dimension::MemRss);
        assert_eq!(lines.len(), 1);
        let line = lines[0];
        assert!(line.contains(r#"name="extract_op.my_dag_2024-01-02T03:04:05""#));
        assert!(line.contains(r#"workflow="my_dag""#));
        assert!(line.contains(r#"task="extract_op""#));
        assert!(line.contains(r#"exec_date="2024-01-02T03:04:05""#));
        assert!(line.contains(r#"hostname="host1""#));
        assert!(line.contains(r#"host_hostname="override-host""#));
        assert!(line.contains(r#"team="true""#));
        assert!(line.contains(r#"env="true""#));
        assert!(line.ends_with(" 1024"));
    }

    #[test]
    fn data_dimension_reports_data_not_virtual_memory() {
        let metrics = metric_set();
        metrics.publish(&[task(1, "my_dag", "extract_op", 1024.0)]);

        let text = metrics.render().unwrap();
        assert!(series_lines(&text, Dimension::MemData)[0].ends_with(" 512"));
        assert!(series_lines(&text, Dimension::MemVms)[0].ends_with(" 4096"));
        assert!(series_lines(&text, Dimension::CpuPercent)[0].ends_with(" 12.5"));
    }

    #[test]
    fn empty_publish_clears_previous_series() {
        let metrics = metric_set();
        metrics.publish(&[task(1, "my_dag", "extract_op", 1024.0), task(2, "other", "t", 1.0)]);
        assert_eq!(metrics.series_count(), 2);

        metrics.publish(&[]);

        let text = metrics.render().unwrap();
        for dimension in Dimension::ALL {
            assert!(series_lines(&text, dimension).is_empty());
        }
        assert_eq!(metrics.series_count(), 0);
    }

    #[test]
    fn exited_process_series_is_removed() {
        let metrics = metric_set();
        metrics.publish(&[task(1, "my_dag", "extract_op", 1024.0), task(2, "my_dag", "load", 1.0)]);
        metrics.publish(&[task(2, "my_dag", "load", 1.0)]);

        let text = metrics.render().unwrap();
        let lines = series_lines(&text, Dimension::MemRss);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(r#"task="load""#));
    }

    #[test]
    fn identical_label_tuples_collapse() {
        let metrics = metric_set();
        metrics.publish(&[task(1, "d", "t", 1.0), task(2, "d", "t", 7.0)]);

        let text = metrics.render().unwrap();
        let lines = series_lines(&text, Dimension::MemRss);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(" 7"));
    }

    #[test]
    fn invalid_custom_label_is_rejected() {
        let custom = vec!["not-a-label".to_string()];
        let result = MetricSet::new(ConstLabels::build("host1", None, &custom));
        assert!(matches!(result, Err(MetricsError::Registration(_))));
    }

    #[test]
    fn custom_label_clashing_with_task_label_is_rejected() {
        let custom = vec!["workflow".to_string()];
        let result = MetricSet::new(ConstLabels::build("host1", None, &custom));
        assert!(result.is_err());
    }

    #[test]
    fn concurrent_scrapes_see_whole_cycles() {
        let metrics = Arc::new(metric_set());
        let three = vec![task(1, "a", "x", 1.0), task(2, "b", "y", 2.0), task(3, "c", "z", 3.0)];
        let one = vec![task(4, "d", "w", 4.0)];
        metrics.publish(&three);

        let stop = Arc::new(AtomicBool::new(false));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    let mut scrapes = 0;
                    while !stop.load(Ordering::Relaxed) || scrapes == 0 {
                        let text = metrics.render().unwrap();
                        let counts: Vec<usize> = Dimension::ALL
                            .iter()
                            .map(|d| series_lines(&text, *d).len())
                            .collect();
                        assert!(counts[0] == 3 || counts[0] == 1, "torn scrape: {:?}", counts);
                        assert!(counts.iter().all(|c| *c == counts[0]), "torn scrape: {:?}", counts);
                        scrapes += 1;
                    }
                })
            })
            .collect();

        for i in 0..200 {
            metrics.publish(if i % 2 == 0 { &one } else { &three });
        }
        stop.store(true, Ordering::Relaxed);

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
