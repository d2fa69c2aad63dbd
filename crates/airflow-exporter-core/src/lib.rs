//! airflow-exporter-core: sampling side of the Airflow process exporter.
//!
//! Provides:
//! - `collector`: `/proc` reading, resource sampling, mock filesystem
//! - `matcher`: task-runner recognition and identity extraction
//! - `model`: per-cycle sample records
//! - `labels`: series labels (per-task and constant)
//! - `metrics`: the published gauge families
//! - `rates`: CPU percentage from successive CPU-time samples
//! - `cycle`: one enumerate → sample → publish pass

pub mod collector;
pub mod cycle;
pub mod labels;
pub mod matcher;
pub mod metrics;
pub mod model;
pub mod rates;

pub use cycle::{CycleReport, SamplingCycle};
pub use metrics::{MetricSet, MetricsError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
