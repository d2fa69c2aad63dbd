//! Process collector for Linux.
//!
//! Reads the `/proc` filesystem through the [`FileSystem`] trait so that the
//! whole pipeline can run against [`MockFs`] fixtures in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                   Collector                   │
//! │  list pids → cmdline → matcher → sampler      │
//! │                          │          │         │
//! │                          │   CpuRateState     │
//! │                  ┌───────▼──────────▼──────┐  │
//! │                  │     ProcessSampler      │  │
//! │                  │ statm / smaps / stat    │  │
//! │                  └────────────┬────────────┘  │
//! │                        ┌──────▼──────┐        │
//! │                        │  FileSystem │ (trait)│
//! │                        └──────┬──────┘        │
//! └───────────────────────────────┼───────────────┘
//!                          ┌──────┴──────┐
//!                   ┌──────▼─────┐ ┌─────▼──────┐
//!                   │   RealFs   │ │   MockFs   │
//!                   └────────────┘ └────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use airflow_exporter_core::collector::{Collector, MockFs};
//!
//! let fs = MockFs::airflow_worker();
//! let mut collector = Collector::new(fs, "/proc");
//! let processes = collector.collect().unwrap();
//! assert_eq!(processes.len(), 3);
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod mock;
pub mod procfs;
pub mod traits;

pub use collector::{Collector, CollectorStats};
pub use mock::MockFs;
pub use procfs::{CollectError, SmapsAggregation};
pub use traits::{FileSystem, RealFs};
