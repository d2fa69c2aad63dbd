//! Readers for the Linux `/proc` filesystem.
//!
//! `parser` holds pure functions over file contents; `process` reads them
//! for a given PID through a [`FileSystem`](crate::collector::FileSystem).

pub mod parser;
pub mod process;

pub use process::{CLK_TCK, CollectError, CpuTicks, ProcessSample, ProcessSampler, SmapsAggregation};
