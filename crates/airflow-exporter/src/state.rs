//! Shared application state.

use std::sync::{Arc, Mutex};

use airflow_exporter_core::{MetricSet, SamplingCycle};

/// State handed to every HTTP handler.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) metrics: Arc<MetricSet>,
    pub(crate) telemetry_path: Arc<str>,
}

/// The sampling cycle, locked by the tick loop for the duration of one pass.
pub(crate) type SharedCycle<F> = Arc<Mutex<SamplingCycle<F>>>;
