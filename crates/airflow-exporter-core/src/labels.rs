//! Label derivation for published series.
//!
//! Every series carries the per-process labels of [`TaskLabels`] plus the
//! process-wide [`ConstLabels`].

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::model::TaskIdentity;

/// Per-process label names, in the order values are passed to gauges.
pub const TASK_LABEL_NAMES: [&str; 4] = ["name", "workflow", "task", "exec_date"];

/// Builds the human-readable series name of a task.
///
/// Task ids that already contain the workflow id are used as-is, others get
/// `.<workflow>` appended. The execution date is always appended so that
/// repeated runs of one task stay apart.
pub fn display_name(identity: &TaskIdentity) -> String {
    let base = if identity.task_id.contains(&identity.workflow_id) {
        identity.task_id.clone()
    } else {
        format!("{}.{}", identity.task_id, identity.workflow_id)
    };
    format!("{}_{}", base, identity.execution_date)
}

/// Label values of one sample record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskLabels {
    pub name: String,
    pub workflow: String,
    pub task: String,
    pub exec_date: String,
}

impl TaskLabels {
    /// Values in [`TASK_LABEL_NAMES`] order.
    pub fn values(&self) -> [&str; 4] {
        [
            self.name.as_str(),
            self.workflow.as_str(),
            self.task.as_str(),
            self.exec_date.as_str(),
        ]
    }
}

impl From<&TaskIdentity> for TaskLabels {
    fn from(identity: &TaskIdentity) -> Self {
        Self {
            name: display_name(identity),
            workflow: identity.workflow_id.clone(),
            task: identity.task_id.clone(),
            exec_date: identity.execution_date.clone(),
        }
    }
}

/// Labels attached to every published series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstLabels(HashMap<String, String>);

impl ConstLabels {
    /// Composes the constant labels.
    ///
    /// # Arguments
    /// * `hostname` - Machine hostname, published as `hostname`
    /// * `host_hostname` - Hostname of the underlying host when running in a
    ///   container, published as `host_hostname` (whitespace trimmed)
    /// * `custom` - Label names published with the value `"true"`
    pub fn build(hostname: &str, host_hostname: Option<&str>, custom: &[String]) -> Self {
        let mut labels = HashMap::new();
        labels.insert("hostname".to_string(), hostname.to_string());

        if let Some(host) = host_hostname {
            labels.insert("host_hostname".to_string(), host.trim().to_string());
        }

        for name in custom.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            labels.insert(name.to_string(), "true".to_string());
        }

        Self(labels)
    }

    /// Like [`ConstLabels::build`], reading `host_hostname` from a file.
    ///
    /// An unreadable file is ignored and the label left out.
    pub fn from_sources(hostname: &str, hostname_path: Option<&Path>, custom: &[String]) -> Self {
        let host_hostname = hostname_path.and_then(|path| match std::fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "hostname file unreadable, ignoring");
                None
            }
        });
        Self::build(hostname, host_hostname.as_deref(), custom)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> HashMap<String, String> {
        self.0
    }
}
