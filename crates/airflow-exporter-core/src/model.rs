//! Per-cycle sample records.

/// Identity of a task-runner process, extracted from its command line.
///
/// All fields are blank when the process carried the task-runner markers but
/// its command line did not match the `run <dag> <task> <date>` layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TaskIdentity {
    pub workflow_id: String,
    pub task_id: String,
    /// Execution date as written on the command line (`YYYY-MM-DDTHH:MM:SS`).
    pub execution_date: String,
}

impl TaskIdentity {
    pub fn is_blank(&self) -> bool {
        self.workflow_id.is_empty() && self.task_id.is_empty() && self.execution_date.is_empty()
    }
}

/// Resource readings for one process.
///
/// Memory figures are in bytes, CPU times in seconds. A reading whose source
/// could not be read is left at zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceUsage {
    pub mem_rss: f64,
    pub mem_vms: f64,
    pub mem_shared: f64,
    pub mem_text: f64,
    pub mem_data: f64,
    pub mem_lib: f64,
    pub mem_uss: f64,
    pub mem_pss: f64,
    pub mem_swap: f64,
    pub cpu_user: f64,
    pub cpu_system: f64,
    pub cpu_percent: f64,
}

/// One matched task-runner process, sampled during a single cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskProcess {
    pub pid: u32,
    pub identity: TaskIdentity,
    pub usage: ResourceUsage,
}
