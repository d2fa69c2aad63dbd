//! Recognition of Airflow task-runner processes by their command line.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::TaskIdentity;

/// Marker present in every task-runner invocation.
pub const RUN_MARKER: &str = "airflow run";

/// Marker of the leaf (`--raw`) invocation that actually executes the task,
/// as opposed to the supervising `airflow run` parent.
pub const RAW_MARKER: &str = " --raw ";

static RUN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?-u)airflow run (?P<dag>\w+) (?P<task>\w+) (?P<exec_date>\d{4}-\d\d-\d\dT\d\d:\d\d:\d\d)",
    )
    .expect("task-runner pattern is a valid regex")
});

/// Decides whether a command line belongs to a task-runner process.
///
/// Returns `None` for unrelated processes. A command line that carries both
/// markers is always a target; if its arguments do not follow the
/// `airflow run <dag> <task> <exec_date>` layout the identity comes back
/// blank instead of the process being dropped.
pub fn match_cmdline(cmdline: &str) -> Option<TaskIdentity> {
    if !cmdline.contains(RUN_MARKER) || !cmdline.contains(RAW_MARKER) {
        return None;
    }

    let identity = RUN_PATTERN
        .captures(cmdline)
        .map(|caps| TaskIdentity {
            workflow_id: caps["dag"].to_string(),
            task_id: caps["task"].to_string(),
            execution_date: caps["exec_date"].to_string(),
        })
        .unwrap_or_default();

    Some(identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_identity_from_raw_invocation() {
        let identity =
            match_cmdline("airflow run my_dag extract_op 2024-01-02T03:04:05 --raw --job_id 7")
                .unwrap();

        assert_eq!(identity.workflow_id, "my_dag");
        assert_eq!(identity.task_id, "extract_op");
        assert_eq!(identity.execution_date, "2024-01-02T03:04:05");
    }

    #[test]
    fn extracts_identity_behind_interpreter_prefix() {
        let cmdline = "/usr/bin/python3 /usr/local/bin/airflow run etl_daily load_users 2023-11-30T00:00:00 --job_id 42 --raw -sd DAGS_FOLDER/etl.py";
        let identity = match_cmdline(cmdline).unwrap();

        assert_eq!(identity.workflow_id, "etl_daily");
        assert_eq!(identity.task_id, "load_users");
        assert_eq!(identity.execution_date, "2023-11-30T00:00:00");
    }

    #[test]
    fn execution_date_ignores_fractional_and_offset_suffix() {
        let identity =
            match_cmdline("airflow run d t 2024-05-06T07:08:09.123456+00:00 --raw -sd x").unwrap();
        assert_eq!(identity.execution_date, "2024-05-06T07:08:09");
    }

    #[test]
    fn supervisor_without_raw_is_not_a_target() {
        assert!(match_cmdline("airflow run my_dag extract_op 2024-01-02T03:04:05 --local -sd x").is_none());
    }

    #[test]
    fn raw_without_run_is_not_a_target() {
        assert!(match_cmdline("airflow test my_dag extract_op 2024-01-02T03:04:05 --raw x").is_none());
    }

    #[test]
    fn unrelated_processes_are_not_targets() {
        assert!(match_cmdline("").is_none());
        assert!(match_cmdline("/usr/sbin/sshd -D").is_none());
        assert!(match_cmdline("airflow scheduler").is_none());
    }

    #[test]
    fn malformed_target_yields_blank_identity() {
        let identity = match_cmdline("airflow run my-dag extract 2024-01-02 --raw -sd x").unwrap();
        assert!(identity.is_blank());
    }

    #[test]
    fn non_ascii_digits_and_ids_are_not_identities() {
        let identity = match_cmdline("airflow run d t ２０２４-01-02T03:04:05 --raw x").unwrap();
        assert!(identity.is_blank());

        let identity = match_cmdline("airflow run dág t 2024-01-02T03:04:05 --raw x").unwrap();
        assert!(identity.is_blank());
    }

    #[test]
    fn raw_marker_needs_surrounding_spaces() {
        assert!(match_cmdline("airflow run d t 2024-01-02T03:04:05 --raw").is_none());
        assert!(match_cmdline("airflow run d t 2024-01-02T03:04:05 --rawx y").is_none());
    }
}
