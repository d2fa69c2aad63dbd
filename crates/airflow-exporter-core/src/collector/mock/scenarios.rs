//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic `/proc` states of a host running
//! Airflow workers.

use super::filesystem::MockFs;

/// `airflow run ... --raw` leaf process of `my_dag.extract_op`.
pub const RAW_TASK_PID: u32 = 4101;
/// Supervising `airflow run ... --local` parent of [`RAW_TASK_PID`].
pub const SUPERVISOR_PID: u32 = 4100;
/// `--raw` leaf process whose task name already embeds the DAG name.
pub const EMBEDDED_TASK_PID: u32 = 4201;
/// `--raw` process whose arguments do not follow the expected layout.
pub const MALFORMED_TASK_PID: u32 = 4301;

const SMAPS_TWO_REGIONS: &str = "\
55d0c0a00000-55d0c0a21000 r--p 00000000 08:01 1234 /usr/bin/python3.11
Size:                132 kB
Rss:                 128 kB
Pss:                  64 kB
Shared_Clean:         64 kB
Shared_Dirty:          0 kB
Private_Clean:        40 kB
Private_Dirty:        24 kB
Swap:                  8 kB
VmFlags: rd mr mw me dw sd
7ffd5a1f0000-7ffd5a211000 rw-p 00000000 00:00 0 [stack]
Rss:                  12 kB
Pss:                  12 kB
Private_Dirty:        12 kB
Swap:                  4 kB
";

const SMAPS_ONE_REGION: &str = "\
5612a0000000-5612a0100000 r-xp 00000000 08:01 99 /usr/bin/python3.11
Rss:                 512 kB
Pss:                 256 kB
Shared_Clean:        256 kB
Private_Clean:       128 kB
Private_Dirty:       128 kB
Swap:                  0 kB
";

/// Builds a `/proc/[pid]/stat` line with the given CPU accounting.
pub fn stat_line(pid: u32, comm: &str, utime: u64, stime: u64, starttime: u64) -> String {
    format!(
        "{pid} ({comm}) S 1 {pid} {pid} 0 -1 4194304 100 0 0 0 {utime} {stime} 0 0 20 0 1 0 {starttime} 245760000 12000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0"
    )
}

impl MockFs {
    /// A worker host: init, a kernel thread, the scheduler, and three task
    /// runners (one supervisor/raw pair, one embedded-name task, one
    /// malformed command line).
    pub fn airflow_worker() -> Self {
        let mut fs = Self::new();

        fs.add_file("/proc/uptime", "2000.00 7000.00\n");

        fs.add_process(
            1,
            "/sbin/init\0splash\0",
            "42000 3000 2000 300 0 1000 0\n",
            &stat_line(1, "systemd", 500, 900, 1),
            "",
        );

        // Kernel threads have an empty cmdline.
        fs.add_process(2, "", "0 0 0 0 0 0 0\n", &stat_line(2, "kthreadd", 0, 10, 1), "");

        fs.add_process(
            300,
            "/usr/bin/python3\0/usr/local/bin/airflow\0scheduler\0",
            "90000 25000 4000 700 0 40000 0\n",
            &stat_line(300, "airflow", 90000, 12000, 5000),
            SMAPS_ONE_REGION,
        );

        fs.add_process(
            SUPERVISOR_PID,
            "/usr/bin/python3\0/usr/local/bin/airflow\0run\0my_dag\0extract_op\02024-01-02T03:04:05\0--local\0-sd\0DAGS_FOLDER/my_dag.py\0",
            "50000 10000 3000 700 0 15000 0\n",
            &stat_line(SUPERVISOR_PID, "airflow", 200, 50, 99000),
            SMAPS_ONE_REGION,
        );

        fs.add_process(
            RAW_TASK_PID,
            "/usr/bin/python3\0/usr/local/bin/airflow\0run\0my_dag\0extract_op\02024-01-02T03:04:05\0--job_id\07\0--raw\0-sd\0DAGS_FOLDER/my_dag.py\0",
            "60000 12000 3000 700 0 20000 0\n",
            &stat_line(RAW_TASK_PID, "airflow", 1500, 300, 100000),
            SMAPS_TWO_REGIONS,
        );

        fs.add_process(
            EMBEDDED_TASK_PID,
            "/usr/bin/python3\0/usr/local/bin/airflow\0run\0my_dag\0my_dag_extract\02024-01-02T03:04:05\0--job_id\08\0--raw\0-sd\0DAGS_FOLDER/my_dag.py\0",
            "55000 11000 3000 700 0 18000 0\n",
            &stat_line(EMBEDDED_TASK_PID, "airflow", 400, 100, 150000),
            SMAPS_ONE_REGION,
        );

        fs.add_process(
            MALFORMED_TASK_PID,
            "/usr/bin/python3\0/usr/local/bin/airflow\0run\0broken-dag\0load\0yesterday\0--raw\0-sd\0DAGS_FOLDER/broken.py\0",
            "30000 5000 1000 700 0 9000 0\n",
            &stat_line(MALFORMED_TASK_PID, "airflow", 100, 100, 180000),
            SMAPS_ONE_REGION,
        );

        fs
    }

    /// A host with a single raw task runner whose `stat` and `smaps` are
    /// unreadable (e.g. restricted by hidepid / ptrace policy).
    pub fn partial_failure() -> Self {
        let mut fs = Self::new();

        fs.add_file("/proc/uptime", "500.00 1000.00\n");
        fs.add_process(
            RAW_TASK_PID,
            "airflow\0run\0my_dag\0extract_op\02024-01-02T03:04:05\0--raw\0-sd\0x.py\0",
            "60000 12000 3000 700 0 20000 0\n",
            "",
            "",
        );

        fs
    }

    /// A host with no task runners at all.
    pub fn idle_host() -> Self {
        let mut fs = Self::new();

        fs.add_file("/proc/uptime", "100.00 200.00\n");
        fs.add_process(
            1,
            "/sbin/init\0",
            "42000 3000 2000 300 0 1000 0\n",
            &stat_line(1, "systemd", 500, 900, 1),
            "",
        );

        fs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::procfs::parser::parse_proc_stat;

    #[test]
    fn test_stat_line_round_trips_cpu_fields() {
        let stat = parse_proc_stat(&stat_line(77, "airflow", 12, 34, 5678)).unwrap();
        assert_eq!(stat.pid, 77);
        assert_eq!(stat.utime, 12);
        assert_eq!(stat.stime, 34);
        assert_eq!(stat.starttime, 5678);
    }
}
