//! Parsers for `/proc` filesystem files.
//!
//! These are pure functions that parse the content of various `/proc` files
//! into structured data. They are designed to be easily testable with string inputs.

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parsed data from `/proc/[pid]/statm`. All values are in pages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcStatm {
    pub size: u64,
    pub resident: u64,
    pub shared: u64,
    pub text: u64,
    pub lib: u64,
    pub data: u64,
    pub dt: u64,
}

/// Parses `/proc/[pid]/statm` content.
///
/// Format: `size resident shared text lib data dt` on a single line.
pub fn parse_statm(content: &str) -> Result<ProcStatm, ParseError> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.len() < 7 {
        return Err(ParseError::new(format!(
            "not enough fields in statm: expected 7, got {}",
            fields.len()
        )));
    }

    let parse_field = |idx: usize, name: &str| -> Result<u64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    Ok(ProcStatm {
        size: parse_field(0, "size")?,
        resident: parse_field(1, "resident")?,
        shared: parse_field(2, "shared")?,
        text: parse_field(3, "text")?,
        lib: parse_field(4, "lib")?,
        data: parse_field(5, "data")?,
        dt: parse_field(6, "dt")?,
    })
}

/// Parsed data from `/proc/[pid]/stat`, limited to the CPU accounting fields.
#[derive(Debug, Clone, Default)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    /// User mode time in clock ticks.
    pub utime: u64,
    /// Kernel mode time in clock ticks.
    pub stime: u64,
    /// Start time after boot in clock ticks.
    pub starttime: u64,
}

/// Parses `/proc/[pid]/stat` content.
///
/// The format is tricky because the comm field can contain spaces and parentheses.
/// Format: pid (comm) state ppid pgrp session tty_nr ...
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();

    let open_paren = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    if close_paren <= open_paren {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    let pid: u32 = content[..open_paren]
        .trim()
        .parse()
        .map_err(|_| ParseError::new("invalid pid"))?;

    let comm = content[open_paren + 1..close_paren].to_string();

    // Fields after ')' start with state (field 3 in proc(5) numbering).
    let fields: Vec<&str> = content[close_paren + 1..].split_whitespace().collect();

    if fields.len() < 20 {
        return Err(ParseError::new(format!(
            "not enough fields in stat: expected 20+, got {}",
            fields.len()
        )));
    }

    let parse_field_u64 = |idx: usize, name: &str| -> Result<u64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    Ok(ProcStat {
        pid,
        comm,
        state: fields[0].chars().next().unwrap_or('?'),
        utime: parse_field_u64(11, "utime")?,
        stime: parse_field_u64(12, "stime")?,
        starttime: parse_field_u64(19, "starttime")?,
    })
}

/// One mapped region from `/proc/[pid]/smaps`. Values are in kB.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmapsRegion {
    pub rss: u64,
    pub pss: u64,
    pub shared_clean: u64,
    pub shared_dirty: u64,
    pub private_clean: u64,
    pub private_dirty: u64,
    pub swap: u64,
}

/// Parses `/proc/[pid]/smaps` content into its mapped regions, in file order.
///
/// Each region starts with an address-range header line
/// (`55d0c0a00000-55d0c0a21000 r--p 00000000 08:01 1234 /usr/bin/python3`)
/// followed by `Key:   value kB` lines.
pub fn parse_smaps(content: &str) -> Result<Vec<SmapsRegion>, ParseError> {
    let mut regions: Vec<SmapsRegion> = Vec::new();

    for line in content.lines() {
        let Some(first) = line.split_whitespace().next() else {
            continue;
        };

        let Some(key) = first.strip_suffix(':') else {
            if !first.contains('-') {
                return Err(ParseError::new(format!("unexpected smaps line: {}", line)));
            }
            regions.push(SmapsRegion::default());
            continue;
        };

        let Some(region) = regions.last_mut() else {
            return Err(ParseError::new("smaps field before first region header"));
        };

        let value: u64 = line
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        match key {
            "Rss" => region.rss = value,
            "Pss" => region.pss = value,
            "Shared_Clean" => region.shared_clean = value,
            "Shared_Dirty" => region.shared_dirty = value,
            "Private_Clean" => region.private_clean = value,
            "Private_Dirty" => region.private_dirty = value,
            "Swap" => region.swap = value,
            _ => {}
        }
    }

    Ok(regions)
}

/// Parses `/proc/uptime` and returns the system uptime in seconds.
pub fn parse_uptime(content: &str) -> Result<f64, ParseError> {
    content
        .split_whitespace()
        .next()
        .ok_or_else(|| ParseError::new("empty uptime"))?
        .parse()
        .map_err(|_| ParseError::new("invalid uptime"))
}

/// Converts `/proc/[pid]/cmdline` content (NUL separated argv) into a
/// single space separated command line.
pub fn parse_cmdline(content: &str) -> String {
    content
        .split('\0')
        .filter(|arg| !arg.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_statm() {
        let statm = parse_statm("25000 2000 500 100 0 1500 0\n").unwrap();

        assert_eq!(statm.size, 25000);
        assert_eq!(statm.resident, 2000);
        assert_eq!(statm.shared, 500);
        assert_eq!(statm.text, 100);
        assert_eq!(statm.lib, 0);
        assert_eq!(statm.data, 1500);
    }

    #[test]
    fn test_parse_statm_too_short() {
        let err = parse_statm("25000 2000").unwrap_err();
        assert!(err.message.contains("expected 7"));
    }

    #[test]
    fn test_parse_statm_invalid_number() {
        assert!(parse_statm("a b c d e f g").is_err());
    }

    #[test]
    fn test_parse_proc_stat_basic() {
        let content = "1234 (bash) S 1233 1234 1234 34816 1235 4194304 5000 50000 10 20 100 50 200 100 20 0 1 0 100000 25000000 2000 18446744073709551615 0 0 0 0 0 0 65536 3670020 1266777851 0 0 0 17 2 0 0 5 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_proc_stat(content).unwrap();

        assert_eq!(stat.pid, 1234);
        assert_eq!(stat.comm, "bash");
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.utime, 100);
        assert_eq!(stat.stime, 50);
        assert_eq!(stat.starttime, 100000);
    }

    #[test]
    fn test_parse_proc_stat_with_parentheses_in_comm() {
        let content = "5001 (airflow task (x)) S 1 5001 5001 0 -1 4194304 1000 0 0 0 10 5 0 0 20 0 1 0 500100 10000000 1000 18446744073709551615";
        let stat = parse_proc_stat(content).unwrap();

        assert_eq!(stat.pid, 5001);
        assert_eq!(stat.comm, "airflow task (x)");
        assert_eq!(stat.utime, 10);
        assert_eq!(stat.starttime, 500100);
    }

    #[test]
    fn test_parse_proc_stat_truncated() {
        let err = parse_proc_stat("1 (init) S 0 1 1").unwrap_err();
        assert!(err.message.contains("not enough fields"));
    }

    #[test]
    fn test_parse_smaps_regions() {
        let content = "\
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
        let regions = parse_smaps(content).unwrap();

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].rss, 128);
        assert_eq!(regions[0].pss, 64);
        assert_eq!(regions[0].shared_clean, 64);
        assert_eq!(regions[0].private_clean, 40);
        assert_eq!(regions[0].private_dirty, 24);
        assert_eq!(regions[0].swap, 8);
        assert_eq!(regions[1].private_dirty, 12);
        assert_eq!(regions[1].private_clean, 0);
    }

    #[test]
    fn test_parse_smaps_empty() {
        assert!(parse_smaps("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_smaps_field_without_header() {
        assert!(parse_smaps("Rss: 4 kB\n").is_err());
    }

    #[test]
    fn test_parse_uptime() {
        let uptime = parse_uptime("12345.67 98765.43\n").unwrap();
        assert!((uptime - 12345.67).abs() < f64::EPSILON);
        assert!(parse_uptime("").is_err());
    }

    #[test]
    fn test_parse_cmdline() {
        let cmdline = parse_cmdline("/usr/bin/python3\0/usr/local/bin/airflow\0run\0my_dag\0");
        assert_eq!(cmdline, "/usr/bin/python3 /usr/local/bin/airflow run my_dag");
        assert_eq!(parse_cmdline(""), "");
    }
}
