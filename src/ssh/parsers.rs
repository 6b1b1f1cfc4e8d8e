//! Loose parsers for the fixed probe command vector. These tolerate the
//! minor formatting drift between distro/coreutils versions rather than
//! pinning to one exact layout.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryRow {
    pub label: String,
    pub total: String,
    pub used: String,
    pub free: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskUsage {
    pub filesystem: String,
    pub size: String,
    pub used: String,
    pub available: String,
    pub use_percent: String,
    pub mounted_on: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostHealth {
    pub setup_status: String,
    pub reachable: bool,
    pub k3s_status: String,
    pub uptime: String,
    pub memory: Vec<MemoryRow>,
    pub disk: Option<DiskUsage>,
    /// (service name, `systemctl is-active` output) pairs, "ssh" first.
    pub services: Vec<(String, String)>,
}

/// Parses `free -h` output into rows keyed by the first column (`Mem:`,
/// `Swap:`). Skips the header line; tolerant of missing trailing columns.
pub fn parse_free(output: &str) -> Vec<MemoryRow> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let label = cols.next()?.trim_end_matches(':').to_string();
            let total = cols.next().unwrap_or("0").to_string();
            let used = cols.next().unwrap_or("0").to_string();
            let free = cols.next().unwrap_or("0").to_string();
            Some(MemoryRow { label, total, used, free })
        })
        .collect()
}

/// Parses `df -h /` output, taking the last line (the `/` mount's row).
pub fn parse_df(output: &str) -> Option<DiskUsage> {
    let line = output.lines().filter(|l| !l.trim().is_empty()).last()?;
    let cols: Vec<&str> = line.split_whitespace().collect();
    if cols.len() < 6 {
        return None;
    }
    Some(DiskUsage {
        filesystem: cols[0].to_string(),
        size: cols[1].to_string(),
        used: cols[2].to_string(),
        available: cols[3].to_string(),
        use_percent: cols[4].to_string(),
        mounted_on: cols[5..].join(" "),
    })
}

/// `systemctl is-active` prints exactly one word on success or failure;
/// anything else (connection drop, empty output) is reported as `unknown`.
pub fn parse_service_status(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.lines().next().unwrap_or("unknown").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_free_mem_and_swap_rows() {
        let out = "              total        used        free      shared  buff/cache   available\nMem:           3.8Gi       612Mi       1.4Gi        12Mi       1.8Gi       3.0Gi\nSwap:             0B          0B          0B\n";
        let rows = parse_free(out);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, "Mem");
        assert_eq!(rows[0].total, "3.8Gi");
        assert_eq!(rows[1].label, "Swap");
    }

    #[test]
    fn parses_df_root_row() {
        let out = "Filesystem      Size  Used Avail Use% Mounted on\n/dev/sda1        25G  4.2G   20G  18% /\n";
        let usage = parse_df(out).expect("parsed");
        assert_eq!(usage.filesystem, "/dev/sda1");
        assert_eq!(usage.use_percent, "18%");
        assert_eq!(usage.mounted_on, "/");
    }

    #[test]
    fn df_with_no_rows_is_none() {
        assert!(parse_df("").is_none());
    }

    #[test]
    fn service_status_defaults_to_unknown_on_empty_output() {
        assert_eq!(parse_service_status(""), "unknown");
        assert_eq!(parse_service_status("active\n"), "active");
    }
}
