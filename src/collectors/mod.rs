pub mod procfs;
pub mod security;
pub mod system;

use crate::state::{
    CpuTimes, FilesystemEntry, GpuReport, HostIdentity, MemoryStats, ProcessEntry, TempStat,
};
use security::AuthSource;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {what} in {path}")]
    Parse { path: String, what: &'static str },
    #[error("process table is empty or unreadable")]
    NoProcesses,
}

/// Read-only view of the host. Optional sources return `None` (or an empty list) when missing;
/// only CPU counters and the process table are mandatory.
///
/// `failed_logins` counts `Failed password` lines in one auth source, or returns `None` when
/// that source cannot be read on this host.
pub trait HostProbe {
    fn identity(&mut self) -> HostIdentity;
    fn cpu_times(&mut self) -> Result<CpuTimes, CollectError>;
    fn memory(&mut self) -> Option<MemoryStats>;
    fn filesystems(&mut self) -> Vec<FilesystemEntry>;
    fn processes(&mut self) -> Result<Vec<ProcessEntry>, CollectError>;
    fn sessions(&mut self) -> Option<Vec<String>>;
    fn failed_logins(&mut self, source: &AuthSource) -> Option<u64>;
    fn gpus(&mut self) -> Option<GpuReport>;
    fn temperatures(&mut self) -> Vec<TempStat>;
}

/// Busy percentage over `interval`. The sleep is skipped for a zero interval.
pub fn sample_cpu_busy(probe: &mut dyn HostProbe, interval: Duration) -> Result<f64, CollectError> {
    let first = probe.cpu_times()?;
    if !interval.is_zero() {
        std::thread::sleep(interval);
    }
    let second = probe.cpu_times()?;
    Ok(second.busy_percent_since(&first))
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskSummary {
    pub rows: Vec<FilesystemEntry>,
    pub total: FilesystemEntry,
}

pub fn summarize_disks(entries: Vec<FilesystemEntry>, pseudo_types: &[String]) -> DiskSummary {
    let mut seen = HashSet::new();
    let mut rows: Vec<FilesystemEntry> = entries
        .into_iter()
        .filter(|e| {
            let pseudo = pseudo_types.iter().any(|t| t == &e.fs_type);
            if pseudo {
                debug!(mount = %e.mount, fs_type = %e.fs_type, "skipping pseudo filesystem");
            }
            !pseudo
        })
        .filter(|e| seen.insert(e.mount.clone()))
        .collect();
    rows.sort_by(|a, b| a.mount.cmp(&b.mount));

    let mut total = FilesystemEntry {
        fs_type: String::new(),
        mount: "TOTAL".to_string(),
        total_bytes: 0,
        used_bytes: 0,
        available_bytes: 0,
    };
    for r in &rows {
        total.total_bytes = total.total_bytes.saturating_add(r.total_bytes);
        total.used_bytes = total.used_bytes.saturating_add(r.used_bytes);
        total.available_bytes = total.available_bytes.saturating_add(r.available_bytes);
    }

    DiskSummary { rows, total }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Cpu,
    Memory,
}

impl SortKey {
    fn value(self, p: &ProcessEntry) -> f64 {
        match self {
            SortKey::Cpu => p.cpu_percent,
            SortKey::Memory => p.memory_percent,
        }
    }
}

/// Highest `limit` processes by `key`, descending; ties go to the lower pid.
pub fn top_processes(processes: &[ProcessEntry], key: SortKey, limit: usize) -> Vec<ProcessEntry> {
    let mut sorted = processes.to_vec();
    sorted.sort_by(|a, b| {
        key.value(b)
            .total_cmp(&key.value(a))
            .then_with(|| a.pid.cmp(&b.pid))
    });
    sorted.truncate(limit);
    sorted
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::collectors::security::count_failed_passwords;
    use std::collections::VecDeque;

    /// Canned host used by collector and report tests.
    #[derive(Debug, Default)]
    pub struct FixtureProbe {
        pub identity: HostIdentity,
        pub cpu_samples: VecDeque<CpuTimes>,
        pub memory: Option<MemoryStats>,
        pub filesystems: Vec<FilesystemEntry>,
        pub processes: Option<Vec<ProcessEntry>>,
        pub sessions: Option<Vec<String>>,
        pub auth_logs: Vec<(AuthSource, String)>,
        pub auth_reads: Vec<AuthSource>,
        pub gpus: Option<GpuReport>,
        pub temps: Vec<TempStat>,
    }

    impl HostProbe for FixtureProbe {
        fn identity(&mut self) -> HostIdentity {
            self.identity.clone()
        }

        fn cpu_times(&mut self) -> Result<CpuTimes, CollectError> {
            self.cpu_samples.pop_front().ok_or(CollectError::Parse {
                path: "fixture/stat".to_string(),
                what: "aggregate cpu line",
            })
        }

        fn memory(&mut self) -> Option<MemoryStats> {
            self.memory
        }

        fn filesystems(&mut self) -> Vec<FilesystemEntry> {
            self.filesystems.clone()
        }

        fn processes(&mut self) -> Result<Vec<ProcessEntry>, CollectError> {
            self.processes.clone().ok_or(CollectError::NoProcesses)
        }

        fn sessions(&mut self) -> Option<Vec<String>> {
            self.sessions.clone()
        }

        fn failed_logins(&mut self, source: &AuthSource) -> Option<u64> {
            self.auth_reads.push(source.clone());
            let (_, text) = self.auth_logs.iter().find(|(s, _)| s == source)?;
            count_failed_passwords(text.as_bytes()).ok()
        }

        fn gpus(&mut self) -> Option<GpuReport> {
            self.gpus.clone()
        }

        fn temperatures(&mut self) -> Vec<TempStat> {
            self.temps.clone()
        }
    }

    pub fn fs(fs_type: &str, mount: &str, total: u64, used: u64) -> FilesystemEntry {
        FilesystemEntry {
            fs_type: fs_type.to_string(),
            mount: mount.to_string(),
            total_bytes: total,
            used_bytes: used,
            available_bytes: total - used,
        }
    }

    pub fn proc_entry(pid: u32, name: &str, cpu: f64, mem: f64) -> ProcessEntry {
        ProcessEntry {
            pid,
            name: name.to_string(),
            cpu_percent: cpu,
            memory_percent: mem,
        }
    }

    const GIB: u64 = 1 << 30;

    fn pseudo() -> Vec<String> {
        vec!["tmpfs".into(), "devtmpfs".into(), "squashfs".into()]
    }

    #[test]
    fn cpu_sampler_uses_two_samples() {
        let mut probe = FixtureProbe::default();
        probe.cpu_samples.push_back(CpuTimes {
            user: 200,
            idle: 800,
            ..CpuTimes::default()
        });
        probe.cpu_samples.push_back(CpuTimes {
            user: 500,
            idle: 1000,
            ..CpuTimes::default()
        });
        assert_eq!(sample_cpu_busy(&mut probe, Duration::ZERO).unwrap(), 60.0);
        assert!(probe.cpu_samples.is_empty());
    }

    #[test]
    fn cpu_sampler_propagates_missing_counters() {
        let mut probe = FixtureProbe::default();
        assert!(sample_cpu_busy(&mut probe, Duration::ZERO).is_err());
    }

    #[test]
    fn disk_total_excludes_pseudo_filesystems() {
        let entries = vec![
            fs("ext4", "/", 100 * GIB, 40 * GIB),
            fs("tmpfs", "/run", 2 * GIB, GIB),
            fs("xfs", "/data", 500 * GIB, 100 * GIB),
        ];
        let summary = summarize_disks(entries, &pseudo());
        assert_eq!(summary.rows.len(), 2);
        assert!(summary.rows.iter().all(|r| r.fs_type != "tmpfs"));
        assert_eq!(summary.total.total_bytes, 600 * GIB);
        assert_eq!(summary.total.used_bytes, 140 * GIB);
        assert_eq!(summary.total.available_bytes, 460 * GIB);
    }

    #[test]
    fn disk_rows_are_deduplicated_and_sorted() {
        let entries = vec![
            fs("ext4", "/srv", 10, 1),
            fs("ext4", "/", 10, 5),
            fs("ext4", "/srv", 10, 1),
            fs("squashfs", "/snap/core/1", 10, 10),
            fs("devtmpfs", "/dev", 10, 0),
        ];
        let summary = summarize_disks(entries, &pseudo());
        let mounts: Vec<&str> = summary.rows.iter().map(|r| r.mount.as_str()).collect();
        assert_eq!(mounts, vec!["/", "/srv"]);
        assert_eq!(summary.total.total_bytes, 20);
    }

    #[test]
    fn empty_disk_list_has_zero_percent() {
        let summary = summarize_disks(Vec::new(), &pseudo());
        assert!(summary.rows.is_empty());
        assert_eq!(summary.total.used_percent(), 0.0);
    }

    #[test]
    fn top_processes_sorted_and_truncated() {
        let procs: Vec<ProcessEntry> = (1..=8)
            .map(|i| proc_entry(i, &format!("p{i}"), i as f64, (9 - i) as f64))
            .collect();

        let by_cpu = top_processes(&procs, SortKey::Cpu, 5);
        assert_eq!(by_cpu.len(), 5);
        assert_eq!(by_cpu[0].pid, 8);
        assert!(by_cpu.windows(2).all(|w| w[0].cpu_percent >= w[1].cpu_percent));

        let by_mem = top_processes(&procs, SortKey::Memory, 5);
        assert_eq!(by_mem.len(), 5);
        assert_eq!(by_mem[0].pid, 1);
        assert!(by_mem
            .windows(2)
            .all(|w| w[0].memory_percent >= w[1].memory_percent));
    }

    #[test]
    fn top_processes_ties_break_by_pid() {
        let procs = vec![
            proc_entry(30, "c", 1.0, 0.0),
            proc_entry(10, "a", 1.0, 0.0),
            proc_entry(20, "b", 1.0, 0.0),
        ];
        let pids: Vec<u32> = top_processes(&procs, SortKey::Cpu, 5)
            .iter()
            .map(|p| p.pid)
            .collect();
        assert_eq!(pids, vec![10, 20, 30]);
    }
}
