use crate::collectors::procfs::{describe_os, read_first_os_release, ProcFs};
use crate::collectors::security::{count_failed_passwords, parse_session_users, AuthSource};
use crate::collectors::{CollectError, HostProbe};
use crate::config::Config;
use crate::state::{
    percent, CpuTimes, FilesystemEntry, GpuReport, GpuStat, HostIdentity, MemoryStats,
    ProcessEntry, TempStat,
};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::ffi::OsStr;
use std::process::{Command, Output};
use sysinfo::{ComponentExt, DiskExt, PidExt, ProcessExt, System, SystemExt};
use tracing::debug;

/// Persistent and volatile journal locations.
const JOURNAL_DIRS: [&str; 2] = ["/var/log/journal", "/run/log/journal"];

/// The running host: counters from procfs, inventories from sysinfo, and a few inventory
/// commands (`who`, `journalctl`, `nvidia-smi`, `rocm-smi`) where no native source exists.
pub struct LiveProbe {
    system: System,
    procfs: ProcFs,
    os_release_paths: Vec<PathBuf>,
    journalctl: PathBuf,
    journal_dirs: Vec<PathBuf>,
}

impl LiveProbe {
    pub fn new(cfg: &Config) -> Self {
        Self {
            system: System::new(),
            procfs: ProcFs::new(cfg.proc_root.clone()),
            os_release_paths: cfg.os_release_paths.clone(),
            journalctl: PathBuf::from("journalctl"),
            journal_dirs: JOURNAL_DIRS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Current-boot journal lines mentioning a failed password.
    fn journal_failures(&self) -> Option<u64> {
        let output = run_command(
            self.journalctl.as_os_str(),
            &["-b", "-q", "--no-pager", "-g", "failed password"],
        )?;
        let count = journal_query_count(
            output.status.code(),
            &output.stdout,
            &output.stderr,
            journal_present(&self.journal_dirs),
        );
        if count.is_none() {
            debug!(status = %output.status, "journalctl query unusable");
        }
        count
    }
}

impl HostProbe for LiveProbe {
    fn identity(&mut self) -> HostIdentity {
        let os_release = read_first_os_release(&self.os_release_paths);
        let kernel_name = self
            .procfs
            .kernel_name()
            .unwrap_or_else(|| std::env::consts::OS.to_string());
        let kernel_release = self
            .procfs
            .kernel_release()
            .or_else(|| self.system.kernel_version());

        HostIdentity {
            host_name: self.system.host_name(),
            os_description: Some(describe_os(
                os_release.as_deref(),
                &kernel_name,
                kernel_release.as_deref(),
            )),
            uptime_seconds: self.procfs.uptime_seconds(),
            load_average: self.procfs.load_average(),
        }
    }

    /// Also refreshes the process table, so per-process CPU usage covers the same window as
    /// two consecutive counter reads.
    fn cpu_times(&mut self) -> Result<CpuTimes, CollectError> {
        self.system.refresh_cpu();
        self.system.refresh_processes();
        self.procfs.cpu_times()
    }

    fn memory(&mut self) -> Option<MemoryStats> {
        self.procfs.memory()
    }

    fn filesystems(&mut self) -> Vec<FilesystemEntry> {
        self.system.refresh_disks_list();
        self.system
            .disks()
            .iter()
            .map(|d| {
                let total = d.total_space();
                let available = d.available_space().min(total);
                FilesystemEntry {
                    fs_type: String::from_utf8_lossy(d.file_system()).to_string(),
                    mount: d.mount_point().to_string_lossy().to_string(),
                    total_bytes: total,
                    used_bytes: total - available,
                    available_bytes: available,
                }
            })
            .collect()
    }

    fn processes(&mut self) -> Result<Vec<ProcessEntry>, CollectError> {
        if self.system.processes().is_empty() {
            self.system.refresh_processes();
        }
        self.system.refresh_memory();
        let total_memory = self.system.total_memory();

        let processes: Vec<ProcessEntry> = self
            .system
            .processes()
            .values()
            .map(|p| ProcessEntry {
                pid: p.pid().as_u32(),
                name: p.name().to_string(),
                cpu_percent: p.cpu_usage() as f64,
                memory_percent: percent(p.memory(), total_memory),
            })
            .collect();
        if processes.is_empty() {
            return Err(CollectError::NoProcesses);
        }
        Ok(processes)
    }

    fn sessions(&mut self) -> Option<Vec<String>> {
        let output = run_command("who", &[])?;
        if !output.status.success() {
            debug!(status = %output.status, "who exited with failure");
            return None;
        }
        Some(parse_session_users(&decode_cmd_stdout(&output.stdout)))
    }

    fn failed_logins(&mut self, source: &AuthSource) -> Option<u64> {
        match source {
            AuthSource::Journal => self.journal_failures(),
            AuthSource::File(path) => count_log_file(path),
        }
    }

    fn gpus(&mut self) -> Option<GpuReport> {
        let gpus = collect_nvidia_smi();
        if !gpus.is_empty() {
            return Some(GpuReport::Devices(gpus));
        }
        collect_rocm_smi()
    }

    fn temperatures(&mut self) -> Vec<TempStat> {
        self.system.refresh_components_list();
        let mut temps: Vec<TempStat> = self
            .system
            .components()
            .iter()
            .map(|c| TempStat {
                sensor: c.label().to_string(),
                temperature_celsius: c.temperature() as f64,
                critical_temperature_celsius: c.critical().map(|v| v as f64),
            })
            .filter(|t| t.temperature_celsius > 0.0)
            .collect();

        let sys_count = temps.len();
        let thermal = collect_linux_temps();
        debug!(
            sysinfo_temps = sys_count,
            thermal_zone_temps = thermal.len(),
            "temperature sources collected"
        );
        temps.extend(thermal);
        temps
    }
}

fn run_command<S: AsRef<OsStr>>(program: S, args: &[&str]) -> Option<Output> {
    let program = program.as_ref();
    match Command::new(program).args(args).output() {
        Ok(output) => Some(output),
        Err(err) => {
            debug!(program = %program.to_string_lossy(), error = %err, "command unavailable");
            None
        }
    }
}

/// Interprets a `journalctl --grep` run. Exit 1 with no output is how a grep without matches
/// ends, but under `-q` it is also how journalctl ends on a host that keeps no journal at all;
/// it only counts as zero matches when journal files exist.
fn journal_query_count(
    code: Option<i32>,
    stdout: &[u8],
    stderr: &[u8],
    journal_present: bool,
) -> Option<u64> {
    let silent = |bytes: &[u8]| bytes.iter().all(u8::is_ascii_whitespace);
    match code {
        Some(0) => count_failed_passwords(stdout).ok(),
        Some(1) if journal_present && silent(stdout) && silent(stderr) => Some(0),
        _ => None,
    }
}

/// True when any of `dirs` holds a `*.journal` file, directly or in a machine-id subdirectory.
fn journal_present(dirs: &[PathBuf]) -> bool {
    fn has_journal_file(dir: &Path, depth: usize) -> bool {
        let Ok(entries) = fs::read_dir(dir) else {
            return false;
        };
        entries.flatten().any(|entry| {
            let path = entry.path();
            if path.is_dir() {
                depth > 0 && has_journal_file(&path, depth - 1)
            } else {
                path.extension().is_some_and(|ext| ext == "journal")
            }
        })
    }

    dirs.iter().any(|dir| has_journal_file(dir, 1))
}

fn count_log_file(path: &Path) -> Option<u64> {
    let counted = File::open(path).and_then(|f| count_failed_passwords(BufReader::new(f)));
    match counted {
        Ok(count) => Some(count),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "auth log not readable");
            None
        }
    }
}

#[cfg(target_os = "linux")]
fn collect_linux_temps() -> Vec<TempStat> {
    let Ok(entries) = fs::read_dir("/sys/class/thermal") else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|v| v.to_str()) else {
            continue;
        };
        if !name.starts_with("thermal_zone") {
            continue;
        }

        let typ = fs::read_to_string(path.join("type"))
            .ok()
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| name.to_string());
        let Some(celsius) = fs::read_to_string(path.join("temp"))
            .ok()
            .and_then(|raw| parse_thermal_zone_temp(&raw))
        else {
            continue;
        };
        out.push(TempStat {
            sensor: typ,
            temperature_celsius: celsius,
            critical_temperature_celsius: None,
        });
    }

    out.sort_by(|a, b| a.sensor.cmp(&b.sensor));
    out
}

#[cfg(not(target_os = "linux"))]
fn collect_linux_temps() -> Vec<TempStat> {
    Vec::new()
}

/// Thermal zones report millidegrees; some drivers report whole degrees.
fn parse_thermal_zone_temp(raw: &str) -> Option<f64> {
    let v = raw.trim().parse::<f64>().ok()?;
    let celsius = if v > 1000.0 { v / 1000.0 } else { v };
    (celsius > 0.0).then_some(celsius)
}

fn collect_nvidia_smi() -> Vec<GpuStat> {
    let Some(output) = run_command(
        "nvidia-smi",
        &[
            "--query-gpu=index,name,utilization.gpu,utilization.memory,\
             memory.used,memory.total,temperature.gpu",
            "--format=csv,noheader,nounits",
        ],
    ) else {
        return Vec::new();
    };
    if !output.status.success() {
        debug!(status = %output.status, "nvidia-smi query failed");
        return Vec::new();
    }

    parse_nvidia_smi(&decode_cmd_stdout(&output.stdout))
}

/// Rows of `index, name, util %, mem util %, mem used MiB, mem total MiB, temp °C`.
fn parse_nvidia_smi(text: &str) -> Vec<GpuStat> {
    let mib = |v: u64| v.saturating_mul(1024 * 1024);
    text.lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(',').map(|v| v.trim()).collect();
            if parts.len() < 7 {
                return None;
            }

            Some(GpuStat {
                id: parts[0].to_string(),
                name: parts[1].to_string(),
                utilization_percent: parse_f64_loose(parts[2]),
                memory_utilization_percent: parse_f64_loose(parts[3]),
                memory_used_bytes: parse_u64_loose(parts[4]).map(mib),
                memory_total_bytes: parse_u64_loose(parts[5]).map(mib),
                temperature_celsius: parse_f64_loose(parts[6]),
            })
        })
        .collect()
}

fn collect_rocm_smi() -> Option<GpuReport> {
    let output = run_command("rocm-smi", &["--showuse", "--showtemp", "--showmemuse"])?;
    if !output.status.success() {
        debug!(status = %output.status, "rocm-smi query failed");
        return None;
    }
    rocm_report(&decode_cmd_stdout(&output.stdout))
}

fn rocm_report(text: &str) -> Option<GpuReport> {
    let text = text.trim();
    (!text.is_empty()).then(|| GpuReport::Raw {
        vendor: "AMD".to_string(),
        text: text.to_string(),
    })
}

/// Accepts `[N/A]`-style noise and decimal commas.
fn parse_f64_loose(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Some(v);
    }

    let filtered: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+'))
        .collect();
    if filtered.is_empty() {
        return None;
    }

    filtered.replace(',', ".").parse::<f64>().ok()
}

fn parse_u64_loose(input: &str) -> Option<u64> {
    parse_f64_loose(input).map(|v| if v < 0.0 { 0 } else { v as u64 })
}

fn decode_cmd_stdout(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
