use crate::collectors::security::{auth_sources, failed_login_count, AuthSource};
use crate::collectors::{
    sample_cpu_busy, summarize_disks, top_processes, CollectError, HostProbe, SortKey,
};
use crate::config::Config;
use crate::state::{round1, FilesystemEntry, GpuReport, HostIdentity, ProcessEntry, TempStat};
use std::io::{self, Write};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];
const NAME_WIDTH: usize = 22;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error("failed to write report: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub sample_interval: Duration,
    pub top_processes: usize,
    pub rule_width: usize,
    pub pseudo_filesystems: Vec<String>,
    pub auth_sources: Vec<AuthSource>,
    pub gpu: bool,
    pub temperatures: bool,
}

impl ReportOptions {
    pub fn from_config(cfg: &Config, rule_width: usize) -> Self {
        Self {
            sample_interval: cfg.sample_interval(),
            top_processes: cfg.top_processes,
            rule_width,
            pseudo_filesystems: cfg.pseudo_filesystems.clone(),
            auth_sources: auth_sources(cfg.journal, &cfg.auth_logs),
            gpu: cfg.extras.gpu,
            temperatures: cfg.extras.temperatures,
        }
    }

    fn extras(&self) -> bool {
        self.gpu || self.temperatures
    }
}

#[derive(Debug, Clone, Copy)]
enum Align {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
struct Column {
    width: usize,
    align: Align,
}

const fn left(width: usize) -> Column {
    Column {
        width,
        align: Align::Left,
    }
}

const fn right(width: usize) -> Column {
    Column {
        width,
        align: Align::Right,
    }
}

const DISK_COLUMNS: [Column; 5] = [left(20), right(10), right(10), right(10), right(6)];
const PROCESS_COLUMNS: [Column; 4] = [right(8), left(NAME_WIDTH), right(6), right(6)];
const GPU_COLUMNS: [Column; 7] = [
    left(4),
    left(32),
    right(6),
    right(6),
    right(10),
    right(10),
    right(6),
];

/// Scales a byte count by 1024 until it drops below 1024 or runs out of units.
pub fn human_bytes(n: u64) -> String {
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", n, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Pads each cell to its column; cells wider than the column are kept whole.
fn format_row<S: AsRef<str>>(cells: &[S], columns: &[Column]) -> String {
    let line = cells
        .iter()
        .zip(columns)
        .map(|(cell, col)| match col.align {
            Align::Left => format!("{:<w$}", cell.as_ref(), w = col.width),
            Align::Right => format!("{:>w$}", cell.as_ref(), w = col.width),
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

pub fn write_report(
    probe: &mut dyn HostProbe,
    opts: &ReportOptions,
    out: &mut dyn Write,
) -> Result<(), ReportError> {
    let rule = "-".repeat(opts.rule_width);

    write_identity(out, &probe.identity())?;
    writeln!(out, "{rule}")?;

    let cpu = sample_cpu_busy(probe, opts.sample_interval)?;
    writeln!(out, "CPU Usage:   {cpu:.1}% (overall)")?;
    writeln!(out, "{rule}")?;

    writeln!(out, "Memory:")?;
    match probe.memory() {
        Some(mem) => writeln!(
            out,
            "  Total: {}  Used: {}  Free: {}  Used: {:.1}%",
            human_bytes(mem.total_bytes),
            human_bytes(mem.used_bytes()),
            human_bytes(mem.available_bytes),
            mem.used_percent()
        )?,
        None => writeln!(out, "  unavailable")?,
    }
    writeln!(out, "{rule}")?;

    write_disks(out, probe.filesystems(), &opts.pseudo_filesystems, &rule)?;
    writeln!(out, "{rule}")?;

    let processes = probe.processes()?;
    debug!(count = processes.len(), "process table collected");
    writeln!(out, "Top {} Processes by CPU:", opts.top_processes)?;
    write_processes(
        out,
        &top_processes(&processes, SortKey::Cpu, opts.top_processes),
        SortKey::Cpu,
    )?;
    writeln!(out, "{rule}")?;
    writeln!(out, "Top {} Processes by Memory:", opts.top_processes)?;
    write_processes(
        out,
        &top_processes(&processes, SortKey::Memory, opts.top_processes),
        SortKey::Memory,
    )?;
    writeln!(out, "{rule}")?;

    let users = match probe.sessions() {
        Some(users) if users.is_empty() => "none".to_string(),
        Some(users) => users.join(" "),
        None => "unavailable".to_string(),
    };
    writeln!(out, "Logged-in users: {users}")?;
    let failed = failed_login_count(probe, &opts.auth_sources)
        .map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    writeln!(
        out,
        "Failed SSH login attempts (this boot or recent logs): {failed}"
    )?;

    if opts.extras() {
        writeln!(out, "{rule}")?;
        if opts.gpu {
            write_gpus(out, probe.gpus().as_ref())?;
        }
        if opts.temperatures {
            write_temperatures(out, &probe.temperatures())?;
        }
        writeln!(out, "{rule}")?;
    }

    Ok(())
}

fn write_identity(out: &mut dyn Write, id: &HostIdentity) -> io::Result<()> {
    writeln!(
        out,
        "Host:        {}",
        id.host_name.as_deref().unwrap_or("unknown")
    )?;
    writeln!(
        out,
        "OS:          {}",
        id.os_description.as_deref().unwrap_or("unknown")
    )?;
    let uptime = id
        .uptime_seconds
        .map(|s| humantime::format_duration(Duration::from_secs(s)).to_string())
        .unwrap_or_else(|| "unknown".to_string());
    writeln!(out, "Uptime:      {uptime}")?;
    match id.load_average {
        Some(l) => writeln!(
            out,
            "Load Avg:    1m: {:.2}  5m: {:.2}  15m: {:.2}",
            l.one, l.five, l.fifteen
        ),
        None => writeln!(out, "Load Avg:    unavailable"),
    }
}

fn write_disks(
    out: &mut dyn Write,
    entries: Vec<FilesystemEntry>,
    pseudo_types: &[String],
    rule: &str,
) -> io::Result<()> {
    let summary = summarize_disks(entries, pseudo_types);

    writeln!(out, "Disk:")?;
    writeln!(
        out,
        "{}",
        format_row(&["Mount", "Total", "Used", "Free", "Use%"], &DISK_COLUMNS)
    )?;
    for r in &summary.rows {
        writeln!(
            out,
            "{}",
            format_row(
                &[
                    r.mount.clone(),
                    human_bytes(r.total_bytes),
                    human_bytes(r.used_bytes),
                    human_bytes(r.available_bytes),
                    format!("{:.0}%", r.used_percent()),
                ],
                &DISK_COLUMNS,
            )
        )?;
    }
    writeln!(out, "{rule}")?;
    let t = &summary.total;
    writeln!(
        out,
        "{}",
        format_row(
            &[
                t.mount.clone(),
                human_bytes(t.total_bytes),
                human_bytes(t.used_bytes),
                human_bytes(t.available_bytes),
                format!("{:.1}%", round1(t.used_percent())),
            ],
            &DISK_COLUMNS,
        )
    )
}

/// The sorted-by metric comes first.
fn write_processes(out: &mut dyn Write, rows: &[ProcessEntry], key: SortKey) -> io::Result<()> {
    let header = match key {
        SortKey::Cpu => ["PID", "NAME", "CPU%", "MEM%"],
        SortKey::Memory => ["PID", "NAME", "MEM%", "CPU%"],
    };
    writeln!(out, "{}", format_row(&header, &PROCESS_COLUMNS))?;
    for p in rows {
        let cpu = format!("{:.1}", p.cpu_percent);
        let mem = format!("{:.1}", p.memory_percent);
        let (first, second) = match key {
            SortKey::Cpu => (cpu, mem),
            SortKey::Memory => (mem, cpu),
        };
        let name: String = p.name.chars().take(NAME_WIDTH).collect();
        writeln!(
            out,
            "{}",
            format_row(&[p.pid.to_string(), name, first, second], &PROCESS_COLUMNS)
        )?;
    }
    Ok(())
}

fn write_gpus(out: &mut dyn Write, report: Option<&GpuReport>) -> io::Result<()> {
    let gpus = match report {
        Some(GpuReport::Devices(gpus)) if !gpus.is_empty() => gpus,
        Some(GpuReport::Raw { vendor, text }) => {
            writeln!(out, "GPU ({vendor}):")?;
            for line in text.lines() {
                writeln!(out, "  {}", line.trim_end())?;
            }
            return Ok(());
        }
        _ => return writeln!(out, "GPU: not detected"),
    };
    writeln!(out, "GPU:")?;
    writeln!(
        out,
        "{}",
        format_row(
            &["ID", "MODEL", "GPU%", "MEM%", "USED", "TOTAL", "TEMP"],
            &GPU_COLUMNS
        )
    )?;
    let na = || "n/a".to_string();
    let pct = |v: Option<f64>| v.map(|v| format!("{v:.0}")).unwrap_or_else(na);
    for g in gpus {
        writeln!(
            out,
            "{}",
            format_row(
                &[
                    g.id.clone(),
                    g.name.chars().take(32).collect(),
                    pct(g.utilization_percent),
                    pct(g.memory_utilization_percent),
                    g.memory_used_bytes.map(human_bytes).unwrap_or_else(na),
                    g.memory_total_bytes.map(human_bytes).unwrap_or_else(na),
                    g.temperature_celsius
                        .map(|v| format!("{v:.0}°C"))
                        .unwrap_or_else(na),
                ],
                &GPU_COLUMNS,
            )
        )?;
    }
    Ok(())
}

fn write_temperatures(out: &mut dyn Write, temps: &[TempStat]) -> io::Result<()> {
    if temps.is_empty() {
        return writeln!(out, "Temperatures: unavailable");
    }
    writeln!(out, "Temperatures (sensors):")?;
    for t in temps {
        match t.critical_temperature_celsius {
            Some(crit) => writeln!(
                out,
                "  {}: {:.1}°C (critical {:.1}°C)",
                t.sensor, t.temperature_celsius, crit
            )?,
            None => writeln!(out, "  {}: {:.1}°C", t.sensor, t.temperature_celsius)?,
        }
    }
    Ok(())
}
