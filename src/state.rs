//! Per-run snapshot values. Nothing here outlives the process.

/// Cumulative CPU time counters from the aggregate `cpu` line of `/proc/stat`, in USER_HZ ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    pub fn idle_total(&self) -> u64 {
        self.idle.saturating_add(self.iowait)
    }

    pub fn total(&self) -> u64 {
        [
            self.user,
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
        ]
        .iter()
        .fold(0_u64, |acc, v| acc.saturating_add(*v))
    }

    /// Busy share of the window between `earlier` and `self`, rounded to one decimal.
    pub fn busy_percent_since(&self, earlier: &CpuTimes) -> f64 {
        let delta_total = self.total().saturating_sub(earlier.total());
        if delta_total == 0 {
            return 0.0;
        }
        let delta_idle = self
            .idle_total()
            .saturating_sub(earlier.idle_total())
            .min(delta_total);
        let busy = (delta_total - delta_idle) as f64 / delta_total as f64 * 100.0;
        round1(busy.clamp(0.0, 100.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl MemoryStats {
    pub fn new(total_bytes: u64, available_bytes: u64) -> Self {
        Self {
            total_bytes,
            available_bytes: available_bytes.min(total_bytes),
        }
    }

    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.available_bytes)
    }

    pub fn used_percent(&self) -> f64 {
        round1(percent(self.used_bytes(), self.total_bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostIdentity {
    pub host_name: Option<String>,
    pub os_description: Option<String>,
    pub uptime_seconds: Option<u64>,
    pub load_average: Option<LoadAverage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilesystemEntry {
    pub fs_type: String,
    pub mount: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
}

impl FilesystemEntry {
    pub fn used_percent(&self) -> f64 {
        percent(self.used_bytes, self.total_bytes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpuStat {
    pub id: String,
    pub name: String,
    pub utilization_percent: Option<f64>,
    pub memory_utilization_percent: Option<f64>,
    pub memory_used_bytes: Option<u64>,
    pub memory_total_bytes: Option<u64>,
    pub temperature_celsius: Option<f64>,
}

/// What the GPU tooling reported. AMD's `rocm-smi` has no stable machine-readable layout, so
/// its output is carried verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuReport {
    Devices(Vec<GpuStat>),
    Raw { vendor: String, text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TempStat {
    pub sensor: String,
    pub temperature_celsius: f64,
    pub critical_temperature_celsius: Option<f64>,
}

/// `used / total * 100`, or `0.0` when `total` is zero.
pub fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (used as f64 / total as f64) * 100.0
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
