use crate::collectors::CollectError;
use crate::state::{CpuTimes, LoadAverage, MemoryStats};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reader over a procfs mount. The root is configurable so fixture trees can stand in for `/proc`.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    fn read(&self, rel: &str) -> Result<(PathBuf, String), CollectError> {
        let path = self.path(rel);
        match fs::read_to_string(&path) {
            Ok(text) => Ok((path, text)),
            Err(source) => Err(CollectError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    fn read_optional(&self, rel: &str) -> Option<String> {
        match self.read(rel) {
            Ok((_, text)) => Some(text),
            Err(err) => {
                debug!(error = %err, "optional procfs source unavailable");
                None
            }
        }
    }

    pub fn cpu_times(&self) -> Result<CpuTimes, CollectError> {
        let (path, text) = self.read("stat")?;
        let line = text.lines().find(|l| l.starts_with("cpu ")).unwrap_or("");
        parse_cpu_line(line).ok_or_else(|| CollectError::Parse {
            path: path.display().to_string(),
            what: "aggregate cpu line",
        })
    }

    pub fn memory(&self) -> Option<MemoryStats> {
        let text = self.read_optional("meminfo")?;
        let stats = parse_meminfo(&text);
        if stats.is_none() {
            debug!("meminfo has no MemTotal");
        }
        stats
    }

    pub fn load_average(&self) -> Option<LoadAverage> {
        parse_loadavg(&self.read_optional("loadavg")?)
    }

    pub fn uptime_seconds(&self) -> Option<u64> {
        parse_uptime(&self.read_optional("uptime")?)
    }

    pub fn kernel_name(&self) -> Option<String> {
        self.read_optional("sys/kernel/ostype")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn kernel_release(&self) -> Option<String> {
        self.read_optional("sys/kernel/osrelease")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Parses `cpu  user nice system idle iowait irq softirq steal ...`.
/// Older kernels stop after `idle`; missing trailing fields read as zero.
pub fn parse_cpu_line(line: &str) -> Option<CpuTimes> {
    let mut fields = line.split_whitespace();
    if !fields.next()?.starts_with("cpu") {
        return None;
    }
    let values: Vec<u64> = fields.map(|f| f.parse::<u64>()).collect::<Result<_, _>>().ok()?;
    if values.len() < 4 {
        return None;
    }
    let at = |i: usize| values.get(i).copied().unwrap_or(0);
    Some(CpuTimes {
        user: at(0),
        nice: at(1),
        system: at(2),
        idle: at(3),
        iowait: at(4),
        irq: at(5),
        softirq: at(6),
        steal: at(7),
    })
}

pub fn parse_meminfo(text: &str) -> Option<MemoryStats> {
    let mut total = None;
    let mut available = None;
    let mut free = 0_u64;
    let mut buffers = 0_u64;
    let mut cached = 0_u64;

    for line in text.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(kib) = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok())
        else {
            continue;
        };
        let bytes = kib.saturating_mul(1024);
        match key.trim() {
            "MemTotal" => total = Some(bytes),
            "MemAvailable" => available = Some(bytes),
            "MemFree" => free = bytes,
            "Buffers" => buffers = bytes,
            "Cached" => cached = bytes,
            _ => {}
        }
    }

    let total = total?;
    let available =
        available.unwrap_or_else(|| free.saturating_add(buffers).saturating_add(cached));
    Some(MemoryStats::new(total, available))
}

pub fn parse_loadavg(text: &str) -> Option<LoadAverage> {
    let mut fields = text.split_whitespace().map(|f| f.parse::<f64>().ok());
    Some(LoadAverage {
        one: fields.next()??,
        five: fields.next()??,
        fifteen: fields.next()??,
    })
}

pub fn parse_uptime(text: &str) -> Option<u64> {
    let secs = text.split_whitespace().next()?.parse::<f64>().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(secs as u64)
}

/// Value of `key` in an os-release file, with surrounding quotes removed.
pub fn os_release_value(text: &str, key: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let (k, v) = line.split_once('=')?;
        if k.trim() != key {
            return None;
        }
        let v = v.trim().trim_matches('"').trim_matches('\'').trim();
        (!v.is_empty()).then(|| v.to_string())
    })
}

/// Human-readable OS line: the os-release name followed by the kernel release,
/// or the bare kernel name and release when no descriptor exists.
pub fn describe_os(
    os_release: Option<&str>,
    kernel_name: &str,
    kernel_release: Option<&str>,
) -> String {
    let distro = os_release.and_then(|text| {
        os_release_value(text, "PRETTY_NAME").or_else(|| {
            let name = os_release_value(text, "NAME")?;
            match os_release_value(text, "VERSION") {
                Some(version) => Some(format!("{name} {version}")),
                None => Some(name),
            }
        })
    });

    match (distro, kernel_release) {
        (Some(distro), Some(release)) => format!("{distro} (kernel {release})"),
        (Some(distro), None) => distro,
        (None, Some(release)) => format!("{kernel_name} {release}"),
        (None, None) => kernel_name.to_string(),
    }
}

pub fn read_first_os_release(paths: &[PathBuf]) -> Option<String> {
    paths.iter().find_map(|p| read_text(p))
}

fn read_text(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "os-release not readable");
            None
        }
    }
}
