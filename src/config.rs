use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
    #[serde(default = "default_os_release_paths")]
    pub os_release_paths: Vec<PathBuf>,
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    #[serde(default = "default_top_processes")]
    pub top_processes: usize,
    #[serde(default = "default_fallback_width")]
    pub fallback_width: usize,
    #[serde(default = "default_pseudo_filesystems")]
    pub pseudo_filesystems: Vec<String>,
    #[serde(default = "default_journal")]
    pub journal: bool,
    #[serde(default = "default_auth_logs")]
    pub auth_logs: Vec<PathBuf>,
    #[serde(default)]
    pub extras: ExtrasConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtrasConfig {
    #[serde(default = "default_extra_enabled")]
    pub gpu: bool,
    #[serde(default = "default_extra_enabled")]
    pub temperatures: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proc_root: default_proc_root(),
            os_release_paths: default_os_release_paths(),
            sample_interval_ms: default_sample_interval_ms(),
            top_processes: default_top_processes(),
            fallback_width: default_fallback_width(),
            pseudo_filesystems: default_pseudo_filesystems(),
            journal: default_journal(),
            auth_logs: default_auth_logs(),
            extras: ExtrasConfig::default(),
        }
    }
}

impl Default for ExtrasConfig {
    fn default() -> Self {
        Self {
            gpu: default_extra_enabled(),
            temperatures: default_extra_enabled(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.proc_root.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "proc_root must not be empty".to_string(),
            ));
        }
        if self.sample_interval_ms > 60_000 {
            return Err(ConfigError::Validation(
                "sample_interval_ms must be <= 60000".to_string(),
            ));
        }
        if self.top_processes < 1 {
            return Err(ConfigError::Validation(
                "top_processes must be >= 1".to_string(),
            ));
        }
        if self.fallback_width < 20 {
            return Err(ConfigError::Validation(
                "fallback_width must be >= 20".to_string(),
            ));
        }

        validate_pseudo_filesystems(&self.pseudo_filesystems)?;
        validate_auth_logs(&self.auth_logs)?;

        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_pseudo_filesystems(types: &[String]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for fs_type in types {
        if fs_type.trim().is_empty() {
            return Err(ConfigError::Validation(
                "pseudo_filesystems[*] must not be empty".to_string(),
            ));
        }
        if !seen.insert(fs_type.as_str()) {
            return Err(ConfigError::Validation(format!(
                "pseudo filesystem type '{fs_type}' is listed twice"
            )));
        }
    }
    Ok(())
}

fn validate_auth_logs(paths: &[PathBuf]) -> Result<(), ConfigError> {
    for path in paths {
        if !path.is_absolute() {
            return Err(ConfigError::Validation(format!(
                "auth_logs entry '{}' must be an absolute path",
                path.display()
            )));
        }
    }
    Ok(())
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

fn default_os_release_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/etc/os-release"),
        PathBuf::from("/usr/lib/os-release"),
    ]
}

const fn default_sample_interval_ms() -> u64 {
    1000
}

const fn default_top_processes() -> usize {
    5
}

const fn default_fallback_width() -> usize {
    80
}

fn default_pseudo_filesystems() -> Vec<String> {
    ["tmpfs", "devtmpfs", "squashfs", "ramfs", "devfs"]
        .into_iter()
        .map(String::from)
        .collect()
}

const fn default_journal() -> bool {
    true
}

fn default_auth_logs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/var/log/auth.log"),
        PathBuf::from("/var/log/secure"),
    ]
}

const fn default_extra_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().expect("default config must validate");
        assert_eq!(cfg.sample_interval(), Duration::from_secs(1));
        assert_eq!(cfg.top_processes, 5);
        assert_eq!(cfg.fallback_width, 80);
    }

    #[test]
    fn example_yaml_parses_to_defaults() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).expect("example yaml");
        cfg.validate().expect("example config must validate");
        assert_eq!(cfg.pseudo_filesystems, default_pseudo_filesystems());
        assert_eq!(cfg.auth_logs, default_auth_logs());
        assert!(cfg.journal);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sample_interval_ms: 250\nextras:\n  gpu: false").unwrap();

        let cfg = Config::load_from_file(file.path()).expect("partial config");
        assert_eq!(cfg.sample_interval_ms, 250);
        assert!(!cfg.extras.gpu);
        assert!(cfg.extras.temperatures);
        assert_eq!(cfg.proc_root, PathBuf::from("/proc"));
    }

    #[test]
    fn missing_file_reports_read_error() {
        let err = Config::load_from_file("/nonexistent/hostsnap.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn rejects_zero_top_processes() {
        let cfg = Config {
            top_processes: 0,
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_relative_auth_log() {
        let cfg = Config {
            auth_logs: vec![PathBuf::from("var/log/auth.log")],
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_pseudo_filesystem() {
        let cfg = Config {
            pseudo_filesystems: vec!["tmpfs".to_string(), "tmpfs".to_string()],
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }
}
