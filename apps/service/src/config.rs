use std::time::Duration;
use std::{env, fmt, fs, path};

use logger::LogOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config file {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: std::io::Error },
    #[error("failed to write config file {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: std::io::Error },
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config directory available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub probe: ProbeConfig,
    pub history: HistoryConfig,
    pub logging: LogOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the libsql database file.
    pub path: String,
    pub max_connections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks.
    pub tick_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Deadline for each probe attempt.
    pub timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Ping results shown per monitor.
    pub display_limit: usize,
    /// Ping results kept per monitor before pruning.
    pub retain_per_monitor: usize,
    pub cleanup_interval_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "dxmonitor.db".into(), max_connections: 8 }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_seconds: 30 }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { timeout_seconds: 30, user_agent: sitescan::DEFAULT_USER_AGENT.into() }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { display_limit: 24, retain_per_monitor: 100, cleanup_interval_seconds: 3600 }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds.max(1))
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

impl HistoryConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds.max(1))
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/dxmonitor/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("dxmonitor/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_1(f, "Max Connections", &self.database.max_connections)?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Tick (s)", &self.scheduler.tick_seconds)?;
        write_title_1(f, "Probe")?;
        write_1(f, "Timeout (s)", &self.probe.timeout_seconds)?;
        write_1(f, "User Agent", &self.probe.user_agent)?;
        write_title_1(f, "History")?;
        write_1(f, "Display Limit", &self.history.display_limit)?;
        write_1(f, "Retained Per Monitor", &self.history.retain_per_monitor)?;
        write_1(f, "Cleanup Interval (s)", &self.history.cleanup_interval_seconds)?;
        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_1(f, "Format", &format!("{:?}", self.logging.format))?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/dxmonitor/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_cadence() {
        let config = Config::default();
        assert_eq!(config.scheduler.tick(), Duration::from_secs(30));
        assert_eq!(config.probe.timeout(), Duration::from_secs(30));
        assert_eq!(config.history.display_limit, 24);
        assert_eq!(config.history.retain_per_monitor, 100);
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config");

        let config = Config::from_config(Some(&path)).unwrap();

        assert_eq!(config.database.path, "dxmonitor.db");
        assert!(dir.path().join("nested/config.toml").exists());
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scheduler]\ntick_seconds = 5\n\n[logging]\nformat = \"json\"\n").unwrap();

        let config = Config::from_config(Some(&path)).unwrap();

        assert_eq!(config.scheduler.tick_seconds, 5);
        assert_eq!(config.probe.timeout_seconds, 30);
        assert_eq!(config.logging.format, logger::LogFormat::Json);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scheduler\n").unwrap();

        assert!(matches!(Config::from_config(Some(&path)), Err(Error::ParseFailed(_))));
    }
}
