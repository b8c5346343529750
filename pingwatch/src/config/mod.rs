//! Application configuration.
//!
//! Loaded once at startup from a TOML file. Telegram credentials may be
//! supplied through the environment (or a `.env` file) instead of the file:
//!
//! - `PINGWATCH_TELEGRAM_TOKEN` overrides `telegram.bot_token`
//! - `PINGWATCH_TELEGRAM_CHAT_ID` overrides `telegram.chat_id`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reachability::{IcmpProber, Prober, TcpProber};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Host, HostRegistry};
use crate::monitor::{MonitorSettings, Thresholds};
use crate::notification::TelegramConfig;
use crate::utils::fs::read_to_string_with_op;
use crate::{Error, Result};

/// Config file used when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "pingwatch.toml";

pub const ENV_TELEGRAM_TOKEN: &str = "PINGWATCH_TELEGRAM_TOKEN";
pub const ENV_TELEGRAM_CHAT_ID: &str = "PINGWATCH_TELEGRAM_CHAT_ID";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Extra `[[hosts]]` file, relative to the config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts_file: Option<PathBuf>,
    pub monitoring: MonitoringConfig,
    pub probe: ProbeConfig,
    pub telegram: TelegramConfig,
    pub logging: LoggingConfig,
    pub hosts: Vec<Host>,
}

/// `[monitoring]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub check_interval_secs: u64,
    pub probe_timeout_ms: u64,
    pub failure_threshold: u32,
    pub recovery_threshold: u32,
    pub max_concurrent_probes: usize,
    pub notification_timeout_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            probe_timeout_ms: 2000,
            failure_threshold: 3,
            recovery_threshold: 2,
            max_concurrent_probes: 32,
            notification_timeout_secs: 10,
        }
    }
}

impl MonitoringConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }
}

/// Probe mechanism.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    /// System `ping` executable.
    #[default]
    Icmp,
    /// TCP connect to `tcp_port` (or the port in the address).
    Tcp,
}

/// `[probe]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub method: ProbeMethod,
    pub tcp_port: u16,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            method: ProbeMethod::Icmp,
            tcp_port: 80,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily log files. Console only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    /// `EnvFilter` directives, overridden by `RUST_LOG`.
    pub filter: String,
    /// Days of log files to keep.
    pub retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            filter: "pingwatch=info,reachability=info".to_string(),
            retention_days: 7,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HostsFile {
    #[serde(default)]
    hosts: Vec<Host>,
}

impl AppConfig {
    /// Load, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and apply environment overrides without validating.
    pub fn read(path: &Path) -> Result<Self> {
        // A missing .env is not an error.
        dotenvy::dotenv().ok();

        let content = read_to_string_with_op("reading config file", path)?;
        let mut config = Self::from_toml_str(&content)?;

        if let Some(hosts_file) = config.hosts_file.clone() {
            let hosts_path = match path.parent() {
                Some(dir) if hosts_file.is_relative() => dir.join(&hosts_file),
                _ => hosts_file,
            };
            let hosts = read_to_string_with_op("reading hosts file", &hosts_path)?;
            let parsed: HostsFile = toml::from_str(&hosts)?;
            debug!(
                path = %hosts_path.display(),
                count = parsed.hosts.len(),
                "Loaded hosts file"
            );
            config.hosts.extend(parsed.hosts);
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse without overrides or validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Replace Telegram credentials with values from `lookup`, when present.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(ENV_TELEGRAM_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.telegram.bot_token = token;
        }
        if let Some(chat_id) = lookup(ENV_TELEGRAM_CHAT_ID).filter(|v| !v.trim().is_empty()) {
            self.telegram.chat_id = chat_id;
        }
    }

    /// Reject settings the monitor cannot run with.
    pub fn validate(&self) -> Result<()> {
        let m = &self.monitoring;
        if m.check_interval_secs == 0 {
            return Err(Error::config("monitoring.check_interval_secs must be positive"));
        }
        if m.probe_timeout_ms == 0 {
            return Err(Error::config("monitoring.probe_timeout_ms must be positive"));
        }
        if m.max_concurrent_probes == 0 {
            return Err(Error::config("monitoring.max_concurrent_probes must be positive"));
        }
        if m.notification_timeout_secs == 0 {
            return Err(Error::config(
                "monitoring.notification_timeout_secs must be positive",
            ));
        }
        if self.probe.method == ProbeMethod::Tcp && self.probe.tcp_port == 0 {
            return Err(Error::config("probe.tcp_port must be positive"));
        }
        self.thresholds()?;
        self.telegram.validate()?;
        self.registry()?;
        Ok(())
    }

    pub fn thresholds(&self) -> Result<Thresholds> {
        Thresholds::new(
            self.monitoring.failure_threshold,
            self.monitoring.recovery_threshold,
        )
        .map_err(|e| Error::config(e.to_string()))
    }

    pub fn registry(&self) -> Result<HostRegistry> {
        HostRegistry::new(self.hosts.clone())
    }

    pub fn monitor_settings(&self) -> Result<MonitorSettings> {
        Ok(MonitorSettings {
            check_interval: self.monitoring.check_interval(),
            probe_timeout: self.monitoring.probe_timeout(),
            thresholds: self.thresholds()?,
            max_concurrent_probes: self.monitoring.max_concurrent_probes,
        })
    }

    pub fn build_prober(&self) -> Arc<dyn Prober> {
        match self.probe.method {
            ProbeMethod::Icmp => Arc::new(IcmpProber::new()),
            ProbeMethod::Tcp => Arc::new(TcpProber::new(self.probe.tcp_port)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SAMPLE: &str = r#"
[monitoring]
check_interval_secs = 30
failure_threshold = 4

[probe]
method = "tcp"
tcp_port = 443

[telegram]
bot_token = "123:abc"
chat_id = "42"

[[hosts]]
name = "router"
address = "192.168.1.1"
description = "core router"

[[hosts]]
name = "nas"
address = "192.168.1.10"
"#;

    #[test]
    fn parses_sample_with_defaults() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.monitoring.check_interval(), Duration::from_secs(30));
        assert_eq!(config.monitoring.probe_timeout(), Duration::from_millis(2000));
        assert_eq!(config.probe.method, ProbeMethod::Tcp);
        assert_eq!(config.telegram.parse_mode, "HTML");
        assert_eq!(config.logging.retention_days, 7);

        let thresholds = config.thresholds().unwrap();
        assert_eq!((thresholds.failure(), thresholds.recovery()), (4, 2));

        let registry = config.registry().unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get(0).unwrap().description.as_deref(),
            Some("core router")
        );
        assert_eq!(config.build_prober().name(), "tcp");
    }

    #[test]
    fn rejects_zero_threshold() {
        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config.monitoring.recovery_threshold = 0;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn rejects_zero_interval() {
        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config.monitoring.check_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_placeholder_credentials() {
        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config.telegram.bot_token = "YOUR_BOT_TOKEN".to_string();
        assert!(config.validate().is_err());

        config.telegram.enabled = false;
        config.validate().unwrap();
    }

    #[test]
    fn rejects_missing_hosts() {
        let config = AppConfig::from_toml_str("[telegram]\nenabled = false\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn environment_overrides_credentials() {
        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config.apply_overrides(|key| match key {
            ENV_TELEGRAM_TOKEN => Some("999:env".to_string()),
            ENV_TELEGRAM_CHAT_ID => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.telegram.bot_token, "999:env");
        assert_eq!(config.telegram.chat_id, "42");
    }

    #[test]
    fn unknown_probe_method_is_a_parse_error() {
        let err = AppConfig::from_toml_str("[probe]\nmethod = \"udp\"\n").unwrap_err();
        assert!(matches!(err, Error::TomlParse(_)));
    }

    #[test]
    fn loads_relative_hosts_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("hosts.toml"),
            "[[hosts]]\nname = \"printer\"\naddress = \"10.0.0.5\"\n",
        )
        .unwrap();
        let config_path = dir.path().join("pingwatch.toml");
        fs::write(
            &config_path,
            format!("hosts_file = \"hosts.toml\"\n{SAMPLE}"),
        )
        .unwrap();

        let config = AppConfig::load(&config_path).unwrap();
        let names: Vec<_> = config.hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["router", "nas", "printer"]);
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
