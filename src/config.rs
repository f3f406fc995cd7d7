//! Exporter configuration.
//!
//! Loaded once at startup from a YAML, JSON or TOML file (chosen by
//! extension), then overridden by CLI flags. Every field is optional in the
//! file; accessors apply the documented defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::collector::labels::LabelTemplate;
use crate::collector::CollectorOptions;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9338;
pub const DEFAULT_STATS_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;

/// Config file locations tried when no `--config` is given.
pub const DEFAULT_CONFIG_PATHS: [&str; 4] = [
    "/etc/services-metrics-exporter/config.yaml",
    "/etc/services-metrics-exporter/config.yml",
    "./services-metrics-exporter.yaml",
    "./services-metrics-exporter.yml",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

/// A named extra label and the template producing its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDefinition {
    pub name: String,
    pub template: String,
}

/// One log-retention sweeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanerConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(alias = "max-age-days")]
    pub max_age_days: u64,
    #[serde(default = "default_cleaner_interval", alias = "interval-secs")]
    pub interval_secs: u64,
}

fn default_cleaner_interval() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,
    #[serde(alias = "tls-cert-file")]
    pub tls_cert_file: Option<PathBuf>,
    #[serde(alias = "tls-key-file")]
    pub tls_key_file: Option<PathBuf>,

    // Container selection
    /// Allow-list of container names; empty means every container.
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(alias = "collect-all")]
    pub collect_all: Option<bool>,

    // Runtime access
    #[serde(alias = "docker-host")]
    pub docker_host: Option<String>,
    #[serde(alias = "stats-timeout-secs")]
    pub stats_timeout_secs: Option<u64>,
    #[serde(alias = "max-concurrency")]
    pub max_concurrency: Option<usize>,
    #[serde(alias = "collect-disk-usage")]
    pub collect_disk_usage: Option<bool>,

    // Feature flags
    pub enable_health: Option<bool>,
    pub enable_telemetry: Option<bool>,

    // Logging
    pub log_level: Option<String>,

    // Tables last, so the TOML serializer emits every plain value first.
    /// Extra labels, in output order.
    #[serde(default)]
    pub labels: Vec<LabelDefinition>,
    /// Log retention sweepers.
    #[serde(default)]
    pub cleaners: Vec<CleanerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            tls_cert_file: None,
            tls_key_file: None,
            services: Vec::new(),
            collect_all: Some(false),
            docker_host: None,
            stats_timeout_secs: Some(DEFAULT_STATS_TIMEOUT_SECS),
            max_concurrency: Some(DEFAULT_MAX_CONCURRENCY),
            collect_disk_usage: Some(false),
            enable_health: Some(true),
            enable_telemetry: Some(true),
            log_level: Some("info".into()),
            labels: Vec::new(),
            cleaners: Vec::new(),
        }
    }
}

impl Config {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let bind = self.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        let ip: IpAddr = bind
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid bind address '{}'", bind)))?;
        Ok(SocketAddr::new(ip, self.port.unwrap_or(DEFAULT_PORT)))
    }

    pub fn collect_all(&self) -> bool {
        self.collect_all.unwrap_or(false)
    }

    pub fn stats_timeout(&self) -> Duration {
        Duration::from_secs(self.stats_timeout_secs.unwrap_or(DEFAULT_STATS_TIMEOUT_SECS))
    }

    pub fn collector_options(&self) -> CollectorOptions {
        CollectorOptions {
            max_concurrency: self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
            stats_timeout: self.stats_timeout(),
            telemetry: self.enable_telemetry.unwrap_or(true),
        }
    }

    /// TLS certificate and key, when both are configured.
    pub fn tls_files(&self) -> Option<(&Path, &Path)> {
        match (&self.tls_cert_file, &self.tls_key_file) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }
}

/// Validates the effective config (used by `--check-config` and at startup).
pub fn validate_effective_config(cfg: &Config) -> Result<(), ConfigError> {
    cfg.listen_addr()?;

    if cfg.stats_timeout_secs == Some(0) {
        return Err(ConfigError::Invalid(
            "stats_timeout_secs must be greater than zero".into(),
        ));
    }
    if cfg.max_concurrency == Some(0) {
        return Err(ConfigError::Invalid(
            "max_concurrency must be greater than zero".into(),
        ));
    }

    if cfg.tls_cert_file.is_some() != cfg.tls_key_file.is_some() {
        return Err(ConfigError::Invalid(
            "tls_cert_file and tls_key_file must be set together".into(),
        ));
    }

    let mut label_names = HashSet::new();
    for def in &cfg.labels {
        if !label_names.insert(def.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "label '{}' is defined more than once",
                def.name
            )));
        }
        LabelTemplate::compile(&def.name, &def.template)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }

    let mut cleaner_names = HashSet::new();
    for cleaner in &cfg.cleaners {
        if !cleaner_names.insert(cleaner.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "cleaner '{}' is defined more than once",
                cleaner.name
            )));
        }
        if cleaner.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "cleaner '{}' has an empty path",
                cleaner.name
            )));
        }
        if cleaner.max_age_days == 0 || cleaner.interval_secs == 0 {
            return Err(ConfigError::Invalid(format!(
                "cleaner '{}' needs max_age_days and interval_secs greater than zero",
                cleaner.name
            )));
        }
    }

    Ok(())
}

/// Loads a config file; falls back to the default locations, then to the
/// built-in defaults when no file exists.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match DEFAULT_CONFIG_PATHS.iter().map(Path::new).find(|p| p.exists()) {
            Some(p) => p.to_path_buf(),
            None => return Ok(Config::default()),
        },
    };

    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;

    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        })?,
        Some("toml") => toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.clone(),
            source,
        })?,
        // Default to YAML
        _ => serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.clone(),
            source,
        })?,
    };

    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}
