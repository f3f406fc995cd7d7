//! Config command implementation.

use anyhow::Context;
use services_metrics_exporter::Config;
use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;

/// Writes the default configuration, optionally with a commented header.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> anyhow::Result<()> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("services-metrics-exporter.yaml"));

    let content = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
        ConfigFormat::Toml => toml::to_string_pretty(&config)?,
        ConfigFormat::Yaml => {
            let content = serde_yaml::to_string(&config)?;
            if commented {
                add_config_comments(content)
            } else {
                content
            }
        }
    };

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)
            .with_context(|| format!("cannot write {}", output.display()))?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# services-metrics-exporter Configuration
# ========================================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 9338                   # HTTP port
# tls_cert_file: null          # PEM certificate; set together with tls_key_file
# tls_key_file: null           # PEM private key
#
# Container Selection
# -------------------
# services: []                 # Container names to collect (empty = all)
# collect_all: false           # Ignore the services list and collect everything
#
# Runtime Access
# --------------
# docker_host: null            # unix:///var/run/docker.sock, tcp://host:2375, ...
# stats_timeout_secs: 10       # Per-container deadline for runtime calls
# max_concurrency: 32          # Containers collected at the same time
# collect_disk_usage: false    # Ask the engine for container sizes (slow)
#
# Extra Labels
# ------------
# labels:                      # Added to every per-container metric, in order
#   - name: project
#     template: '{{ .Container.Labels["com.docker.compose.project"] }}'
#   - name: image
#     template: '{{ .ContainerJSON.Config.Image }}'
#
# Feature Flags
# -------------
# enable_health: true          # Enable /health endpoint
# enable_telemetry: true       # Enable docker_exporter_* metrics
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
#
# Log Retention
# -------------
# cleaners:
#   - name: loki
#     path: /var/lib/loki/chunks
#     max_age_days: 14
#     interval_secs: 3600
#   - name: jaeger
#     path: /var/lib/jaeger
#     max_age_days: 2
#     interval_secs: 3600
"#;

    format!("{comments}\n{yaml}")
}
