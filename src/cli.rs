//! CLI arguments and subcommands for services-metrics-exporter.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "services-metrics-exporter",
    about = "Prometheus exporter for per-container Docker resource metrics",
    long_about = "Prometheus exporter for per-container Docker resource metrics.\n\n\
                  Every scrape lists the containers known to the Docker engine, fetches a \
                  one-shot stats sample for each selected container concurrently, and \
                  exports CPU, memory, network, block I/O and pids metrics together with \
                  a cache-adjusted memory total.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level (overrides the config file)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Collect only these containers (comma-separated names)
    #[arg(long)]
    pub services: Option<String>,

    /// Collect every container, ignoring the services list
    #[arg(long)]
    pub collect_all: bool,

    /// Extra label as NAME=TEMPLATE (repeatable, kept in order)
    #[arg(long = "label", value_name = "NAME=TEMPLATE")]
    pub labels: Vec<String>,

    /// Docker endpoint (unix:///path, /path, tcp://host:port, http://host:port)
    #[arg(long)]
    pub docker_host: Option<String>,

    /// Per-container deadline for runtime calls, in seconds
    #[arg(long)]
    pub stats_timeout_secs: Option<u64>,

    /// Maximum number of containers collected concurrently
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Disable internal docker_exporter_* metrics
    #[arg(long)]
    pub disable_telemetry: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration, label templates and runtime access
    Check {
        /// Skip connecting to the container runtime
        #[arg(long)]
        offline: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Run scrape cycles and print the result
    Test {
        /// Number of scrape cycles
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Print every sample
        #[arg(long)]
        verbose: bool,

        /// Print the Prometheus text exposition of the last cycle
        #[arg(long)]
        exposition: bool,

        /// Scrape a fixture file instead of the Docker engine
        #[arg(short = 'f', long)]
        fixture: Option<PathBuf>,
    },

    /// Generate a synthetic fixture JSON file for `test --fixture`
    GenerateFixture {
        /// Output file path
        #[arg(short = 'o', long, default_value = "fixture.json")]
        output: PathBuf,

        /// Number of running containers
        #[arg(long, default_value_t = 12)]
        running: usize,

        /// Number of stopped containers
        #[arg(long, default_value_t = 3)]
        stopped: usize,
    },
}
