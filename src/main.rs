//! services-metrics-exporter
//!
//! Prometheus exporter for per-container Docker resource metrics. Every
//! `/metrics` request runs one scrape cycle against the Docker engine.

mod cli;
mod commands;
mod handlers;
mod setup;
mod state;

use anyhow::Context;
use axum::{routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use services_metrics_exporter::cleaner::spawn_cleaner;
use services_metrics_exporter::config::{load_config, validate_effective_config, LabelDefinition};
use services_metrics_exporter::health_stats::HealthStats;
use services_metrics_exporter::{Config, BUILD_INFO};
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, level_filters::LevelFilter, warn};

use cli::{Args, Commands, ConfigFormat};
use handlers::{health_handler, metrics_handler, root_handler};
use state::AppState;

/// Grace period for in-flight TLS connections at shutdown.
const TLS_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Merges the config file (or defaults) with CLI overrides; CLI wins.
fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }
    if let Some(level) = &args.log_level {
        config.log_level = Some(format!("{:?}", level).to_lowercase());
    }

    // Container selection
    if let Some(services) = &args.services {
        config.services = services
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if args.collect_all {
        config.collect_all = Some(true);
    }
    if !args.labels.is_empty() {
        config.labels = args
            .labels
            .iter()
            .map(|raw| {
                setup::parse_label_arg(raw).map(|(name, template)| LabelDefinition { name, template })
            })
            .collect::<anyhow::Result<_>>()?;
    }

    // Runtime access
    if args.docker_host.is_some() {
        config.docker_host = args.docker_host.clone();
    }
    if args.stats_timeout_secs.is_some() {
        config.stats_timeout_secs = args.stats_timeout_secs;
    }
    if args.max_concurrency.is_some() {
        config.max_concurrency = args.max_concurrency;
    }

    // Feature flags
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.disable_telemetry {
        config.enable_telemetry = Some(false);
    }

    Ok(config)
}

/// Shows configuration in requested format
fn show_config(config: &Config, format: &ConfigFormat) -> anyhow::Result<()> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    println!("{output}");
    Ok(())
}

fn parse_level(raw: &str) -> Option<LevelFilter> {
    match raw.to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::OFF),
        "error" => Some(LevelFilter::ERROR),
        "warn" => Some(LevelFilter::WARN),
        "info" => Some(LevelFilter::INFO),
        "debug" => Some(LevelFilter::DEBUG),
        "trace" => Some(LevelFilter::TRACE),
        _ => None,
    }
}

/// `check` reports an invalid configuration in its own output instead.
fn validates_at_startup(command: Option<&Commands>) -> bool {
    !matches!(command, Some(Commands::Check { .. }))
}

/// Initializes tracing logging subsystem with configured log level
fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let raw = config.log_level.as_deref().unwrap_or("info");
    let level = parse_level(raw).unwrap_or(LevelFilter::INFO);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    if parse_level(raw).is_none() {
        warn!("Unknown log level '{}', using info", raw);
    }
    info!("Logging initialized with level: {}", level);
    Ok(())
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// -------------------------------------------------------------------
/// MAIN APPLICATION ENTRY POINT
/// -------------------------------------------------------------------
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, &args.config_format);
    }

    let config = resolve_config(&args)?;
    if validates_at_startup(args.command.as_ref()) {
        if let Err(e) = validate_effective_config(&config) {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        // `config` prints to stdout; keep it free of log lines.
        if !matches!(command, Commands::Config { .. }) {
            setup_logging(&config)?;
        }

        return match command {
            Commands::Check { offline } => commands::command_check(*offline, &config).await,
            Commands::Config {
                output,
                format,
                commented,
            } => commands::command_config(output.clone(), format.clone(), *commented),
            Commands::Test {
                iterations,
                verbose,
                exposition,
                fixture,
            } => {
                commands::command_test(
                    *iterations,
                    *verbose,
                    *exposition,
                    fixture.clone(),
                    &config,
                )
                .await
            }
            Commands::GenerateFixture {
                output,
                running,
                stopped,
            } => commands::command_generate_fixture(output.clone(), *running, *stopped, &config),
        };
    }

    setup_logging(&config)?;
    info!("Starting services-metrics-exporter {}", *BUILD_INFO);

    let runtime = setup::connect_runtime(&config).await?;
    let collector = setup::build_collector(&config, runtime).await?;

    let cleaners: Vec<_> = config.cleaners.iter().cloned().map(spawn_cleaner).collect();
    if !cleaners.is_empty() {
        debug!("{} log cleaners started", cleaners.len());
    }

    let addr = config.listen_addr()?;
    let state = Arc::new(AppState {
        collector,
        config: Arc::new(config.clone()),
        health_stats: Arc::new(HealthStats::new()),
    });

    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler));

    // Conditionally add health endpoint
    if config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }

    let app = app.with_state(state);

    let result = match config.tls_files() {
        Some((cert, key)) => {
            let tls = RustlsConfig::from_pem_file(cert, key)
                .await
                .with_context(|| {
                    format!(
                        "cannot load TLS files {} / {}",
                        cert.display(),
                        key.display()
                    )
                })?;

            let handle = axum_server::Handle::new();
            let shutdown_handle = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown_handle.graceful_shutdown(Some(TLS_SHUTDOWN_GRACE));
            });

            info!("services-metrics-exporter listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("server error")
        }
        None => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("cannot bind {}", addr))?;
            info!("services-metrics-exporter listening on http://{}", addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("server error")
        }
    };

    for cleaner in cleaners {
        cleaner.abort();
    }

    if let Err(e) = &result {
        error!("{:#}", e);
    } else {
        info!("services-metrics-exporter stopped gracefully");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "services-metrics-exporter",
            "--no-config",
            "--port",
            "9999",
            "--services",
            "api, db,",
            "--label",
            "project={{ .Container.Labels[\"p\"] }}",
            "--max-concurrency",
            "4",
            "--disable-health",
            "--log-level",
            "debug",
        ]);

        let cfg = resolve_config(&args).unwrap();
        assert_eq!(cfg.port, Some(9999));
        assert_eq!(cfg.services, vec!["api", "db"]);
        assert_eq!(cfg.labels[0].name, "project");
        assert_eq!(cfg.max_concurrency, Some(4));
        assert_eq!(cfg.enable_health, Some(false));
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
        assert!(validate_effective_config(&cfg).is_ok());
    }

    #[test]
    fn test_bad_label_argument_is_rejected() {
        let args = Args::parse_from(["services-metrics-exporter", "--no-config", "--label", "x"]);
        assert!(resolve_config(&args).is_err());
    }

    #[test]
    fn test_check_runs_on_invalid_config() {
        let args = Args::parse_from([
            "services-metrics-exporter",
            "--no-config",
            "--max-concurrency",
            "0",
            "check",
            "--offline",
        ]);
        let cfg = resolve_config(&args).unwrap();
        assert!(validate_effective_config(&cfg).is_err());
        assert!(!validates_at_startup(args.command.as_ref()));

        let args = Args::parse_from(["services-metrics-exporter", "--no-config", "test"]);
        assert!(validates_at_startup(args.command.as_ref()));
        assert!(validates_at_startup(None));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("WARN"), Some(LevelFilter::WARN));
        assert_eq!(parse_level("off"), Some(LevelFilter::OFF));
        assert_eq!(parse_level("verbose"), None);
    }
}
