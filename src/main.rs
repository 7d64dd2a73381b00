//! fuzzmon - live MQTT monitor for fuzzing campaigns

use clap::{Parser, Subcommand};
use fuzzmon::config::MonitorConfig;
use fuzzmon::console::{self, ConsoleRenderer, OutputFormat, SvgMirror};
use fuzzmon::monitor::{Monitor, MonitorHandle, MonitorView};
use fuzzmon::observability::init_default_logging;
use fuzzmon::transport::mqtt::{ConnectionStatus, MqttConnector};
use fuzzmon::{MonitorError, MonitorResult};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Live monitor for a fuzzing campaign published over MQTT
#[derive(Parser)]
#[command(name = "fuzzmon")]
#[command(about = "Live MQTT monitor for fuzzing campaigns")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Broker URL, overriding the configuration file
    #[arg(long, env = "FUZZMON_BROKER", value_name = "URL")]
    broker: Option<String>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and render every update until interrupted
    Run {
        /// Mirror diagram markup into this directory as SVG files
        #[arg(long, value_name = "DIR")]
        svg_dir: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "pretty")]
        format: OutputFormat,
    },
    /// Publish one message and exit
    Publish {
        /// Topic to publish on
        #[arg(short, long)]
        topic: String,

        /// Message payload
        #[arg(short, long)]
        message: String,

        /// How long to stay connected after publishing
        #[arg(long, default_value_t = 500)]
        linger_ms: u64,

        /// How long to wait for the broker to accept the connection
        #[arg(long, default_value_t = 10)]
        connect_timeout_secs: u64,
    },
    /// Validate the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose);

    let config = match load_configuration(cli.config.as_ref(), cli.broker.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { svg_dir, format } => run_monitor(config, svg_dir, format).await,
        Commands::Publish {
            topic,
            message,
            linger_ms,
            connect_timeout_secs,
        } => {
            publish_once(
                config,
                &topic,
                message,
                Duration::from_millis(linger_ms),
                Duration::from_secs(connect_timeout_secs),
            )
            .await
        }
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(
    config_path: Option<&PathBuf>,
    broker_override: Option<&str>,
) -> MonitorResult<MonitorConfig> {
    let mut config = match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            MonitorConfig::load_from_file(path)?
        }
        None => {
            let default_paths = ["fuzzmon.toml", "config/fuzzmon.toml"];
            match default_paths
                .iter()
                .map(PathBuf::from)
                .find(|path| path.exists())
            {
                Some(path) => {
                    info!("Loading configuration from: {}", path.display());
                    MonitorConfig::load_from_file(&path)?
                }
                None => {
                    info!("No configuration file found, using defaults");
                    MonitorConfig::default()
                }
            }
        }
    };

    if let Some(broker) = broker_override {
        config.mqtt.broker_url = broker.to_string();
        config.validate()?;
    }

    Ok(config)
}

async fn run_monitor(
    config: MonitorConfig,
    svg_dir: Option<PathBuf>,
    format: OutputFormat,
) -> MonitorResult<()> {
    let mirror = svg_dir.map(SvgMirror::new).transpose()?;

    let monitor = Monitor::new(MqttConnector::from_config(&config), &config);
    let handle = monitor.handle();
    let view = monitor.view();
    let monitor_task = tokio::spawn(monitor.run());

    info!(broker = %config.mqtt.broker_url, "Connecting");
    handle.connect();

    let (stop_tx, stop_rx) = watch::channel(false);
    let render_task = tokio::spawn(async move {
        let mut renderer = ConsoleRenderer::new(std::io::stdout(), format, mirror);
        console::run_console(view, &mut renderer, stop_rx).await
    });

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let stdin_lines = console::spawn_stdin_reader()?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
        read = console::read_commands(handle.clone(), stdin_lines) => {
            if let Err(e) = read {
                warn!("Console input failed: {}", e);
            }
            info!("Console closed, shutting down...");
        }
    }

    shutdown(&handle, monitor_task).await;
    let _ = stop_tx.send(true);
    match render_task.await {
        Ok(Err(e)) => warn!("Console output failed: {}", e),
        Err(e) => warn!("Console task ended abnormally: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Monitor shutdown complete");
    Ok(())
}

async fn publish_once(
    config: MonitorConfig,
    topic: &str,
    message: String,
    linger: Duration,
    connect_timeout: Duration,
) -> MonitorResult<()> {
    let monitor = Monitor::new(MqttConnector::from_config(&config), &config);
    let handle = monitor.handle();
    let view = monitor.view();
    let monitor_task = tokio::spawn(monitor.run());

    handle.connect();
    let connected = wait_for_connection(&view, connect_timeout).await;
    if let Err(e) = connected {
        shutdown(&handle, monitor_task).await;
        return Err(e);
    }

    let (failure_tx, mut failure_rx) = tokio::sync::mpsc::unbounded_channel();
    handle
        .publisher()
        .with_error_callback(move |failure| {
            fuzzmon::monitor::log_publish_failure(failure);
            let _ = failure_tx.send(failure.cause.clone());
        })
        .publish(topic, message);

    tokio::time::sleep(linger).await;
    shutdown(&handle, monitor_task).await;

    match failure_rx.try_recv() {
        Ok(cause) => Err(MonitorError::PublishFailed {
            topic: topic.to_string(),
            cause,
        }),
        Err(_) => {
            info!(topic, "Message published");
            Ok(())
        }
    }
}

/// Wait until the broker acknowledges the connection
async fn wait_for_connection(view: &MonitorView, limit: Duration) -> MonitorResult<()> {
    let mut status = view.status.clone();
    let waited = tokio::time::timeout(
        limit,
        status.wait_for(|s| {
            matches!(
                s,
                ConnectionStatus::Connected | ConnectionStatus::ConnectionError
            )
        }),
    )
    .await;

    match waited {
        Ok(Ok(reached)) if *reached == ConnectionStatus::Connected => Ok(()),
        Ok(Ok(reached)) => Err(MonitorError::ConnectionFailed {
            status: reached.to_string(),
        }),
        Ok(Err(_)) => Err(MonitorError::ConnectionFailed {
            status: "monitor stopped".to_string(),
        }),
        Err(_) => Err(MonitorError::timeout("broker acknowledgement", limit)),
    }
}

async fn shutdown(handle: &MonitorHandle, monitor_task: tokio::task::JoinHandle<()>) {
    handle.shutdown().await;
    if let Err(e) = monitor_task.await {
        error!("Monitor task ended abnormally: {}", e);
    }
}

fn handle_config_command(config: &MonitorConfig, show: bool) -> MonitorResult<()> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
