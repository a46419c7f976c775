//! Server initialization and startup logic for Agentation.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use agentation_bridge::{BridgeOptions, SamplingFeedbackHandler};
use agentation_config::{Config, ConfigLoader, ConfigValidator, LoggingConfig, ValidationResult};
use agentation_mcp::{LineWriter, McpServer, TransportError};
use agentation_relay::{RelayConfig, RelayServer};

type McpTask = JoinHandle<Result<(), TransportError>>;

fn log_dir(logging: &LoggingConfig) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match &logging.directory {
        Some(dir) => Ok(ConfigLoader::expand_path(dir)),
        None => Ok(ConfigLoader::base_dir()?.join("logs")),
    }
}

/// Initialize tracing with stderr and optional daily file output.
///
/// Stdout carries the MCP protocol, so console logs go to stderr.
pub(crate) fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = if logging.file {
        let dir = log_dir(logging)?;
        std::fs::create_dir_all(&dir)?;

        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("agentation")
            .filename_suffix("log")
            .max_log_files(14)
            .build(&dir)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Flushes on drop; must live for the whole process.
        static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
            std::sync::OnceLock::new();
        let _ = GUARD.set(guard);

        Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(())
}

fn report(validation: &ValidationResult) {
    for warning in &validation.warnings {
        warn!("Config warning at {}: {}", warning.path, warning.message);
    }
    for err in &validation.errors {
        error!("Config error at {}: {}", err.path, err.message);
    }
}

/// Validate and print the effective configuration.
pub(crate) fn check_config(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let validation = ConfigValidator::validate(config);

    println!("{}", serde_json::to_string_pretty(config)?);
    for warning in &validation.warnings {
        eprintln!("warning: {}: {}", warning.path, warning.message);
    }
    for err in &validation.errors {
        eprintln!("error: {}: {}", err.path, err.message);
    }

    if validation.is_valid() {
        eprintln!("Configuration is valid");
        Ok(())
    } else {
        Err(format!("{} configuration error(s)", validation.errors.len()).into())
    }
}

/// Run the relay (and the MCP stdio server unless disabled) until shutdown.
pub(crate) async fn run_server(
    config: Config,
    no_mcp: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let validation = ConfigValidator::validate(&config);
    report(&validation);
    if !validation.is_valid() {
        return Err(format!("{} configuration error(s)", validation.errors.len()).into());
    }

    let relay = RelayServer::new(RelayConfig::new(
        config.server.host.clone(),
        config.server.port,
    ));
    let addr = relay.start().await?;

    let mcp_task = if no_mcp {
        info!("MCP server disabled; submissions get a placeholder acknowledgement");
        None
    } else {
        Some(start_mcp(&relay, &config))
    };

    info!("Agentation ready:");
    info!("  Relay:   ws://{}", addr);
    info!("  Health:  http://{}/health", addr);

    wait_for_shutdown(mcp_task).await;

    info!("Shutting down...");
    relay.stop().await?;
    Ok(())
}

/// Serve MCP on stdio and install the sampling-backed feedback handler.
fn start_mcp(relay: &RelayServer, config: &Config) -> McpTask {
    let mcp = Arc::new(McpServer::new(
        relay.state(),
        LineWriter::new(tokio::io::stdout()),
        config.sampling.timeout(),
    ));

    let handler = SamplingFeedbackHandler::new(mcp.sampler(), BridgeOptions::from(&config.sampling));
    relay.set_feedback_handler(Arc::new(handler));

    tokio::spawn(async move { mcp.run(tokio::io::stdin()).await })
}

async fn wait_for_shutdown(mcp_task: Option<McpTask>) {
    let mcp_closed = async {
        match mcp_task {
            Some(task) => match task.await {
                Ok(Ok(())) => info!("MCP client disconnected"),
                Ok(Err(e)) => error!("MCP transport failed: {}", e),
                Err(e) => error!("MCP server task failed: {}", e),
            },
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
        _ = terminate() => info!("Received SIGTERM"),
        _ = mcp_closed => {}
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}
