//! Agentation - local relay between the annotation UI and an AI assistant.
//!
//! Main entry point for the relay server and its MCP stdio front.

mod cli;
mod server;

use std::time::Duration;

use clap::Parser;

use agentation_config::{Config, ConfigLoader};

use crate::cli::{Cli, Commands};

/// Time given to in-flight tasks once the server has stopped.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Some(Commands::CheckConfig) => server::check_config(&config),
        None => {
            server::init_tracing(&config.logging)?;

            // Built by hand so a pending stdin read cannot hold up exit.
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let result = runtime.block_on(server::run_server(config, cli.no_mcp));
            runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
            result
        }
    }
}

/// File, then environment, then command line.
fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = ConfigLoader::load_or_default(cli.config.as_deref())?;
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    Ok(config)
}
