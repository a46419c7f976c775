//! CLI definitions for Agentation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Agentation relay and MCP server.
#[derive(Parser)]
#[command(name = "agentation")]
#[command(about = "Relay UI annotations from the browser to an MCP-connected AI assistant")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (default: ~/.agentation/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Relay bind host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Relay port
    #[arg(short, long, env = "AGENTATION_PORT", global = true)]
    pub port: Option<u16>,

    /// Log level or filter directive (e.g. "debug", "agentation_relay=trace")
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Run the relay without the MCP stdio server
    #[arg(long)]
    pub no_mcp: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Validate and print the effective configuration
    CheckConfig,
}
