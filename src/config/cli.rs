use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use uuid::Uuid;

/// Command-line arguments for the canopy binary.
#[derive(Debug, Parser)]
#[command(name = "canopy", version, about = "Canopy page-tree content server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CANOPY_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(Box<ServeArgs>),
    /// Refresh every prefetch-enrolled remote resource once and print the report.
    Prefetch(PrefetchArgs),
    /// Page tree maintenance.
    Pages(PagesArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Toggle the trailing-slash redirect.
    #[arg(
        long = "append-slash",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub append_slash: Option<bool>,

    /// Run a background prefetch every SECONDS.
    #[arg(long = "prefetch-interval-seconds", value_name = "SECONDS")]
    pub prefetch_interval_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PrefetchArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the number of concurrent fetches.
    #[arg(long = "concurrency", value_name = "COUNT")]
    pub concurrency: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct PagesArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(subcommand)]
    pub command: PagesCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum PagesCommand {
    /// Swap the order of two sibling pages.
    Swap {
        #[arg(value_name = "FIRST")]
        first: Uuid,
        #[arg(value_name = "SECOND")]
        second: Uuid,
    },
    /// Delete a page and all of its descendants.
    Delete {
        #[arg(value_name = "ID")]
        id: Uuid,
    },
}
