//! ssec - tail a server-sent events endpoint from the command line

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ssec::{HttpMethod, StreamConfig};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "ssec")]
#[command(author, version, about = "Server-sent events client")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SSEC_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, global = true)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream events and print them as they arrive
    Listen {
        /// Event stream URL
        #[arg(env = "SSEC_URL")]
        url: Option<String>,

        #[command(flatten)]
        stream: StreamArgs,

        /// Read the stream on a blocking thread
        #[arg(long)]
        blocking: bool,

        /// Stop after this many events
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },

    /// Print the effective stream configuration
    Config {
        #[command(flatten)]
        stream: StreamArgs,
    },
}

/// Stream settings overriding the config file
#[derive(Args, Debug, Default, Clone)]
struct StreamArgs {
    /// HTTP method (GET or POST)
    #[arg(long)]
    method: Option<HttpMethod>,

    /// Connect timeout in milliseconds
    #[arg(long, value_name = "MS")]
    connect_timeout_ms: Option<u64>,

    /// Body read size in bytes
    #[arg(long, value_name = "BYTES")]
    chunk_size: Option<usize>,

    /// Total number of connection attempts before giving up
    #[arg(long, value_name = "N")]
    max_connect_attempts: Option<u32>,

    /// Wait before reconnecting, in milliseconds
    #[arg(long, value_name = "MS")]
    reconnect_timeout_ms: Option<u64>,

    /// Backoff base in seconds, raised to the attempt number
    #[arg(long, value_name = "SECS")]
    backoff_delay: Option<f64>,
}

impl StreamArgs {
    /// Apply the given flags on top of `config`
    fn apply(&self, mut config: StreamConfig) -> StreamConfig {
        if let Some(method) = self.method {
            config.method = method;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout_ms = ms;
        }
        if let Some(size) = self.chunk_size {
            config.chunk_size = size;
        }
        if let Some(attempts) = self.max_connect_attempts {
            config.max_connect_attempts = attempts;
        }
        if let Some(ms) = self.reconnect_timeout_ms {
            config.reconnect_timeout_ms = ms;
        }
        if let Some(delay) = self.backoff_delay {
            config.backoff_delay = delay;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    let url = match &cli.command {
        Commands::Listen { url, .. } => url.as_deref(),
        Commands::Config { .. } => None,
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(url, cli.output, cli.no_color);

    // Create output context
    let ctx = OutputContext::new(merged.output, merged.no_color, cli.quiet);

    // Execute command
    match &cli.command {
        Commands::Listen {
            stream,
            blocking,
            limit,
            ..
        } => {
            let url = merged
                .url
                .as_deref()
                .context("No URL given (pass one or set SSEC_URL)")?;
            let stream_config = stream.apply(merged.stream.clone());
            stream_config
                .validate()
                .context("Invalid stream configuration")?;
            commands::listen(url, stream_config, *blocking, *limit, &ctx).await?;
        }

        Commands::Config { stream } => {
            commands::show_config(&stream.apply(merged.stream.clone()), &ctx)?;
        }
    }

    Ok(())
}
