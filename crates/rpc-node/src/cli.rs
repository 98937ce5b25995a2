//! Command-line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Correlated request/response over an in-process broker
#[derive(Parser, Debug)]
#[command(name = "rpc-node", version)]
#[command(about = "Send requests and wait for correlated replies")]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (overrides RPC_LOG_LEVEL)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    pub json_logs: bool,

    /// Topic the built-in echo responder serves
    #[arg(long, default_value = "services/echo")]
    pub service_topic: String,

    /// Delay before the echo responder answers
    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
    pub responder_delay: Duration,

    /// Print Prometheus metrics before exiting
    #[arg(long)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one request and print the reply
    Request {
        /// Topic to publish the request on
        topic: String,

        /// Request payload
        payload: String,

        /// Per-request timeout (e.g. "250ms", "2s")
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,
    },

    /// Fire concurrent requests at the echo responder and report outcomes
    Demo {
        /// Number of requests to send
        #[arg(short, long, default_value_t = 10)]
        requests: usize,
    },
}
