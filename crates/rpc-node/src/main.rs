//! # RPC Node
//!
//! Starts an in-process broker, an echo responder and a request handler,
//! then runs one command:
//!
//! - `request <topic> <payload>` sends a single request and prints the reply
//! - `demo --requests N` sends N concurrent requests and reports outcomes
//!
//! ## Startup Sequence
//!
//! 1. Parse arguments and initialize telemetry
//! 2. Load configuration (file, then `RPC_*` environment overrides)
//! 3. Start the broker (with credentials if configured)
//! 4. Start the echo responder
//! 5. Connect the request handler and subscribe to its reply topic

mod cli;
mod responder;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use secrecy::ExposeSecret;
use tracing::{info, warn};

use rpc_core::{Message, RequestHandler, RpcConfig, RpcError};
use rpc_telemetry::{init_telemetry, TelemetryConfig};
use shared_bus::{ConnectOptions, InMemoryBroker};

use crate::cli::{Cli, Command};
use crate::responder::EchoResponder;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig::from_env();
    if let Some(level) = &cli.log_level {
        telemetry = telemetry.with_log_level(level.clone());
    }
    telemetry.json_logs |= cli.json_logs;
    let guard = init_telemetry(telemetry).context("failed to initialize telemetry")?;

    let config = load_config(cli.config.as_deref())?;
    let broker = start_broker(&config);

    let mut responder_options = ConnectOptions::default();
    if let Some(username) = &config.transport.username {
        responder_options = responder_options.with_username(username.clone());
    }
    if let Some(password) = &config.transport.password {
        responder_options = responder_options.with_password(password.expose_secret());
    }
    let _responder = EchoResponder::start(
        &broker,
        responder_options,
        &cli.service_topic,
        cli.responder_delay,
    )
    .await
    .context("failed to start echo responder")?;

    let handler = RequestHandler::connect(&broker, &config)
        .await
        .context("failed to start request handler")?;

    match cli.command {
        Command::Request {
            topic,
            payload,
            timeout,
        } => {
            let message = Message::new(topic, payload);
            let reply = match timeout {
                Some(timeout) => handler.request_with_timeout(message, timeout).await,
                None => handler.request(message).await,
            }
            .context("request failed")?;

            println!("{}", String::from_utf8_lossy(&reply.payload));
        }
        Command::Demo { requests } => run_demo(&handler, &cli.service_topic, requests).await,
    }

    if cli.metrics {
        print!("{}", guard.metrics().gather()?);
    }

    Ok(())
}

/// Load configuration from `path`, or defaults plus environment overrides.
fn load_config(path: Option<&Path>) -> Result<RpcConfig> {
    let config = match path {
        Some(path) => RpcConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            let mut config = RpcConfig::default();
            config.apply_env().context("invalid environment override")?;
            config.validate().context("invalid configuration")?;
            config
        }
    };

    info!(
        address = %config.transport.address,
        timeout_ms = config.requests.timeout.as_millis(),
        authenticated = config.transport.username.is_some() || config.transport.password.is_some(),
        "Configuration loaded"
    );
    Ok(config)
}

fn start_broker(config: &RpcConfig) -> Arc<InMemoryBroker> {
    let mut broker = InMemoryBroker::new().with_address(config.transport.address.clone());
    if let Some(username) = &config.transport.username {
        broker = broker.with_username(username.clone());
    }
    if let Some(password) = &config.transport.password {
        broker = broker.with_password(password.expose_secret());
    }
    Arc::new(broker)
}

async fn run_demo(handler: &RequestHandler, topic: &str, requests: usize) {
    info!(requests, topic = %topic, "Running demo");
    let started = Instant::now();

    let calls = (0..requests).map(|i| handler.request_payload(topic.to_string(), format!("request-{i}")));
    let results = join_all(calls).await;

    let mut ok = 0;
    let mut timed_out = 0;
    let mut failed = 0;
    for (i, result) in results.into_iter().enumerate() {
        match result {
            Ok(reply) if reply.payload.as_ref() == format!("request-{i}").as_bytes() => ok += 1,
            Ok(_) => {
                warn!(request = i, "Reply payload does not match its request");
                failed += 1;
            }
            Err(RpcError::RequestTimeout { .. }) => timed_out += 1,
            Err(e) => {
                warn!(request = i, error = %e, "Request failed");
                failed += 1;
            }
        }
    }

    let stats = handler.stats();
    println!(
        "{requests} requests in {:?}: {ok} ok, {timed_out} timed out, {failed} failed ({} pending, {} dropped replies)",
        started.elapsed(),
        handler.pending_count(),
        stats.dropped_replies,
    );
}
