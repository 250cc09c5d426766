//! switchyard: a connection-context server for HTTP, WebSocket and SMTP.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::listener ──▶ context (accept → receive → classify)
//!                                     │
//!                         ┌───────────┼─────────────┐
//!                         ▼           ▼             ▼
//!                       HTTP      WebSocket        SMTP
//!                    (respond)  (101, hand off)  (ack, reset)
//!                         │                         │
//!                         └──▶ dispose: close | keep-alive ◀┘
//! ```
//!
//! The built-in handler echoes HTTP paths, upgrades WebSocket requests and
//! logs received mail.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;

use switchyard::config::{load_config, SwitchyardConfig};
use switchyard::context::{ConnectionContext, ContextError, ContextType};
use switchyard::lifecycle::{wait_for_signal, Shutdown};
use switchyard::net::listener::{ContextHandler, Listener};
use switchyard::observability::{logging, metrics};
use switchyard::websocket::CLIENT_ID_HEADER;

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Serve HTTP, WebSocket and SMTP connections", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(short, long)]
    log_level: Option<String>,
}

struct EchoHandler;

#[async_trait]
impl ContextHandler for EchoHandler {
    async fn handle(&self, context: &mut ConnectionContext) {
        match context.kind() {
            ContextType::Http => {
                let path = match context.http_request() {
                    Ok(request) => request.path().to_string(),
                    Err(_) => return,
                };
                let response = context.response_mut();
                response.headers_mut().add("Content-Type", "text/plain");
                response.set_body(path);
            }
            ContextType::WebSocket => {
                let client_id = context
                    .http_request()
                    .ok()
                    .and_then(|request| request.headers().get(CLIENT_ID_HEADER))
                    .map(str::to_string);
                match context.upgrade_websocket(client_id).await {
                    Ok(socket) => {
                        // No frame handling: hold the socket until the peer leaves.
                        let listener = context.listener().clone();
                        tokio::spawn(async move {
                            if let Err(e) = socket.drain_inbound().await {
                                tracing::debug!(client_id = %socket.client_id(), error = %e, "WebSocket read failed");
                            }
                            listener.release_websocket(&socket).await;
                        });
                    }
                    Err(e @ ContextError::DuplicateClient { .. }) => {
                        tracing::warn!(context_id = %context.id(), error = %e, "WebSocket client id in use");
                        context.response_mut().set_status_code(409);
                    }
                    Err(e) => {
                        tracing::warn!(context_id = %context.id(), error = %e, "WebSocket upgrade failed");
                    }
                }
            }
            ContextType::Smtp => {
                if let Ok(request) = context.smtp_request() {
                    if request.can_process() {
                        tracing::info!(
                            context_id = %context.id(),
                            from = ?request.sender(),
                            to = ?request.recipients(),
                            bytes = request.body().len(),
                            "Mail received"
                        );
                    }
                }
            }
            ContextType::Unknown => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SwitchyardConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "switchyard starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config).await?;
    tracing::info!(
        addresses = ?listener.local_addrs(),
        kind = %config.listener.kind,
        max_connections = listener.max_connections(),
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    let server = tokio::spawn(listener.run(Arc::new(EchoHandler), shutdown.subscribe()));

    wait_for_signal().await?;
    shutdown.trigger();
    server.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
