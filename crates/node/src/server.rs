//! TCP command server with graceful shutdown
//!
//! One task per accepted connection. A connection reads one frame at a time,
//! answers it, and loops until `bye`, end of stream, or a frame it cannot
//! decode. Command-level failures are answered and the loop continues.

use std::future::Future;
use std::net::SocketAddr;

use chrono::Utc;
use fleet_core::config::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PORT};
use fleet_core::Result;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tracing::{debug, error, info, warn};
use wire::{codec, Message, Reply, ReplyKind, Request};

use crate::state::NodeStateHandle;

/// Node server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub addr: SocketAddr,

    /// Largest request frame accepted
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Worker node command server
pub struct NodeServer {
    config: ServerConfig,
    state: NodeStateHandle,
}

impl NodeServer {
    /// Create a server with the default configuration
    pub fn new(state: NodeStateHandle) -> Self {
        Self {
            config: ServerConfig::default(),
            state,
        }
    }

    /// Create with custom configuration
    pub fn with_config(state: NodeStateHandle, config: ServerConfig) -> Self {
        Self { config, state }
    }

    /// Run the server until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<()> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// Bind the configured address and serve until `signal` resolves
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.addr).await?;
        self.serve_listener(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves
    pub async fn serve_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        info!(address = %addr, "Node server listening");

        tokio::pin!(signal);
        loop {
            tokio::select! {
                _ = &mut signal => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let state = self.state.clone();
                        let max_message_size = self.config.max_message_size;
                        tokio::spawn(async move {
                            serve_connection(stream, peer, state, max_message_size).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                },
            }
        }

        info!(
            address = %addr,
            open_connections = self.state.connections().len(),
            "Node server shutdown complete"
        );
        Ok(())
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    state: NodeStateHandle,
    max_message_size: usize,
) {
    let id = state.connections().open(peer);

    loop {
        let message: Message = match codec::try_read_frame(&mut stream, max_message_size).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(connection = %id, "Peer closed connection");
                break;
            }
            Err(e) => {
                warn!(connection = %id, error = %e, "Dropping connection after bad frame");
                break;
            }
        };

        state.connections().record_command(id, &message.command);

        let (reply, kind, close) = match Request::from_message(&message) {
            Ok(request) => {
                debug!(connection = %id, command = request.name(), "Handling command");
                let reply = state.handle(&request).await;
                (reply, request.reply_kind(), matches!(request, Request::Bye))
            }
            Err(e) => {
                warn!(connection = %id, command = %message.command, error = %e, "Rejected command");
                (
                    Reply::from_error(&e),
                    ReplyKind::for_command(&message.command),
                    false,
                )
            }
        };

        if let Err(e) = reply.write_to(&mut stream, kind).await {
            warn!(connection = %id, error = %e, "Failed to send reply");
            break;
        }

        if close {
            break;
        }
    }

    if let Some(info) = state.connections().close(id) {
        info!(
            connection = %id,
            peer = %info.peer,
            commands = info.commands_handled,
            duration_ms = (Utc::now() - info.opened_at).num_milliseconds(),
            "Connection finished"
        );
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
