//! WebSocket rendering backend: hosts content process units on behalf of
//! remote coordinators.
//!
//! Each connection gets a bare `ready` on accept, then one unit per tab it
//! initializes. Units live as long as their connection.

use std::collections::HashMap;
use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::content_process::ContentProcess;
use crate::types::errors::BridgeError;
use crate::types::protocol::{ProcessCommand, ProcessEvent};
use crate::types::settings::LoadTimingSettings;

/// Environment variable overriding the backend bind address.
pub const BACKEND_ADDR_ENV: &str = "SERVAL_BACKEND_ADDR";
pub const DEFAULT_BACKEND_ADDR: &str = "127.0.0.1:8080";

pub struct BridgeServer {
    listener: TcpListener,
    timing: LoadTimingSettings,
}

impl BridgeServer {
    pub async fn bind(addr: &str, timing: LoadTimingSettings) -> Result<Self, BridgeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::Bind(format!("{}: {}", addr, e)))?;
        Ok(Self { listener, timing })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        self.listener
            .local_addr()
            .map_err(|e| BridgeError::Io(e.to_string()))
    }

    /// Accepts connections until the listener fails.
    pub async fn serve(self) -> Result<(), BridgeError> {
        info!(addr = ?self.listener.local_addr().ok(), "bridge backend listening");
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|e| BridgeError::Io(e.to_string()))?;
            tokio::spawn(serve_connection(stream, peer, self.timing));
        }
    }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, timing: LoadTimingSettings) {
    let socket = match accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!(%peer, error = %e, "websocket handshake failed");
            return;
        }
    };
    info!(%peer, "bridge client connected");
    let (mut sink, mut source) = socket.split();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ProcessEvent>();
    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event.to_json() {
                Ok(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode event"),
            }
        }
        let _ = sink.close().await;
    });

    let _ = event_tx.send(ProcessEvent::Ready {
        tab_id: None,
        process_id: None,
    });

    let mut units: HashMap<String, mpsc::UnboundedSender<ProcessCommand>> = HashMap::new();
    let mut tasks = JoinSet::new();

    while let Some(frame) = source.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(%peer, error = %e, "bridge receive failed");
                break;
            }
        };
        let command = match ProcessCommand::from_json(text.as_str()) {
            Ok(command) => command,
            Err(e) => {
                warn!(%peer, error = %e, "discarding undecodable command");
                continue;
            }
        };

        match command {
            ProcessCommand::Initialize { tab_id } => {
                let unit = units.entry(tab_id.clone()).or_insert_with(|| {
                    let (tx, rx) = mpsc::unbounded_channel();
                    let process_id = Uuid::new_v4().to_string();
                    let process = ContentProcess::new(&process_id, event_tx.clone(), timing);
                    tasks.spawn(process.run(rx));
                    debug!(%peer, tab_id = %tab_id, process_id = %process_id, "unit started");
                    tx
                });
                let _ = unit.send(ProcessCommand::Initialize { tab_id });
            }
            ProcessCommand::Shutdown { tab_id } => {
                if let Some(unit) = units.remove(&tab_id) {
                    let _ = unit.send(ProcessCommand::Shutdown { tab_id });
                }
            }
            other => match units.get(other.tab_id()) {
                Some(unit) => {
                    let _ = unit.send(other);
                }
                None => debug!(%peer, tab_id = other.tab_id(), "command for unknown tab"),
            },
        }
    }

    drop(units);
    tasks.shutdown().await;
    drop(event_tx);
    let _ = writer.await;
    info!(%peer, "bridge client disconnected");
}
