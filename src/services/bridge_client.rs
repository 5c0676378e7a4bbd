//! WebSocket bridge to an external rendering backend.
//!
//! One `BridgeClient` owns one connection shared by every tab. Outbound
//! commands are JSON text frames; inbound events are routed to the tab they
//! name. A dropped connection is retried at a fixed interval until the
//! attempt budget runs out, after which the bridge gives up and drops commands.
//! After a reconnect every routed tab is initialized again; its history on
//! the backend starts over.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::services::process_launcher::{
    EventEmitter, EventSink, LaunchContext, ProcessLauncher, UnitTask,
};
use crate::types::errors::{BridgeError, ContentProcessError};
use crate::types::protocol::{ProcessCommand, ProcessEvent};
use crate::types::settings::BridgeSettings;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Routes = Arc<RwLock<HashMap<String, (u64, EventSink)>>>;

/// Connection state of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Connecting,
    Connected,
    /// Waiting to retry after `attempt` consecutive failures.
    Reconnecting { attempt: u32 },
    /// The attempt budget is spent; commands are dropped from now on.
    GaveUp,
}

/// Handle to the shared bridge connection.
#[derive(Clone)]
pub struct BridgeClient {
    outbound: mpsc::UnboundedSender<String>,
    routes: Routes,
    next_route: Arc<AtomicU64>,
    state: watch::Receiver<BridgeState>,
}

impl BridgeClient {
    /// Starts the connection task. Returns immediately; watch `state_changes`
    /// to learn when the socket is up.
    pub fn connect(settings: &BridgeSettings) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(BridgeState::Connecting);
        let routes: Routes = Arc::new(RwLock::new(HashMap::new()));

        tokio::spawn(connection_loop(
            settings.clone(),
            outbound_rx,
            routes.clone(),
            state_tx,
        ));

        Self {
            outbound: outbound_tx,
            routes,
            next_route: Arc::new(AtomicU64::new(0)),
            state: state_rx,
        }
    }

    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<BridgeState> {
        self.state.clone()
    }

    /// Sends a command to the backend. Dropped silently once the bridge gave up.
    pub fn send(&self, command: &ProcessCommand) -> Result<(), ContentProcessError> {
        if self.state() == BridgeState::GaveUp {
            debug!(command = command.kind(), tab_id = command.tab_id(), "bridge gave up; dropping command");
            return Ok(());
        }
        let text = command.to_json()?;
        if self.outbound.send(text).is_err() {
            debug!(command = command.kind(), "bridge connection task is gone; dropping command");
        }
        Ok(())
    }

    /// Routes events naming `tab_id` to `sink` until the guard is dropped.
    pub fn register_route(&self, tab_id: &str, sink: EventSink) -> RouteGuard {
        let id = self.next_route.fetch_add(1, Ordering::Relaxed);
        self.routes.write().insert(tab_id.to_string(), (id, sink));
        RouteGuard {
            tab_id: tab_id.to_string(),
            id,
            routes: self.routes.clone(),
        }
    }

    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }
}

/// Unregisters a tab route on drop, unless a newer route replaced it.
pub struct RouteGuard {
    tab_id: String,
    id: u64,
    routes: Routes,
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        let mut routes = self.routes.write();
        if routes.get(&self.tab_id).map(|(id, _)| *id) == Some(self.id) {
            routes.remove(&self.tab_id);
        }
    }
}

async fn connection_loop(
    settings: BridgeSettings,
    mut outbound: mpsc::UnboundedReceiver<String>,
    routes: Routes,
    state: watch::Sender<BridgeState>,
) {
    let mut failures: u32 = 0;
    // Tabs routed when the last connection dropped; the backend forgot them.
    let mut orphaned: Vec<String> = Vec::new();
    loop {
        match open(&settings.endpoint).await {
            Ok(socket) => {
                failures = 0;
                state.send_replace(BridgeState::Connected);
                info!(endpoint = %settings.endpoint, resumed = orphaned.len(), "bridge connected");
                let resumed = std::mem::take(&mut orphaned);
                if pump(socket, &resumed, &mut outbound, &routes).await == PumpEnd::ClientDropped {
                    return;
                }
                orphaned = routes.read().keys().cloned().collect();
                warn!(endpoint = %settings.endpoint, "bridge connection lost");
            }
            Err(e) => {
                warn!(endpoint = %settings.endpoint, attempt = failures + 1, error = %e, "bridge connection failed");
            }
        }

        failures += 1;
        if failures >= settings.max_reconnect_attempts {
            error!(
                endpoint = %settings.endpoint,
                attempts = failures,
                "bridge unreachable; giving up"
            );
            state.send_replace(BridgeState::GaveUp);
            while outbound.recv().await.is_some() {
                debug!("bridge gave up; dropping queued command");
            }
            return;
        }
        state.send_replace(BridgeState::Reconnecting { attempt: failures });
        tokio::time::sleep(settings.reconnect_interval()).await;
    }
}

async fn open(endpoint: &str) -> Result<Socket, BridgeError> {
    let (socket, _) = connect_async(endpoint)
        .await
        .map_err(|e| BridgeError::WebSocket(e.to_string()))?;
    Ok(socket)
}

#[derive(Debug, PartialEq, Eq)]
enum PumpEnd {
    ConnectionLost,
    ClientDropped,
}

async fn pump(
    socket: Socket,
    resumed: &[String],
    outbound: &mut mpsc::UnboundedReceiver<String>,
    routes: &Routes,
) -> PumpEnd {
    let (mut sink, mut stream) = socket.split();
    // Re-initialize before anything queued so the backend knows the tab again.
    if let Err(e) = resume_routes(&mut sink, resumed, routes).await {
        warn!(error = %e, "bridge resume failed");
        return PumpEnd::ConnectionLost;
    }
    loop {
        tokio::select! {
            text = outbound.recv() => match text {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        warn!(error = %e, "bridge send failed");
                        return PumpEnd::ConnectionLost;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return PumpEnd::ClientDropped;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => route_event(routes, text.as_str()),
                Some(Ok(Message::Close(_))) | None => return PumpEnd::ConnectionLost,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "bridge receive failed");
                    return PumpEnd::ConnectionLost;
                }
            },
        }
    }
}

async fn resume_routes(
    sink: &mut SplitSink<Socket, Message>,
    tab_ids: &[String],
    routes: &Routes,
) -> Result<(), BridgeError> {
    for tab_id in tab_ids {
        let routed = routes.read().contains_key(tab_id);
        if !routed {
            continue;
        }
        let command = ProcessCommand::Initialize {
            tab_id: tab_id.clone(),
        };
        let text = command.to_json()?;
        sink.send(Message::Text(text.into()))
            .await
            .map_err(|e| BridgeError::WebSocket(e.to_string()))?;
        debug!(tab_id = %tab_id, "re-initialized tab on the backend");
    }
    Ok(())
}

fn route_event(routes: &Routes, text: &str) {
    let event = match ProcessEvent::from_json(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "discarding undecodable bridge frame");
            return;
        }
    };
    let Some(tab_id) = event.tab_id() else {
        debug!(event_type = %event.event_type(), "bridge backend handshake");
        return;
    };
    let sink = routes.read().get(tab_id).map(|(_, sink)| sink.clone());
    match sink {
        Some(sink) => {
            sink.emit(event);
        }
        None => debug!(tab_id, "no route for bridge event"),
    }
}

/// Runs each unit remotely: a local relay task forwards its commands over
/// the shared bridge and receives its events through a tab route.
#[derive(Clone)]
pub struct BridgeLauncher {
    client: BridgeClient,
}

impl BridgeLauncher {
    pub fn new(client: BridgeClient) -> Self {
        Self { client }
    }
}

impl ProcessLauncher for BridgeLauncher {
    fn launch(&self, context: LaunchContext) -> UnitTask {
        tokio::spawn(relay(self.client.clone(), context))
    }
}

async fn relay(client: BridgeClient, context: LaunchContext) -> Result<(), ContentProcessError> {
    let LaunchContext {
        process_id,
        mut commands,
        events,
    } = context;
    let mut route: Option<RouteGuard> = None;

    while let Some(command) = commands.recv().await {
        if let ProcessCommand::Initialize { tab_id } = &command {
            if route.is_none() {
                route = Some(client.register_route(tab_id, events.clone()));
            }
        }
        let shutdown = matches!(command, ProcessCommand::Shutdown { .. });
        client.send(&command)?;
        if shutdown {
            break;
        }
    }
    debug!(process_id = %process_id, "bridge relay stopped");
    Ok(())
}
