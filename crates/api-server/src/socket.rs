//! Socket.IO live-update channel
//!
//! Clients receive `agents:sync` on connect and every agent lifecycle event
//! (`agent:created`, `agent:started`, `agent:stopped`, `agent:error`) as it
//! happens.

use socketioxide::extract::{SocketRef, State};
use socketioxide::{SocketIo, TransportType};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use agent_runner::AgentEvent;

use crate::state::AppState;

/// Handle new socket connection
pub async fn on_connect(socket: SocketRef, State(state): State<AppState>) {
    info!("Client connected: {}", socket.id);

    send_sync(&socket, &state).await;

    socket.on(
        "agents:request-sync",
        |socket: SocketRef, State(state): State<AppState>| async move {
            send_sync(&socket, &state).await;
        },
    );

    socket.on_disconnect(|socket: SocketRef| async move {
        info!("Client disconnected: {}", socket.id);
    });
}

async fn send_sync(socket: &SocketRef, state: &AppState) {
    let agents = state.pool().list().await;
    if let Err(e) = socket.emit("agents:sync", &agents) {
        warn!("Failed to emit agents:sync: {}", e);
    }
}

/// Create the Socket.IO layer
pub fn create_socket_layer(state: AppState) -> (socketioxide::layer::SocketIoLayer, SocketIo) {
    let (layer, io) = SocketIo::builder()
        .with_state(state)
        .transports([TransportType::Websocket])
        .build_layer();

    io.ns("/", on_connect);

    (layer, io)
}

/// Forward pool events to every connected client until the publisher closes
pub fn spawn_event_bridge(io: SocketIo, mut events: broadcast::Receiver<AgentEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    debug!("Broadcasting {} for agent {}", event.name(), event.agent_id());
                    if let Err(e) = io.emit(event.name(), &event) {
                        warn!("Failed to broadcast {}: {}", event.name(), e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event bridge lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
