use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::AppState;

/// Event types for WebSocket messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DeploymentStarted,
    DeviceDeployed,
    DeviceFailed,
    DeploymentCompleted,
    GenerationFailed,
}

/// WebSocket event message
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: serde_json::Value,
}

/// Payload for per-run events
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentPayload {
    pub deployment_id: String,
    pub customer_name: String,
    pub devices: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload for per-device events
#[derive(Debug, Clone, Serialize)]
pub struct DevicePayload {
    pub deployment_id: String,
    pub customer_name: String,
    pub device_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload for generation failures (latched errors)
#[derive(Debug, Clone, Serialize)]
pub struct GenerationFailedPayload {
    pub customer_name: String,
    pub error_code: u16,
    pub error_message: String,
}

/// WebSocket hub manages connections and broadcasts events
pub struct Hub {
    tx: broadcast::Sender<String>,
    client_count: Arc<RwLock<usize>>,
}

impl Hub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            tx,
            client_count: Arc::new(RwLock::new(0)),
        }
    }

    /// Broadcast an event to all connected clients
    pub async fn broadcast_event(&self, event: Event) {
        let data = match serde_json::to_string(&event) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("Error serializing WebSocket event: {}", e);
                return;
            }
        };

        let count = *self.client_count.read().await;
        if count > 0 {
            if let Err(e) = self.tx.send(data) {
                tracing::warn!("Error broadcasting WebSocket event: {}", e);
            } else {
                tracing::debug!("Broadcasting {:?} to {} clients", event.event_type, count);
            }
        }
    }

    pub async fn broadcast_deployment(&self, event_type: EventType, payload: DeploymentPayload) {
        self.broadcast_event(Event {
            event_type,
            payload: serde_json::to_value(payload).unwrap_or_default(),
        })
        .await;
    }

    pub async fn broadcast_device(&self, event_type: EventType, payload: DevicePayload) {
        self.broadcast_event(Event {
            event_type,
            payload: serde_json::to_value(payload).unwrap_or_default(),
        })
        .await;
    }

    pub async fn broadcast_generation_failed(&self, customer: &str, error_code: u16, message: &str) {
        self.broadcast_event(Event {
            event_type: EventType::GenerationFailed,
            payload: serde_json::to_value(GenerationFailedPayload {
                customer_name: customer.to_string(),
                error_code,
                error_message: message.to_string(),
            })
            .unwrap_or_default(),
        })
        .await;
    }

    /// Get the number of connected clients
    pub async fn client_count(&self) -> usize {
        *self.client_count.read().await
    }

    /// Subscribe to events
    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    async fn increment_clients(&self) {
        let mut count = self.client_count.write().await;
        *count += 1;
        tracing::info!("WebSocket client connected. Total clients: {}", *count);
    }

    async fn decrement_clients(&self) {
        let mut count = self.client_count.write().await;
        *count = count.saturating_sub(1);
        tracing::info!("WebSocket client disconnected. Total clients: {}", *count);
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket handler for axum
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (mut sender, mut receiver) = socket.split();

    hub.increment_clients().await;
    let mut rx = hub.subscribe();

    let send_task = tokio::spawn(async move {
        while let Ok(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Drain client messages to keep the connection alive
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            if msg.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    hub.decrement_clients().await;
}
