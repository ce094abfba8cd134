//! Connector lifecycle events.
//!
//! The bus is an ordinary value: create it where the process starts, hand
//! references to whatever publishes or listens, drop it at shutdown.

use tokio::sync::broadcast;
use tracing::debug;

use crate::model::{ConnectorKind, SyncResult};

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorEvent {
    Connected {
        connector_id: String,
        kind: ConnectorKind,
    },
    SyncCompleted {
        connector_id: String,
        result: SyncResult,
    },
    SyncFailed {
        connector_id: String,
        message: String,
    },
    Disconnected {
        connector_id: String,
    },
}

impl ConnectorEvent {
    pub fn connector_id(&self) -> &str {
        match self {
            ConnectorEvent::Connected { connector_id, .. }
            | ConnectorEvent::SyncCompleted { connector_id, .. }
            | ConnectorEvent::SyncFailed { connector_id, .. }
            | ConnectorEvent::Disconnected { connector_id } => connector_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ConnectorEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers. Returns how many received it; an
    /// event with no listeners is dropped.
    pub fn publish(&self, event: ConnectorEvent) -> usize {
        match self.sender.send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(event)) => {
                debug!("No subscribers for event from '{}'", event.connector_id());
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
