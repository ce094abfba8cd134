//! One-shot sync of a stored connector configuration.

use std::time::Duration;

use pimflow_core::{
    ConnectorConfig, ConnectorEvent, ConnectorResult, EventBus, FieldMapping, RecordSink,
    SyncResult,
};
use tracing::{info, warn};

use crate::connect_with_timeout;
use crate::factory::{default_registry, ConnectorRegistry};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds, connects, syncs and disconnects a connector in one call.
pub struct SyncRunner {
    registry: ConnectorRegistry,
    connect_timeout: Duration,
    bus: Option<EventBus>,
}

impl Default for SyncRunner {
    fn default() -> Self {
        Self::new(default_registry())
    }
}

impl SyncRunner {
    pub fn new(registry: ConnectorRegistry) -> Self {
        Self {
            registry,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            bus: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    fn publish(&self, event: ConnectorEvent) {
        if let Some(bus) = &self.bus {
            bus.publish(event);
        }
    }

    /// Run a full sync of `config`. The connector is always disconnected
    /// before this returns.
    pub async fn run(
        &self,
        config: &ConnectorConfig,
        mapping: &[FieldMapping],
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<SyncResult> {
        let mut connector = self.registry.from_config(config)?;

        let connected =
            connect_with_timeout(connector.as_mut(), &config.config, self.connect_timeout).await;
        if let Err(e) = connected {
            warn!("Connector '{}' failed to connect: {}", config.name, e);
            self.publish(ConnectorEvent::SyncFailed {
                connector_id: config.id.clone(),
                message: e.to_string(),
            });
            return Err(e);
        }
        self.publish(ConnectorEvent::Connected {
            connector_id: config.id.clone(),
            kind: connector.kind(),
        });

        let outcome = connector.sync_into(mapping, sink).await;
        connector.disconnect().await;

        match &outcome {
            Ok(result) => {
                info!(
                    "Sync of '{}' finished: {} processed, {} failed",
                    config.name, result.records_processed, result.records_failed
                );
                self.publish(ConnectorEvent::SyncCompleted {
                    connector_id: config.id.clone(),
                    result: result.clone(),
                });
            }
            Err(e) => {
                warn!("Sync of '{}' failed: {}", config.name, e);
                self.publish(ConnectorEvent::SyncFailed {
                    connector_id: config.id.clone(),
                    message: e.to_string(),
                });
            }
        }
        self.publish(ConnectorEvent::Disconnected {
            connector_id: config.id.clone(),
        });

        outcome
    }
}
