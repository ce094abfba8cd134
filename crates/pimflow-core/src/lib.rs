//! pimflow core - shared types for the connector subsystem
//!
//! Value types (schemas, mappings, sync results), schema inference, record
//! projection and the typed error taxonomy used by every connector.

pub mod error;
pub mod events;
pub mod inference;
pub mod mapping;
pub mod model;
pub mod sync;

pub use error::{ConnectorError, ConnectorResult, MappingError};
pub use events::{ConnectorEvent, EventBus};
pub use inference::{infer_schema, infer_schema_from_first, infer_type};
pub use mapping::{project_record, resolve_path, Transform};
pub use model::{
    ConnectorConfig, ConnectorKind, FieldMapping, FieldType, Record, Schema, SchemaField,
    SyncError, SyncResult,
};
pub use sync::{DiscardSink, RecordSink, SyncTracker};
