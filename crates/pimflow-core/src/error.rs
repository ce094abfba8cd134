//! Typed errors shared by every connector.

use thiserror::Error;

/// Errors a connector operation can return to its caller.
///
/// Per-record failures during a sync are not represented here; they are
/// collected as [`crate::SyncError`] values in the result instead.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The source is unreachable, malformed or missing required settings.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A data-accessing operation was called before `connect()`.
    #[error("connector '{0}' is not connected")]
    NotConnected(String),

    /// The factory was given a type tag it does not know.
    #[error("unsupported connector type: {0}")]
    UnsupportedConnectorType(String),

    /// A remote tool or resource call failed.
    #[error("tool invocation failed: {0}")]
    ToolInvocation(String),

    /// A remote HTTP source answered with a non-success status.
    #[error("HTTP {status}: {text}")]
    Http { status: u16, text: String },

    /// Declared in configuration but not implemented yet.
    #[error("{0} is not yet supported")]
    Unsupported(String),

    /// Connect did not finish within the caller's deadline.
    #[error("connection timed out after {0} ms")]
    Timeout(u64),
}

impl ConnectorError {
    pub fn connection(msg: impl Into<String>) -> Self {
        ConnectorError::Connection(msg.into())
    }

    pub fn tool(msg: impl Into<String>) -> Self {
        ConnectorError::ToolInvocation(msg.into())
    }

    /// True for failures that leave the connector unconnected.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            ConnectorError::Connection(_)
                | ConnectorError::Http { .. }
                | ConnectorError::Timeout(_)
                | ConnectorError::Unsupported(_)
        )
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Why a single record could not be projected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("cannot read '{segment}' of path '{path}': parent value is missing or not a container")]
    Unresolvable { path: String, segment: String },

    #[error("unknown transform '{0}'")]
    UnknownTransform(String),

    #[error("transform '{transform}' cannot be applied to {value}")]
    TransformFailed { transform: String, value: String },
}
