//! MCP (Model Context Protocol) tool connector.
//!
//! Layout:
//!   types.rs     - config, tool/resource descriptors
//!   rpc.rs       - newline-delimited JSON-RPC 2.0 channel
//!   client.rs    - server process lifecycle + MCP methods
//!   connector.rs - `Connector` implementation

pub mod client;
pub mod connector;
pub mod rpc;
pub mod types;

pub use client::McpClient;
pub use connector::McpConnector;
pub use rpc::{RpcChannel, RpcError};
pub use types::{McpConfig, McpResource, McpTool};
