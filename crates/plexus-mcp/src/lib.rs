//! MCP server lifecycle, connections, and the namespaced tool registry.

pub mod client;
pub mod descriptor;
pub mod error;
pub mod manager;
pub mod registry;
pub mod tool;

pub use client::McpClient;
pub use descriptor::{McpTransport, ServerDescriptor};
pub use error::McpError;
pub use manager::{ConnectReport, McpManager};
pub use registry::ToolRegistry;
pub use tool::McpTool;
