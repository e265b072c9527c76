use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinSet;

use crate::client::McpClient;
use crate::descriptor::ServerDescriptor;
use crate::error::McpError;
use crate::tool::McpTool;

const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_BACKOFF_BASE_MS: u64 = 500;

/// Outcome of a `connect` pass: which servers came up and which did not.
///
/// `failed` carries the last connection error per server so callers can
/// decide between failing fast and degrading.
#[derive(Debug, Default)]
pub struct ConnectReport {
    pub connected: Vec<String>,
    pub failed: Vec<(String, McpError)>,
}

impl ConnectReport {
    #[must_use]
    pub fn all_connected(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Owns server descriptors and live connections.
///
/// Registration and connection are separate steps: a registered server costs
/// nothing until a `connect` call names it.
pub struct McpManager {
    descriptors: RwLock<HashMap<String, ServerDescriptor>>,
    clients: RwLock<HashMap<String, McpClient>>,
}

impl std::fmt::Debug for McpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpManager").finish_non_exhaustive()
    }
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new()
    }
}

impl McpManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptors: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register a server under its descriptor name.
    ///
    /// The descriptor is validated here so a bad command, env var, or URL is
    /// rejected before anything is spawned.
    ///
    /// # Errors
    ///
    /// Returns `McpError::DuplicateServer` if the name is taken, or a
    /// validation error from [`ServerDescriptor::validate`].
    pub async fn register(&self, descriptor: ServerDescriptor) -> Result<(), McpError> {
        descriptor.validate()?;
        let mut descriptors = self.descriptors.write().await;
        if descriptors.contains_key(&descriptor.name) {
            return Err(McpError::DuplicateServer {
                server: descriptor.name,
            });
        }
        tracing::debug!(server = descriptor.name, "registered MCP server");
        descriptors.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Connect to the named subset of registered servers, concurrently.
    ///
    /// Every name is checked against the registry before any connection is
    /// attempted, so an unknown name leaves no new connections behind.
    /// Servers that are already connected are kept as-is. Each connection is
    /// retried with bounded exponential backoff; a server that still fails
    /// lands in the report's `failed` list rather than aborting the others.
    ///
    /// # Errors
    ///
    /// Returns `McpError::UnknownServer` if any name is not registered.
    pub async fn connect(&self, names: &[String]) -> Result<ConnectReport, McpError> {
        let to_connect: Vec<ServerDescriptor> = {
            let descriptors = self.descriptors.read().await;
            let clients = self.clients.read().await;

            let mut pending = Vec::new();
            for name in names {
                let descriptor =
                    descriptors
                        .get(name)
                        .ok_or_else(|| McpError::UnknownServer {
                            server: name.clone(),
                        })?;
                if !clients.contains_key(name) {
                    pending.push(descriptor.clone());
                }
            }
            pending
        };

        let mut report = ConnectReport::default();
        for name in names {
            if !to_connect.iter().any(|d| &d.name == name) {
                report.connected.push(name.clone());
            }
        }

        let mut join_set = JoinSet::new();
        for descriptor in to_connect {
            join_set.spawn(async move {
                let name = descriptor.name.clone();
                let result = connect_with_backoff(&descriptor).await;
                (name, result)
            });
        }

        // Drain before touching the clients lock; connections on open
        // servers keep working while these attempts retry.
        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let Ok(pair) = joined else {
                tracing::warn!("MCP connection task panicked");
                continue;
            };
            results.push(pair);
        }

        let mut clients = self.clients.write().await;
        for (name, connect_result) in results {
            match connect_result {
                Ok(client) => {
                    tracing::info!(server = name, "connected to MCP server");
                    clients.insert(name.clone(), client);
                    report.connected.push(name);
                }
                Err(e) => {
                    tracing::warn!(server = name, "MCP server connection failed: {e}");
                    report.failed.push((name, e));
                }
            }
        }

        Ok(report)
    }

    /// List tools exposed by one connected server.
    ///
    /// # Errors
    ///
    /// Returns `McpError::UnknownServer` if the server has no open
    /// connection, or `McpError::ToolListing` if the listing call fails.
    pub async fn list_tools(&self, server: &str) -> Result<Vec<McpTool>, McpError> {
        let clients = self.clients.read().await;
        let client = clients.get(server).ok_or_else(|| McpError::UnknownServer {
            server: server.into(),
        })?;
        client.list_tools().await
    }

    /// Route a tool call to the owning server's connection and return the
    /// text content of the result.
    ///
    /// # Errors
    ///
    /// Returns `McpError::UnknownServer` if the server has no open
    /// connection, or the call's own `Timeout`/`ToolCall` error.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        args: serde_json::Value,
    ) -> Result<String, McpError> {
        let clients = self.clients.read().await;
        let client = clients.get(server).ok_or_else(|| McpError::UnknownServer {
            server: server.into(),
        })?;
        client.call_tool(tool, args).await
    }

    /// Names of servers with an open connection.
    pub async fn open_servers(&self) -> Vec<String> {
        self.clients.read().await.keys().cloned().collect()
    }

    /// Graceful shutdown of every open connection. Idempotent; shutdown
    /// failures are logged, never surfaced.
    pub async fn close_all(&self) {
        let drained: Vec<(String, McpClient)> = {
            let mut clients = self.clients.write().await;
            clients.drain().collect()
        };
        for (name, client) in drained {
            tracing::info!(server = name, "shutting down MCP client");
            client.shutdown().await;
        }
    }
}

async fn connect_with_backoff(descriptor: &ServerDescriptor) -> Result<McpClient, McpError> {
    for attempt in 0..CONNECT_ATTEMPTS {
        match McpClient::connect(descriptor).await {
            Ok(client) => return Ok(client),
            Err(e) if attempt + 1 == CONNECT_ATTEMPTS => return Err(e),
            Err(e) => {
                let delay = Duration::from_millis(CONNECT_BACKOFF_BASE_MS << attempt);
                tracing::debug!(
                    server = descriptor.name,
                    attempt,
                    "connect failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    unreachable!("loop returns on last attempt")
}
