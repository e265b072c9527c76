use std::borrow::Cow;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use rmcp::ServiceExt;
use rmcp::model::{CallToolRequestParams, RawContent};
use rmcp::service::RunningService;
use rmcp::transport::TokioChildProcess;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransport;
use tokio::process::Command;
use url::Url;

use crate::descriptor::{McpTransport, ServerDescriptor};
use crate::error::McpError;
use crate::tool::McpTool;

type ClientService = RunningService<rmcp::RoleClient, ()>;

/// A live connection to one MCP server.
///
/// Calls on a single connection are serialized through an internal gate;
/// concurrency across servers happens at the manager level.
pub struct McpClient {
    server: String,
    service: Arc<ClientService>,
    timeout: Duration,
    call_gate: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("server", &self.server)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl McpClient {
    /// Establish a connection per the descriptor's transport and complete
    /// the MCP handshake.
    ///
    /// HTTP URLs are SSRF-validated before any connection is attempted.
    ///
    /// # Errors
    ///
    /// Returns `McpError::Connection` if the process cannot be spawned, the
    /// connection fails, or the handshake fails; `McpError::InvalidUrl` or
    /// `McpError::PrivateAddress` for a rejected HTTP URL.
    pub async fn connect(descriptor: &ServerDescriptor) -> Result<Self, McpError> {
        let service = match &descriptor.transport {
            McpTransport::Stdio { command, args, env } => {
                let mut cmd = Command::new(command);
                cmd.args(args);
                for (k, v) in env {
                    cmd.env(k, v);
                }

                let transport = TokioChildProcess::new(cmd).map_err(|e| McpError::Connection {
                    server: descriptor.name.clone(),
                    message: e.to_string(),
                })?;

                ().serve(transport)
                    .await
                    .map_err(|e| McpError::Connection {
                        server: descriptor.name.clone(),
                        message: e.to_string(),
                    })?
            }
            McpTransport::Http { url } => {
                validate_url_ssrf(url).await?;
                let transport = StreamableHttpClientTransport::from_uri(url.clone());

                ().serve(transport)
                    .await
                    .map_err(|e| McpError::Connection {
                        server: descriptor.name.clone(),
                        message: e.to_string(),
                    })?
            }
        };

        Ok(Self {
            server: descriptor.name.clone(),
            service: Arc::new(service),
            timeout: descriptor.timeout,
            call_gate: tokio::sync::Mutex::new(()),
        })
    }

    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Call tools/list and convert the results to `McpTool`.
    ///
    /// # Errors
    ///
    /// Returns `McpError::ToolListing` if listing fails.
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let tools = self
            .service
            .list_all_tools()
            .await
            .map_err(|e| McpError::ToolListing {
                server: self.server.clone(),
                message: e.to_string(),
            })?;

        Ok(tools
            .into_iter()
            .map(|t| McpTool {
                server: self.server.clone(),
                name: t.name.to_string(),
                description: t.description.map_or_else(String::new, |d| d.to_string()),
                input_schema: serde_json::to_value(&*t.input_schema).unwrap_or_default(),
            })
            .collect())
    }

    /// Call tools/call and return the concatenated text content.
    ///
    /// A result flagged `is_error` by the server is surfaced as
    /// `McpError::ToolCall` with the text content as the message.
    ///
    /// # Errors
    ///
    /// Returns `McpError::Timeout` or `McpError::ToolCall` on failure.
    pub async fn call_tool(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<String, McpError> {
        let arguments: Option<serde_json::Map<String, serde_json::Value>> = args
            .as_object()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect());

        let params = CallToolRequestParams {
            name: Cow::Owned(name.to_owned()),
            arguments,
            task: None,
            meta: None,
        };

        let _gate = self.call_gate.lock().await;

        let result = tokio::time::timeout(self.timeout, self.service.call_tool(params))
            .await
            .map_err(|_| McpError::Timeout {
                server: self.server.clone(),
                tool: name.into(),
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|e| McpError::ToolCall {
                server: self.server.clone(),
                tool: name.into(),
                message: e.to_string(),
            })?;

        let text: String = result
            .content
            .iter()
            .filter_map(|c| match &c.raw {
                RawContent::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error.unwrap_or(false) {
            return Err(McpError::ToolCall {
                server: self.server.clone(),
                tool: name.into(),
                message: if text.is_empty() {
                    "tool reported an error".into()
                } else {
                    text
                },
            });
        }

        Ok(text)
    }

    /// Graceful shutdown. Consumes the client so a closed connection cannot
    /// be reused.
    pub async fn shutdown(self) {
        match Arc::try_unwrap(self.service) {
            Ok(service) => {
                let _ = service.cancel().await;
            }
            Err(_arc) => {
                tracing::warn!(
                    server = self.server,
                    "cannot shutdown: service has multiple references"
                );
            }
        }
    }
}

fn is_private_ip(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(ip) => {
            ip.is_loopback()              // 127.0.0.0/8
                || ip.is_private()        // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
                || ip.is_link_local()     // 169.254.0.0/16
                || ip.is_unspecified()    // 0.0.0.0
                || ip.is_broadcast() // 255.255.255.255
        }
        IpAddr::V6(ip) => {
            ip.is_loopback()               // ::1
                || ip.is_unspecified()     // ::
                || ip.to_ipv4_mapped().is_some_and(|v4| {
                    v4.is_loopback() || v4.is_private() || v4.is_link_local()
                })                         // ::ffff:127.0.0.1 etc.
                || (ip.segments()[0] & 0xfe00) == 0xfc00   // fc00::/7 unique local
                || (ip.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10 link-local
        }
    }
}

async fn validate_url_ssrf(url: &str) -> Result<(), McpError> {
    let parsed = Url::parse(url).map_err(|e| McpError::InvalidUrl {
        url: url.into(),
        message: e.to_string(),
    })?;

    let host = parsed.host_str().ok_or_else(|| McpError::InvalidUrl {
        url: url.into(),
        message: "missing host".into(),
    })?;

    let port = parsed.port_or_known_default().unwrap_or(443);
    let addr_str = format!("{host}:{port}");

    let addrs = tokio::net::lookup_host(&addr_str)
        .await
        .map_err(|e| McpError::InvalidUrl {
            url: url.into(),
            message: format!("DNS resolution failed: {e}"),
        })?;

    for sock_addr in addrs {
        if is_private_ip(sock_addr.ip()) {
            return Err(McpError::PrivateAddress {
                url: url.into(),
                addr: sock_addr.ip().to_string(),
            });
        }
    }

    Ok(())
}
