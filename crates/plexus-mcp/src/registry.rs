use std::collections::HashMap;

use crate::error::McpError;
use crate::manager::McpManager;
use crate::tool::McpTool;

/// Tool catalog keyed by `(server, tool)` so the same tool name on two
/// servers stays unambiguous.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<(String, String), McpTool>,
    by_name: HashMap<String, Vec<String>>,
}

impl ToolRegistry {
    /// Build a registry from an already-collected tool list. Later entries
    /// for the same `(server, tool)` pair replace earlier ones.
    #[must_use]
    pub fn from_tools(tools: Vec<McpTool>) -> Self {
        let mut registry = Self::default();
        for tool in tools {
            registry.insert(tool);
        }
        registry
    }

    /// Build a registry by listing tools on every named server.
    ///
    /// # Errors
    ///
    /// Returns `McpError::ToolListing` (or `McpError::UnknownServer`) if any
    /// server's listing fails; a partial catalog would silently hide tools,
    /// so discovery is all-or-nothing.
    pub async fn discover(manager: &McpManager, servers: &[String]) -> Result<Self, McpError> {
        let mut registry = Self::default();
        for server in servers {
            for tool in manager.list_tools(server).await? {
                registry.insert(tool);
            }
        }
        tracing::debug!(tools = registry.len(), "tool registry built");
        Ok(registry)
    }

    fn insert(&mut self, tool: McpTool) {
        let owners = self.by_name.entry(tool.name.clone()).or_default();
        if !owners.contains(&tool.server) {
            owners.push(tool.server.clone());
            owners.sort();
        }
        self.tools
            .insert((tool.server.clone(), tool.name.clone()), tool);
    }

    /// Resolve a tool name, with an optional server hint.
    ///
    /// Without a hint the name must be owned by exactly one server. With a
    /// hint, only that server's catalog is consulted.
    ///
    /// # Errors
    ///
    /// Returns `McpError::UnknownTool` if no server owns the name (or the
    /// hinted server does not), and `McpError::AmbiguousTool` if more than
    /// one server owns it and no hint was given.
    pub fn resolve(&self, tool: &str, server_hint: Option<&str>) -> Result<&McpTool, McpError> {
        if let Some(server) = server_hint {
            return self
                .tools
                .get(&(server.to_owned(), tool.to_owned()))
                .ok_or_else(|| McpError::UnknownTool { tool: tool.into() });
        }

        let owners = self
            .by_name
            .get(tool)
            .filter(|o| !o.is_empty())
            .ok_or_else(|| McpError::UnknownTool { tool: tool.into() })?;

        if owners.len() > 1 {
            return Err(McpError::AmbiguousTool {
                tool: tool.into(),
                servers: owners.join(", "),
            });
        }

        self.tools
            .get(&(owners[0].clone(), tool.to_owned()))
            .ok_or_else(|| McpError::UnknownTool { tool: tool.into() })
    }

    /// All tools in the catalog, in unspecified order.
    pub fn tools(&self) -> impl Iterator<Item = &McpTool> {
        self.tools.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
