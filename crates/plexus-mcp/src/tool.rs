use serde::{Deserialize, Serialize};

/// One tool as advertised by one server. Tool names are unique only within
/// their owning server, so the server name travels with the descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub server: String,
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl McpTool {
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.server, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tool(server: &str, name: &str) -> McpTool {
        McpTool {
            server: server.into(),
            name: name.into(),
            description: "test tool".into(),
            input_schema: serde_json::json!({}),
        }
    }

    #[test]
    fn qualified_name_format() {
        let tool = make_tool("github_server", "list_repositories");
        assert_eq!(tool.qualified_name(), "github_server:list_repositories");
    }

    #[test]
    fn tool_roundtrip_json() {
        let tool = make_tool("jira_server", "create_ticket");
        let json = serde_json::to_string(&tool).unwrap();
        let parsed: McpTool = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.server, "jira_server");
        assert_eq!(parsed.name, "create_ticket");
    }

    #[test]
    fn same_name_different_servers_have_distinct_qualified_names() {
        let a = make_tool("github_server", "search");
        let b = make_tool("jira_server", "search");
        assert_ne!(a.qualified_name(), b.qualified_name());
    }
}
