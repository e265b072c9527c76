//! End-to-end checks over the public crate APIs: server registration and
//! lifecycle, config wiring, and the full planning loop against mocks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use plexus_agent::mock::MockPlanner;
use plexus_agent::{
    AgentSession, Config, Credentials, PlanStep, SessionConfig, ToolRequest, initialize_agent,
};
use plexus_mcp::{McpError, McpManager, McpTool, ServerDescriptor, ToolRegistry};

fn stdio_descriptor(name: &str) -> ServerDescriptor {
    ServerDescriptor::stdio(
        name,
        "npx",
        vec!["-y".into(), "@modelcontextprotocol/server-github".into()],
        HashMap::new(),
    )
}

#[tokio::test]
async fn register_connect_close_lifecycle() {
    let manager = McpManager::new();
    manager
        .register(stdio_descriptor("github_server"))
        .await
        .unwrap();
    manager
        .register(stdio_descriptor("jira_server"))
        .await
        .unwrap();

    let err = manager
        .register(stdio_descriptor("github_server"))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::DuplicateServer { .. }));

    // Unknown name in the selection fails before anything connects.
    let err = manager
        .connect(&["github_server".into(), "nope".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::UnknownServer { ref server } if server == "nope"));
    assert!(manager.open_servers().await.is_empty());

    manager.close_all().await;
    manager.close_all().await;
}

#[tokio::test]
async fn initialize_agent_fails_fast_on_unknown_server() {
    let manager = Arc::new(McpManager::new());
    manager
        .register(stdio_descriptor("github_server"))
        .await
        .unwrap();

    let result = initialize_agent(
        manager.clone(),
        &["unregistered".into()],
        MockPlanner::default(),
        SessionConfig::default(),
    )
    .await;

    assert!(result.is_err());
    assert!(manager.open_servers().await.is_empty());
}

/// Allowlisted command, but the process exits before the MCP handshake, so
/// the connection can never come up.
fn failing_descriptor(name: &str) -> ServerDescriptor {
    ServerDescriptor::stdio(
        name,
        "python3",
        vec!["-c".into(), "import sys; sys.exit(1)".into()],
        HashMap::new(),
    )
}

#[tokio::test]
async fn initialize_agent_degrades_past_failed_connections() {
    let manager = Arc::new(McpManager::new());
    manager.register(failing_descriptor("flaky_server")).await.unwrap();

    let config = SessionConfig {
        fail_fast_on_connect: false,
        ..SessionConfig::default()
    };
    let session = initialize_agent(
        manager.clone(),
        &["flaky_server".into()],
        MockPlanner::default(),
        config,
    )
    .await
    .unwrap();

    // The session runs with whatever connected, which here is nothing.
    assert!(session.tools().is_empty());
    assert!(manager.open_servers().await.is_empty());
}

#[tokio::test]
async fn failed_initialization_leaves_manager_closeable() {
    let manager = Arc::new(McpManager::new());
    manager.register(failing_descriptor("flaky_server")).await.unwrap();

    let result = initialize_agent(
        manager.clone(),
        &["flaky_server".into()],
        MockPlanner::default(),
        SessionConfig::default(),
    )
    .await;
    assert!(result.is_err());

    // The caller's error path tears everything down.
    manager.close_all().await;
    assert!(manager.open_servers().await.is_empty());
}

#[test]
fn default_config_file_parses() {
    let config = Config::load(Path::new("config/default.toml")).unwrap();
    assert_eq!(config.agent.max_rounds, 12);
    assert_eq!(config.mcp.servers.len(), 1);

    let github = &config.mcp.servers[0];
    assert_eq!(github.name, "github_server");
    assert_eq!(github.command.as_deref(), Some("npx"));

    let credentials = Credentials {
        github_token: Some("ghp_test".into()),
        llm_api_key: None,
    };
    let descriptor = github.to_descriptor(&credentials).unwrap();
    descriptor.validate().unwrap();
}

fn github_tool(name: &str) -> McpTool {
    McpTool {
        server: "github_server".into(),
        name: name.into(),
        description: format!("{name} on GitHub"),
        input_schema: serde_json::json!({"type": "object"}),
    }
}

struct ScriptedDispatcher;

impl plexus_agent::ToolDispatcher for ScriptedDispatcher {
    async fn call_tool(
        &self,
        _server: &str,
        tool: &str,
        _args: serde_json::Value,
    ) -> Result<String, McpError> {
        Ok(format!("{tool} output"))
    }
}

#[tokio::test]
async fn query_flow_with_scripted_planner() {
    let registry = ToolRegistry::from_tools(vec![
        github_tool("list_repositories"),
        github_tool("create_issue"),
    ]);
    let planner = MockPlanner::with_steps(vec![
        PlanStep::Call(vec![ToolRequest {
            server: Some("github_server".into()),
            tool: "list_repositories".into(),
            args: serde_json::json!({}),
        }]),
        PlanStep::Respond("Here are your repositories.".into()),
    ]);
    let session = AgentSession::new(
        ScriptedDispatcher,
        registry,
        planner,
        SessionConfig::default(),
    );

    let result = session.process_query("list all repos").await.unwrap();
    assert_eq!(result.response, "Here are your repositories.");
    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(result.tool_calls[0].tool, "list_repositories");
    assert_eq!(result.tool_calls[0].server, "github_server");
    assert!(result.tool_calls[0].success);
}
