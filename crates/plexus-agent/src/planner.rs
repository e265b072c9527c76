use std::fmt::Write;

use plexus_mcp::McpTool;
use serde::Deserialize;

use crate::error::LlmError;
use crate::history::{ToolCallRecord, render_history};
use crate::provider::{LlmProvider, Message, Role};

/// One tool invocation the planner wants executed. `server` is an optional
/// hint; without it the registry must resolve the name unambiguously.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ToolRequest {
    #[serde(default)]
    pub server: Option<String>,
    pub tool: String,
    #[serde(default = "default_args")]
    pub args: serde_json::Value,
}

fn default_args() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// What the planner decided for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStep {
    /// Execute these calls, then plan again with their results.
    Call(Vec<ToolRequest>),
    /// Done; this is the final answer.
    Respond(String),
}

pub trait Planner: Send + Sync {
    /// Decide the next step for a query given prior tool results and the
    /// available tool catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the planning backend fails.
    fn plan(
        &self,
        query: &str,
        history: &[ToolCallRecord],
        tools: &[McpTool],
    ) -> impl Future<Output = Result<PlanStep, LlmError>> + Send;
}

const PLANNER_INSTRUCTIONS: &str = "\
You are a tool-using assistant. To call a tool, emit one or more fenced blocks \
tagged `mcp`, each containing a single JSON object as shown in the tool's \
invocation example. Omit the `server` field only when the tool name is unique. \
When you have enough information, answer in plain text with no mcp blocks.";

/// Planner backed by an LLM chat provider.
///
/// The system prompt advertises the tool catalog; the model requests calls
/// via fenced ```mcp blocks and ends the conversation by answering without
/// any.
#[derive(Debug, Clone)]
pub struct LlmPlanner<P> {
    provider: P,
}

impl<P: LlmProvider> LlmPlanner<P> {
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: LlmProvider> Planner for LlmPlanner<P> {
    async fn plan(
        &self,
        query: &str,
        history: &[ToolCallRecord],
        tools: &[McpTool],
    ) -> Result<PlanStep, LlmError> {
        let mut system = String::from(PLANNER_INSTRUCTIONS);
        let tools_prompt = format_tools_prompt(tools);
        if !tools_prompt.is_empty() {
            system.push_str("\n\n");
            system.push_str(&tools_prompt);
        }

        let mut messages = vec![
            Message::new(Role::System, system),
            Message::new(Role::User, query),
        ];

        let rendered = render_history(history);
        if !rendered.is_empty() {
            messages.push(Message::new(Role::User, rendered));
        }

        let response = self.provider.chat(&messages).await?;
        Ok(parse_plan(&response))
    }
}

#[must_use]
pub fn format_tools_prompt(tools: &[McpTool]) -> String {
    if tools.is_empty() {
        return String::new();
    }

    let mut out = String::from("<available_tools>\n");
    for tool in tools {
        let _ = writeln!(
            out,
            "  <tool server=\"{server}\" name=\"{name}\">\n\
             \x20   <description>{desc}</description>\n\
             \x20   <parameters>{schema}</parameters>\n\
             \x20   <invocation>\n\
             ```mcp\n\
             {{\"server\": \"{server}\", \"tool\": \"{name}\", \"args\": {{...}}}}\n\
             ```\n\
             \x20   </invocation>\n\
             \x20 </tool>",
            server = tool.server,
            name = tool.name,
            desc = tool.description,
            schema = tool.input_schema,
        );
    }
    out.push_str("</available_tools>");
    out
}

/// Interpret an assistant response: fenced mcp blocks become tool requests,
/// anything without a valid block is the final answer. Malformed blocks are
/// skipped so one bad block does not discard the rest of the response.
fn parse_plan(response: &str) -> PlanStep {
    let blocks = extract_fenced_blocks(response, "mcp");

    let mut requests = Vec::with_capacity(blocks.len());
    for block in &blocks {
        match serde_json::from_str::<ToolRequest>(block) {
            Ok(request) => requests.push(request),
            Err(e) => {
                tracing::warn!("skipping malformed mcp block: {e}");
            }
        }
    }

    if requests.is_empty() {
        PlanStep::Respond(response.trim().to_owned())
    } else {
        PlanStep::Call(requests)
    }
}

fn extract_fenced_blocks(text: &str, tag: &str) -> Vec<String> {
    let open = format!("```{tag}");
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        match current {
            Some(ref mut buf) => {
                if trimmed == "```" {
                    blocks.push(std::mem::take(buf));
                    current = None;
                } else {
                    buf.push_str(line);
                    buf.push('\n');
                }
            }
            None => {
                if trimmed == open {
                    current = Some(String::new());
                }
            }
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;

    fn tool(server: &str, name: &str) -> McpTool {
        McpTool {
            server: server.into(),
            name: name.into(),
            description: format!("{name} tool"),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn empty_tools_prompt_is_empty() {
        assert!(format_tools_prompt(&[]).is_empty());
    }

    #[test]
    fn tools_prompt_contains_invocation_example() {
        let prompt = format_tools_prompt(&[tool("github_server", "list_repositories")]);
        assert!(prompt.starts_with("<available_tools>"));
        assert!(prompt.ends_with("</available_tools>"));
        assert!(prompt.contains("server=\"github_server\""));
        assert!(prompt.contains("name=\"list_repositories\""));
        assert!(prompt.contains("```mcp"));
    }

    #[test]
    fn extract_single_block() {
        let text = "Calling:\n```mcp\n{\"tool\":\"t\"}\n```\nDone";
        let blocks = extract_fenced_blocks(text, "mcp");
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].contains("\"tool\""));
    }

    #[test]
    fn extract_ignores_other_fences() {
        let text = "```bash\necho hi\n```";
        assert!(extract_fenced_blocks(text, "mcp").is_empty());
    }

    #[test]
    fn extract_multiple_blocks() {
        let text = "```mcp\n{\"tool\":\"a\"}\n```\nand\n```mcp\n{\"tool\":\"b\"}\n```";
        assert_eq!(extract_fenced_blocks(text, "mcp").len(), 2);
    }

    #[test]
    fn unclosed_block_is_dropped() {
        let text = "```mcp\n{\"tool\":\"a\"}";
        assert!(extract_fenced_blocks(text, "mcp").is_empty());
    }

    #[test]
    fn plain_text_is_respond() {
        let step = parse_plan("The answer is 42.");
        assert_eq!(step, PlanStep::Respond("The answer is 42.".into()));
    }

    #[test]
    fn valid_block_is_call() {
        let step = parse_plan(
            "```mcp\n{\"server\": \"github_server\", \"tool\": \"list_repositories\"}\n```",
        );
        match step {
            PlanStep::Call(requests) => {
                assert_eq!(requests.len(), 1);
                assert_eq!(requests[0].tool, "list_repositories");
                assert_eq!(requests[0].server.as_deref(), Some("github_server"));
                assert!(requests[0].args.as_object().unwrap().is_empty());
            }
            PlanStep::Respond(_) => panic!("expected Call"),
        }
    }

    #[test]
    fn block_without_server_hint() {
        let step = parse_plan("```mcp\n{\"tool\": \"search\", \"args\": {\"q\": \"rust\"}}\n```");
        match step {
            PlanStep::Call(requests) => {
                assert!(requests[0].server.is_none());
                assert_eq!(requests[0].args["q"], "rust");
            }
            PlanStep::Respond(_) => panic!("expected Call"),
        }
    }

    #[test]
    fn malformed_block_skipped_valid_kept() {
        let step = parse_plan(
            "```mcp\nnot json\n```\n```mcp\n{\"tool\": \"good\"}\n```",
        );
        match step {
            PlanStep::Call(requests) => {
                assert_eq!(requests.len(), 1);
                assert_eq!(requests[0].tool, "good");
            }
            PlanStep::Respond(_) => panic!("expected Call"),
        }
    }

    #[test]
    fn only_malformed_blocks_is_respond() {
        let step = parse_plan("```mcp\nnot json\n```");
        assert!(matches!(step, PlanStep::Respond(_)));
    }

    #[tokio::test]
    async fn llm_planner_respond_path() {
        let provider = MockProvider::with_responses(vec!["Final answer.".into()]);
        let planner = LlmPlanner::new(provider);
        let step = planner.plan("question", &[], &[]).await.unwrap();
        assert_eq!(step, PlanStep::Respond("Final answer.".into()));
    }

    #[tokio::test]
    async fn llm_planner_call_path() {
        let provider = MockProvider::with_responses(vec![
            "```mcp\n{\"server\": \"s\", \"tool\": \"t\"}\n```".into(),
        ]);
        let planner = LlmPlanner::new(provider);
        let step = planner
            .plan("question", &[], &[tool("s", "t")])
            .await
            .unwrap();
        assert!(matches!(step, PlanStep::Call(ref r) if r.len() == 1));
    }

    #[tokio::test]
    async fn llm_planner_propagates_provider_error() {
        let planner = LlmPlanner::new(MockProvider::failing());
        assert!(planner.plan("q", &[], &[]).await.is_err());
    }
}
