use std::sync::Arc;
use std::time::{Duration, Instant};

use plexus_mcp::{McpError, McpManager, McpTool, ToolRegistry};
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::history::ToolCallRecord;
use crate::planner::{PlanStep, Planner, ToolRequest};
use crate::result::QueryResult;

/// Per-session knobs. Defaults match the config file defaults.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on planning rounds per query.
    pub max_rounds: u32,
    /// Session-level timeout applied to each tool call.
    pub call_timeout: Duration,
    /// Whether a failed server connection aborts initialization or just
    /// degrades the tool catalog.
    pub fail_fast_on_connect: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_rounds: 12,
            call_timeout: Duration::from_secs(30),
            fail_fast_on_connect: true,
        }
    }
}

/// Where tool calls go at execution time. `Arc<McpManager>` is the real
/// implementation; tests substitute their own.
pub trait ToolDispatcher: Send + Sync {
    /// Execute one tool call and return its text output.
    ///
    /// # Errors
    ///
    /// Returns the dispatch or call error.
    fn call_tool(
        &self,
        server: &str,
        tool: &str,
        args: serde_json::Value,
    ) -> impl Future<Output = Result<String, McpError>> + Send;
}

impl ToolDispatcher for Arc<McpManager> {
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        args: serde_json::Value,
    ) -> Result<String, McpError> {
        McpManager::call_tool(self, server, tool, args).await
    }
}

/// One query-processing session over a fixed tool catalog.
///
/// Queries are serialized: concurrent `process_query` calls queue on an
/// internal gate rather than interleaving rounds.
pub struct AgentSession<P, D = Arc<McpManager>> {
    dispatcher: D,
    registry: ToolRegistry,
    tools: Vec<McpTool>,
    planner: P,
    config: SessionConfig,
    cancel: CancellationToken,
    query_gate: tokio::sync::Mutex<()>,
}

impl<P, D> std::fmt::Debug for AgentSession<P, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("tools", &self.tools.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Connect to the named servers, build the tool catalog, and open a session.
///
/// With `fail_fast_on_connect` set, any connection failure aborts; otherwise
/// failures are logged and the session runs with whatever connected.
///
/// # Errors
///
/// Returns the first connection error when failing fast, or any tool-listing
/// error from catalog discovery.
pub async fn initialize_agent<P: Planner>(
    manager: Arc<McpManager>,
    servers: &[String],
    planner: P,
    config: SessionConfig,
) -> Result<AgentSession<P>, AgentError> {
    let mut report = manager.connect(servers).await?;

    if !report.all_connected() {
        if config.fail_fast_on_connect
            && let Some((_, err)) = report.failed.pop()
        {
            return Err(err.into());
        }
        for (name, err) in &report.failed {
            tracing::warn!(server = name, "continuing without server: {err}");
        }
    }

    let registry = ToolRegistry::discover(&manager, &report.connected).await?;
    Ok(AgentSession::new(manager, registry, planner, config))
}

impl<P: Planner, D: ToolDispatcher> AgentSession<P, D> {
    #[must_use]
    pub fn new(dispatcher: D, registry: ToolRegistry, planner: P, config: SessionConfig) -> Self {
        let tools: Vec<McpTool> = registry.tools().cloned().collect();
        Self {
            dispatcher,
            registry,
            tools,
            planner,
            config,
            cancel: CancellationToken::new(),
            query_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Token that cancels in-flight queries when triggered.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Tools visible to the planner.
    #[must_use]
    pub fn tools(&self) -> &[McpTool] {
        &self.tools
    }

    /// Run the planning loop for one query.
    ///
    /// Alternates planning and tool execution until the planner answers or
    /// `max_rounds` is reached. Individual tool failures are recorded and
    /// fed back to the planner rather than aborting the query. Cancellation
    /// mid-query yields a partial result carrying the calls completed so
    /// far.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Cancelled` if cancellation was requested before
    /// any work started, or an LLM error if planning itself fails.
    pub async fn process_query(&self, query: &str) -> Result<QueryResult, AgentError> {
        let _gate = self.query_gate.lock().await;

        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let start = Instant::now();
        let mut records: Vec<ToolCallRecord> = Vec::new();

        for round in 0..self.config.max_rounds {
            tracing::debug!(round, calls = records.len(), "planning round");

            let step = tokio::select! {
                () = self.cancel.cancelled() => {
                    return Ok(cancelled_result(records, start));
                }
                step = self.planner.plan(query, &records, &self.tools) => step?,
            };

            match step {
                PlanStep::Respond(response) => {
                    return Ok(QueryResult {
                        response,
                        tool_calls: records,
                        processing_time: start.elapsed(),
                    });
                }
                PlanStep::Call(requests) => {
                    let round_records = tokio::select! {
                        () = self.cancel.cancelled() => {
                            return Ok(cancelled_result(records, start));
                        }
                        round_records = self.execute_round(requests) => round_records,
                    };
                    records.extend(round_records);
                }
            }
        }

        tracing::warn!(
            max_rounds = self.config.max_rounds,
            "round limit reached without a final answer"
        );
        Ok(QueryResult {
            response: round_limit_summary(&records),
            tool_calls: records,
            processing_time: start.elapsed(),
        })
    }

    /// Resolve and execute one round of requests concurrently. Records come
    /// back in issue order; resolution failures become failed records so the
    /// planner sees them next round.
    async fn execute_round(&self, requests: Vec<ToolRequest>) -> Vec<ToolCallRecord> {
        let calls = requests.into_iter().map(|request| async move {
            let resolved = self
                .registry
                .resolve(&request.tool, request.server.as_deref());
            let (server, tool) = match resolved {
                Ok(t) => (t.server.clone(), t.name.clone()),
                Err(e) => {
                    tracing::warn!(tool = request.tool, "tool resolution failed: {e}");
                    return ToolCallRecord {
                        tool: request.tool,
                        server: request.server.unwrap_or_default(),
                        input: request.args,
                        output: e.to_string(),
                        success: false,
                        duration: Duration::ZERO,
                    };
                }
            };

            let started = Instant::now();
            let outcome = tokio::time::timeout(
                self.config.call_timeout,
                self.dispatcher.call_tool(&server, &tool, request.args.clone()),
            )
            .await;

            let (output, success) = match outcome {
                Ok(Ok(text)) => (text, true),
                Ok(Err(e)) => {
                    tracing::warn!(server, tool, "tool call failed: {e}");
                    (e.to_string(), false)
                }
                Err(_) => {
                    let e = McpError::Timeout {
                        server: server.clone(),
                        tool: tool.clone(),
                        timeout_secs: self.config.call_timeout.as_secs(),
                    };
                    tracing::warn!(server, tool, "tool call failed: {e}");
                    (e.to_string(), false)
                }
            };

            ToolCallRecord {
                tool,
                server,
                input: request.args,
                output,
                success,
                duration: started.elapsed(),
            }
        });

        futures::future::join_all(calls).await
    }
}

fn cancelled_result(records: Vec<ToolCallRecord>, start: Instant) -> QueryResult {
    QueryResult {
        response: format!(
            "Query cancelled after {} tool call(s).",
            records.len()
        ),
        tool_calls: records,
        processing_time: start.elapsed(),
    }
}

fn round_limit_summary(records: &[ToolCallRecord]) -> String {
    let succeeded = records.iter().filter(|r| r.success).count();
    format!(
        "Reached the planning round limit before finishing. {succeeded} of {} tool call(s) succeeded; results so far are recorded in the call history.",
        records.len()
    )
}
