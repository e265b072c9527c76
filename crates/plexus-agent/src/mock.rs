//! Test-only mock provider and planner.

use std::sync::{Arc, Mutex};

use plexus_mcp::McpTool;

use crate::error::LlmError;
use crate::history::ToolCallRecord;
use crate::planner::{PlanStep, Planner};
use crate::provider::{LlmProvider, Message};

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    pub fail_chat: bool,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            fail_chat: false,
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }
}

impl LlmProvider for MockProvider {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }
}

/// Scripted planner: returns the queued steps in order, then keeps
/// responding with `default_step`.
#[derive(Debug, Clone)]
pub struct MockPlanner {
    steps: Arc<Mutex<Vec<PlanStep>>>,
    pub default_step: PlanStep,
    pub fail_plan: bool,
    /// Milliseconds to sleep before returning a step.
    pub delay_ms: u64,
}

impl Default for MockPlanner {
    fn default() -> Self {
        Self {
            steps: Arc::new(Mutex::new(Vec::new())),
            default_step: PlanStep::Respond("mock answer".into()),
            fail_plan: false,
            delay_ms: 0,
        }
    }
}

impl MockPlanner {
    #[must_use]
    pub fn with_steps(steps: Vec<PlanStep>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_plan: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }
}

impl Planner for MockPlanner {
    async fn plan(
        &self,
        _query: &str,
        _history: &[ToolCallRecord],
        _tools: &[McpTool],
    ) -> Result<PlanStep, LlmError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_plan {
            return Err(LlmError::Other("mock planner error".into()));
        }
        let mut steps = self.steps.lock().unwrap();
        if steps.is_empty() {
            Ok(self.default_step.clone())
        } else {
            Ok(steps.remove(0))
        }
    }
}
