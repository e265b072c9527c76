use std::fmt::Write;
use std::time::Duration;

/// One completed (or failed) tool call, in the order it was issued.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub tool: String,
    pub server: String,
    pub input: serde_json::Value,
    pub output: String,
    pub success: bool,
    pub duration: Duration,
}

/// Render prior tool calls into text the planner can read back.
///
/// Failures are rendered alongside successes so the planner can route
/// around a broken tool instead of retrying it blindly.
#[must_use]
pub fn render_history(records: &[ToolCallRecord]) -> String {
    if records.is_empty() {
        return String::new();
    }

    let mut out = String::from("<tool_results>\n");
    for record in records {
        let status = if record.success { "ok" } else { "error" };
        let _ = writeln!(
            out,
            "  <result server=\"{}\" tool=\"{}\" status=\"{status}\">\n{}\n  </result>",
            record.server, record.tool, record.output,
        );
    }
    out.push_str("</tool_results>");
    out
}
