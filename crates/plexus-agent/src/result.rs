use std::time::Duration;

use crate::history::ToolCallRecord;

/// Outcome of one processed query.
///
/// `tool_calls` lists every call issued while answering, successes and
/// failures alike, in issue order. `processing_time` is wall-clock from
/// query receipt to response assembly.
#[derive(Debug)]
pub struct QueryResult {
    pub response: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub processing_time: Duration,
}
