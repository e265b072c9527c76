use plexus_mcp::McpError;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Mcp(#[from] McpError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("query cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcp_error_display_is_transparent() {
        let err = AgentError::from(McpError::UnknownServer {
            server: "missing".into(),
        });
        assert_eq!(err.to_string(), "server 'missing' is not registered");
    }

    #[test]
    fn configuration_error_display() {
        let err = AgentError::Configuration("GITHUB_TOKEN not set".into());
        assert_eq!(err.to_string(), "configuration error: GITHUB_TOKEN not set");
    }

    #[test]
    fn cancelled_display() {
        assert_eq!(AgentError::Cancelled.to_string(), "query cancelled");
    }

    #[test]
    fn llm_error_converts() {
        let err = AgentError::from(LlmError::RateLimited);
        assert_eq!(err.to_string(), "rate limited");
    }
}
