#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("connection failed for server '{server}': {message}")]
    Connection { server: String, message: String },

    #[error("tool listing failed for server '{server}': {message}")]
    ToolListing { server: String, message: String },

    #[error("tool call failed: {server}/{tool}: {message}")]
    ToolCall {
        server: String,
        tool: String,
        message: String,
    },

    #[error("tool call timed out after {timeout_secs}s: {server}/{tool}")]
    Timeout {
        server: String,
        tool: String,
        timeout_secs: u64,
    },

    #[error("server '{server}' is not registered")]
    UnknownServer { server: String },

    #[error("server '{server}' is already registered")]
    DuplicateServer { server: String },

    #[error("no selected server exposes tool '{tool}'")]
    UnknownTool { tool: String },

    #[error("tool '{tool}' is exposed by multiple servers ({servers}); a server hint is required")]
    AmbiguousTool { tool: String, servers: String },

    #[error("command '{command}' is not allowed for MCP servers")]
    CommandNotAllowed { command: String },

    #[error("environment variable '{var}' is blocked for MCP servers")]
    EnvVarBlocked { var: String },

    #[error("invalid server URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("blocked connection to '{url}': resolves to private address {addr}")]
    PrivateAddress { url: String, addr: String },
}
