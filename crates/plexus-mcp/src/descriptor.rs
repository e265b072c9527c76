use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use crate::error::McpError;

const ALLOWED_COMMANDS: &[&str] = &[
    "npx", "uvx", "node", "python3", "python", "docker", "deno", "bun",
];

const BLOCKED_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "LD_PROFILE",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "DYLD_FRAMEWORK_PATH",
    "DYLD_FALLBACK_LIBRARY_PATH",
    "BASH_ENV",
    "ENV",
    "CDPATH",
    "GLOBIGNORE",
    "PYTHONPATH",
    "PYTHONSTARTUP",
    "RUBYLIB",
    "RUBYOPT",
    "NODE_OPTIONS",
    "NODE_PATH",
    "PERL5LIB",
    "PERL5OPT",
    "JAVA_TOOL_OPTIONS",
];

/// How to reach one MCP server.
#[derive(Debug, Clone)]
pub enum McpTransport {
    /// Spawn a child process and speak MCP over stdio.
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    /// Connect to a remote server over Streamable HTTP.
    Http { url: String },
}

/// Everything needed to connect to one server, validated at registration
/// time so a bad entry is rejected before anything is spawned.
#[derive(Debug, Clone)]
pub struct ServerDescriptor {
    pub name: String,
    pub transport: McpTransport,
    pub timeout: Duration,
    /// Commands allowed in addition to the built-in allowlist.
    pub extra_allowed_commands: Vec<String>,
}

impl ServerDescriptor {
    #[must_use]
    pub fn stdio(
        name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        env: HashMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            transport: McpTransport::Stdio {
                command: command.into(),
                args,
                env,
            },
            timeout: Duration::from_secs(30),
            extra_allowed_commands: Vec::new(),
        }
    }

    #[must_use]
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: McpTransport::Http { url: url.into() },
            timeout: Duration::from_secs(30),
            extra_allowed_commands: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check the descriptor against the command allowlist, env blocklist,
    /// and URL syntax.
    ///
    /// # Errors
    ///
    /// Returns `McpError::CommandNotAllowed`, `McpError::EnvVarBlocked`, or
    /// `McpError::InvalidUrl` if the descriptor cannot be used safely.
    pub fn validate(&self) -> Result<(), McpError> {
        match &self.transport {
            McpTransport::Stdio { command, env, .. } => {
                validate_command(command, &self.extra_allowed_commands)?;
                validate_env(env)
            }
            McpTransport::Http { url } => {
                Url::parse(url).map_err(|e| McpError::InvalidUrl {
                    url: url.clone(),
                    message: e.to_string(),
                })?;
                Ok(())
            }
        }
    }
}

/// Rejects commands containing path separators to prevent symlink-based bypasses.
fn validate_command(command: &str, extra_allowed: &[String]) -> Result<(), McpError> {
    if command.contains('/') || command.contains('\\') {
        return Err(McpError::CommandNotAllowed {
            command: command.into(),
        });
    }

    let allowed =
        ALLOWED_COMMANDS.contains(&command) || extra_allowed.iter().any(|c| c == command);

    if !allowed {
        return Err(McpError::CommandNotAllowed {
            command: command.into(),
        });
    }

    Ok(())
}

fn validate_env(env: &HashMap<String, String>) -> Result<(), McpError> {
    for key in env.keys() {
        if BLOCKED_ENV_VARS.contains(&key.as_str()) || key.starts_with("BASH_FUNC_") {
            return Err(McpError::EnvVarBlocked { var: key.clone() });
        }
    }
    Ok(())
}
