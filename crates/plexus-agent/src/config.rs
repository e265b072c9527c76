use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use plexus_mcp::ServerDescriptor;
use serde::Deserialize;

use crate::error::AgentError;
use crate::session::SessionConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentSettings,
    pub llm: LlmSettings,
    pub mcp: McpSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_rounds: u32,
    pub call_timeout_secs: u64,
    pub fail_fast_on_connect: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_rounds: 12,
            call_timeout_secs: 30,
            fail_fast_on_connect: true,
        }
    }
}

impl AgentSettings {
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_rounds: self.max_rounds,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            fail_fast_on_connect: self.fail_fast_on_connect,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.fireworks.ai/inference/v1".into(),
            model: "accounts/fireworks/models/llama-v3p1-70b-instruct".into(),
            max_tokens: 2048,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct McpSettings {
    pub servers: Vec<ServerSettings>,
}

/// One server entry from the config file. Exactly one of `command` (stdio)
/// or `url` (Streamable HTTP) must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub name: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl ServerSettings {
    /// Turn the config entry into a connectable descriptor, resolving
    /// `$VAR` placeholders in env values against credentials and the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Configuration` for a missing placeholder value
    /// or an entry that does not pick exactly one transport.
    pub fn to_descriptor(&self, credentials: &Credentials) -> Result<ServerDescriptor, AgentError> {
        let descriptor = match (&self.command, &self.url) {
            (Some(command), None) => {
                let mut env = HashMap::with_capacity(self.env.len());
                for (key, value) in &self.env {
                    env.insert(key.clone(), resolve_placeholder(value, credentials)?);
                }
                ServerDescriptor::stdio(&self.name, command, self.args.clone(), env)
            }
            (None, Some(url)) => ServerDescriptor::http(&self.name, url),
            _ => {
                return Err(AgentError::Configuration(format!(
                    "server '{}' must set exactly one of `command` or `url`",
                    self.name
                )));
            }
        };
        Ok(descriptor.with_timeout(Duration::from_secs(self.timeout_secs)))
    }
}

fn resolve_placeholder(value: &str, credentials: &Credentials) -> Result<String, AgentError> {
    let Some(var) = value.strip_prefix('$') else {
        return Ok(value.to_owned());
    };

    let resolved = match var {
        "GITHUB_TOKEN" => credentials.github_token.clone(),
        "LLM_API_KEY" => credentials.llm_api_key.clone(),
        other => std::env::var(other).ok().filter(|v| !v.is_empty()),
    };

    resolved.ok_or_else(|| {
        AgentError::Configuration(format!("required environment variable {var} is not set"))
    })
}

impl Config {
    /// Load from a TOML file, falling back to defaults when the file does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Configuration` if the file exists but cannot be
    /// read or parsed.
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            let mut config = Self::default();
            config.apply_env_overrides();
            return Ok(config);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|e| {
            AgentError::Configuration(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("PLEXUS_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("PLEXUS_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(rounds) = lookup("PLEXUS_MAX_ROUNDS")
            && let Ok(rounds) = rounds.parse()
        {
            self.agent.max_rounds = rounds;
        }
        if let Some(secs) = lookup("PLEXUS_CALL_TIMEOUT_SECS")
            && let Ok(secs) = secs.parse()
        {
            self.agent.call_timeout_secs = secs;
        }
    }
}

/// Secrets pulled from the environment once, at startup, so the rest of the
/// code never reads `std::env` for credentials.
#[derive(Clone, Default)]
pub struct Credentials {
    pub github_token: Option<String>,
    pub llm_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("github_token", &self.github_token.as_ref().map(|_| "<redacted>"))
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Read `GITHUB_TOKEN` (falling back to `GITHUB_PAT`) and
    /// `PLEXUS_LLM_API_KEY` (falling back to `FIREWORKS_API_KEY`).
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            github_token: lookup("GITHUB_TOKEN").or_else(|| lookup("GITHUB_PAT")),
            llm_api_key: lookup("PLEXUS_LLM_API_KEY").or_else(|| lookup("FIREWORKS_API_KEY")),
        }
    }
}
