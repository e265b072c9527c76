use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use plexus_agent::{Config, Credentials, LlmPlanner, OpenAiProvider, initialize_agent};
use plexus_mcp::McpManager;

#[derive(Debug, Parser)]
#[command(name = "plexus", version, about = "Multi-server MCP query agent")]
struct Cli {
    /// The question to answer.
    query: String,

    /// Comma-separated server names to connect; defaults to every
    /// configured server.
    #[arg(long, value_delimiter = ',')]
    servers: Vec<String>,

    /// Path to the TOML config file.
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let credentials = Credentials::from_env();

    let manager = Arc::new(McpManager::new());
    let mut server_names = Vec::with_capacity(config.mcp.servers.len());
    let mut github_in_play = false;
    for settings in &config.mcp.servers {
        let descriptor = settings.to_descriptor(&credentials)?;
        github_in_play |= settings.env.values().any(|v| v == "$GITHUB_TOKEN");
        manager.register(descriptor).await?;
        server_names.push(settings.name.clone());
    }

    let selected = if cli.servers.is_empty() {
        server_names
    } else {
        cli.servers.clone()
    };

    if github_in_play {
        let token = credentials
            .github_token
            .as_deref()
            .context("GITHUB_TOKEN (or GITHUB_PAT) must be set for GitHub-backed servers")?;
        probe_github(token).await?;
    }

    let api_key = credentials.llm_api_key.clone().unwrap_or_default();
    let provider = OpenAiProvider::new(
        api_key,
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.max_tokens,
    );
    let planner = LlmPlanner::new(provider);

    let init = initialize_agent(
        manager.clone(),
        &selected,
        planner,
        config.agent.session_config(),
    )
    .await;
    let session = match init {
        Ok(session) => session,
        Err(e) => {
            // Connections opened before the failure must still be torn down.
            manager.close_all().await;
            return Err(e.into());
        }
    };
    tracing::info!(tools = session.tools().len(), "agent initialized");

    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            cancel.cancel();
        }
    });

    let run = session.process_query(&cli.query).await;
    manager.close_all().await;
    let result = run?;

    println!("{}", result.response);
    if !result.tool_calls.is_empty() {
        println!("\nTool calls:");
        for record in &result.tool_calls {
            let status = if record.success { "ok" } else { "failed" };
            println!("  {} ({}) [{status}]", record.tool, record.server);
        }
    }
    println!(
        "\nProcessed in {:.2}s",
        result.processing_time.as_secs_f64()
    );

    Ok(())
}

/// Verify the GitHub token against the API before spending any connection
/// effort on a server that would fail authentication anyway.
async fn probe_github(token: &str) -> anyhow::Result<()> {
    let client = plexus_agent::openai::default_client();
    let response = client
        .get("https://api.github.com/user")
        .header("Authorization", format!("token {token}"))
        .header("Accept", "application/vnd.github.v3+json")
        .send()
        .await
        .context("GitHub API is unreachable")?;

    let status = response.status();
    if !status.is_success() {
        bail!("GitHub authentication failed (status {status})");
    }

    let body: serde_json::Value = response.json().await.context("invalid GitHub response")?;
    if let Some(login) = body.get("login").and_then(|v| v.as_str()) {
        tracing::info!(login, "GitHub authentication verified");
    }
    Ok(())
}
