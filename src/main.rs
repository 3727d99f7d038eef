//! Acorn - Local Agent Runtime
//!
//! Entry point. Parses the CLI, initializes logging, and dispatches to the
//! one-shot runner, the interactive gateway, or the status probe.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use acorn::agent::Agent;
use acorn::backend::OllamaClient;
use acorn::config::{resolve_path, AgentConfig};
use acorn::gateway::Gateway;
use acorn::rewards::RewardStore;

#[derive(Parser)]
#[command(name = "acorn", version, about = "Local tool-calling agent on Ollama")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single task to completion and print the answer
    Run {
        /// The task to perform
        task: String,
        /// Chat model to use
        #[arg(long)]
        model: Option<String>,
        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f32>,
        /// Iteration budget for the loop
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Workspace directory (defaults to the current directory)
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Start the interactive multi-session console
    Gateway,
    /// Show configuration and probe the backend
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "acorn=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            task,
            model,
            temperature,
            max_iterations,
            workspace,
        } => {
            let mut config = AgentConfig::from_env();
            if let Some(model) = model {
                config.model = model;
            }
            if let Some(t) = temperature {
                config.temperature = t;
            }
            if let Some(n) = max_iterations {
                config.max_iterations = n;
            }
            if let Some(ws) = workspace {
                config.workspace_root = resolve_path(&ws).into();
            }

            let mut agent = Agent::new(config)?;
            let answer = agent.run(&task).await;
            println!("{}", answer);
        }
        Command::Gateway => {
            let mut gateway = Gateway::new(AgentConfig::from_env())?;
            gateway.run().await?;
        }
        Command::Status => {
            status(AgentConfig::from_env()).await;
        }
    }

    Ok(())
}

async fn status(config: AgentConfig) {
    println!("{}", "acorn status".bold());
    println!("  backend:    {}", config.backend_url);
    println!("  model:      {}", config.model);
    println!("  embeddings: {}", config.embedding_model);
    println!("  workspace:  {}", config.workspace_root.display());
    println!("  memory:     {}", config.memory_path.display());
    println!("  rewards:    {}", RewardStore::new(config.rewards_path.clone()).total());

    let client = OllamaClient::new(
        &config.backend_url,
        &config.model,
        &config.embedding_model,
        config.request_timeout_secs,
    );
    let preflight = client.preflight().await;

    if !preflight.reachable {
        println!("  backend:    {}", "unreachable".red());
        return;
    }
    println!("  backend:    {}", "reachable".green());
    if preflight.model_available {
        println!("  model:      {}", "available".green());
    } else {
        println!(
            "  model:      {} (pulled: {})",
            "not pulled".yellow(),
            preflight.available_models.join(", ")
        );
    }
}
