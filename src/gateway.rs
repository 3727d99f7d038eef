//! Console Gateway
//!
//! Interactive multi-session console. Each session owns its own agent and
//! conversation history; all sessions share the experience memory and the
//! reward store, which tolerate concurrent writers through their append and
//! atomic-rename contracts.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use dialoguer::Input;

use crate::agent::Agent;
use crate::backend::{Backend, OllamaClient};
use crate::config::AgentConfig;
use crate::memory::ExperienceMemory;
use crate::rewards::RewardStore;

const HELP: &str = "\
Commands:
  /help            show this help
  /new <name>      create a session and switch to it
  /switch <name>   switch to an existing session
  /list            list sessions
  /reset           clear the active session's history
  /rewards         show the reward total
  /exit            quit
Anything else runs as a task in the active session.";

pub struct Gateway {
    config: Arc<AgentConfig>,
    backend: Arc<dyn Backend>,
    memory: Arc<ExperienceMemory>,
    rewards: Arc<RewardStore>,
    sessions: HashMap<String, Agent>,
    active: String,
}

impl Gateway {
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let backend: Arc<dyn Backend> = Arc::new(OllamaClient::new(
            &config.backend_url,
            &config.model,
            &config.embedding_model,
            config.request_timeout_secs,
        ));
        let memory = Arc::new(ExperienceMemory::new(
            backend.clone(),
            config.memory_path.clone(),
            config.memory_max_entries,
        ));
        let rewards = Arc::new(RewardStore::new(config.rewards_path.clone()));

        let mut gateway = Self {
            config,
            backend,
            memory,
            rewards,
            sessions: HashMap::new(),
            active: "main".to_string(),
        };
        gateway.create_session("main")?;
        Ok(gateway)
    }

    fn create_session(&mut self, name: &str) -> Result<()> {
        let agent = Agent::with_parts(
            self.config.clone(),
            self.backend.clone(),
            self.memory.clone(),
            self.rewards.clone(),
        )?;
        self.sessions.insert(name.to_string(), agent);
        Ok(())
    }

    /// Read/eval loop. Returns when the user exits.
    pub async fn run(&mut self) -> Result<()> {
        println!("{}", "acorn gateway".bold());
        println!("{}", "Type /help for commands.".dimmed());

        loop {
            let line: String = Input::new()
                .with_prompt(format!("{}", self.active.cyan()))
                .allow_empty(true)
                .interact_text()?;
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            if let Some(command) = line.strip_prefix('/') {
                if !self.handle_command(command) {
                    break;
                }
                continue;
            }

            let agent = self
                .sessions
                .get_mut(&self.active)
                .ok_or_else(|| anyhow::anyhow!("active session vanished"))?;
            let answer = agent.run(line).await;
            println!("\n{}\n", answer.white());
        }

        Ok(())
    }

    /// Handle one slash command. Returns false when the gateway should exit.
    fn handle_command(&mut self, command: &str) -> bool {
        let mut parts = command.splitn(2, ' ');
        let verb = parts.next().unwrap_or("");
        let arg = parts.next().unwrap_or("").trim();

        match verb {
            "help" => println!("{}", HELP),
            "new" => {
                if arg.is_empty() {
                    println!("{}", "Usage: /new <name>".yellow());
                } else if self.sessions.contains_key(arg) {
                    println!("{}", format!("Session '{}' already exists.", arg).yellow());
                } else {
                    match self.create_session(arg) {
                        Ok(()) => {
                            self.active = arg.to_string();
                            println!("Created and switched to '{}'.", arg.green());
                        }
                        Err(e) => println!("{}", format!("Failed to create session: {:#}", e).red()),
                    }
                }
            }
            "switch" => {
                if self.sessions.contains_key(arg) {
                    self.active = arg.to_string();
                    println!("Switched to '{}'.", arg.green());
                } else {
                    println!("{}", format!("No session named '{}'.", arg).yellow());
                }
            }
            "list" => {
                let mut names: Vec<&String> = self.sessions.keys().collect();
                names.sort();
                for name in names {
                    let marker = if *name == self.active { "*" } else { " " };
                    let turns = self.sessions[name].history().len();
                    println!("{} {} ({} messages)", marker, name, turns);
                }
            }
            "reset" => {
                if let Some(agent) = self.sessions.get_mut(&self.active) {
                    agent.reset();
                    println!("History cleared for '{}'.", self.active);
                }
            }
            "rewards" => {
                println!("Total rewards: {}", self.rewards.total().to_string().green());
            }
            "exit" | "quit" => {
                println!("Bye.");
                return false;
            }
            other => {
                println!("{}", format!("Unknown command: /{}", other).yellow());
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway_at(dir: &std::path::Path) -> Gateway {
        let config = AgentConfig {
            workspace_root: dir.join("workspace"),
            memory_path: dir.join("state/memory.jsonl"),
            rewards_path: dir.join("state/rewards"),
            ..AgentConfig::default()
        };
        Gateway::new(config).unwrap()
    }

    #[test]
    fn test_starts_with_main_session() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_at(dir.path());
        assert!(gateway.sessions.contains_key("main"));
        assert_eq!(gateway.active, "main");
    }

    #[test]
    fn test_new_and_switch_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let mut gateway = gateway_at(dir.path());

        assert!(gateway.handle_command("new builds"));
        assert_eq!(gateway.active, "builds");
        assert_eq!(gateway.sessions.len(), 2);

        assert!(gateway.handle_command("switch main"));
        assert_eq!(gateway.active, "main");

        // Switching to a missing session keeps the current one.
        assert!(gateway.handle_command("switch nope"));
        assert_eq!(gateway.active, "main");
    }

    #[test]
    fn test_duplicate_session_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut gateway = gateway_at(dir.path());
        assert!(gateway.handle_command("new main"));
        assert_eq!(gateway.sessions.len(), 1);
    }

    #[test]
    fn test_exit_stops_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut gateway = gateway_at(dir.path());
        assert!(gateway.handle_command("help"));
        assert!(gateway.handle_command("unknown"));
        assert!(!gateway.handle_command("exit"));
    }
}
