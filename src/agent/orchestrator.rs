//! Agent Orchestrator
//!
//! The reason/act loop: feed the history to the model, execute the tool
//! calls it requests through the boundary, audit each result, and feed the
//! outcome back until the model answers in plain text or the iteration
//! budget runs out. Tool calls run strictly in request order; the loop
//! itself does nothing but route.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::backend::{Backend, OllamaClient};
use crate::config::AgentConfig;
use crate::memory::ExperienceMemory;
use crate::reflection::Reflector;
use crate::rewards::RewardStore;
use crate::tools::{tool_schemas, ToolExecutor};
use crate::types::{ChatMessage, ToolResult};

use super::context::{render_memories, workspace_summary};
use super::system_prompt::system_prompt_for;

pub struct Agent {
    config: Arc<AgentConfig>,
    backend: Arc<dyn Backend>,
    executor: ToolExecutor,
    reflector: Reflector,
    memory: Arc<ExperienceMemory>,
    rewards: Arc<RewardStore>,
    messages: Vec<ChatMessage>,
}

impl Agent {
    /// Build a self-contained agent talking to a real Ollama backend.
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate().context("Invalid agent configuration")?;
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

        Self::with_parts(config, backend, memory, rewards)
    }

    /// Build an agent from pre-wired parts. Sessions in the gateway share
    /// the memory and reward stores this way; tests inject a scripted
    /// backend.
    pub fn with_parts(
        config: Arc<AgentConfig>,
        backend: Arc<dyn Backend>,
        memory: Arc<ExperienceMemory>,
        rewards: Arc<RewardStore>,
    ) -> Result<Self> {
        let executor = ToolExecutor::new(config.clone())?;
        let reflector = Reflector::new(backend.clone(), config.clone());
        Ok(Self {
            config,
            backend,
            executor,
            reflector,
            memory,
            rewards,
            messages: Vec::new(),
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Drop the conversation history. Memory and rewards persist.
    pub fn reset(&mut self) {
        self.messages.clear();
    }

    /// Run one task to completion. Every outcome is text: the model's final
    /// answer, a backend failure notice, or the iteration-limit sentinel.
    pub async fn run(&mut self, task: &str) -> String {
        info!(task, "starting task");

        let user_content = self.build_task_message(task).await;
        self.messages.push(ChatMessage::user(user_content));

        let system = ChatMessage::system(system_prompt_for(self.rewards.total()));
        let schemas = tool_schemas();

        for iteration in 1..=self.config.max_iterations {
            let mut request = vec![system.clone()];
            request.extend(self.messages.iter().cloned());

            let response = match self
                .backend
                .chat(&request, Some(&schemas), self.config.temperature)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!("backend failed: {}", e);
                    return format!("Backend error: {}", e);
                }
            };

            let message = response.message;
            let calls = message.tool_calls.clone().unwrap_or_default();

            if calls.is_empty() {
                let answer = message.content.clone();
                self.messages.push(message);
                info!(iteration, "task finished");
                return answer;
            }

            self.messages.push(message);

            for call in calls {
                let name = call.function.name.clone();
                info!(tool = %name, iteration, "tool call");

                let result = match parse_arguments(&call.function.arguments) {
                    Ok(args) => self.execute_audited(&name, args, task).await,
                    Err(e) => {
                        // A parse failure is the model's mistake; report it
                        // back verbatim and let the next turn correct it.
                        warn!(tool = %name, "malformed tool arguments: {}", e);
                        ToolResult::err(format!("Invalid tool arguments: {}", e))
                    }
                };

                self.messages.push(ChatMessage::tool(result.to_message_content()));
            }
        }

        format!(
            "Reached iteration limit ({}) without a final answer.",
            self.config.max_iterations
        )
    }

    /// Execute one tool call through the boundary, audit it, and on an
    /// audited success bank the reward and record the experience.
    async fn execute_audited(&mut self, name: &str, args: Value, task: &str) -> ToolResult {
        let first = self.executor.execute(name, &args).await;
        let (result, verdict, final_args) = self
            .reflector
            .audit_and_retry(&self.executor, name, &args, task, first)
            .await;

        if verdict.success {
            if let Err(e) = self.rewards.add(u64::from(verdict.reward)) {
                warn!("failed to bank reward: {:#}", e);
            }
            self.memory.add(task, name, &final_args, &result).await;
        } else {
            info!(tool = name, analysis = %verdict.analysis, "tool call judged failed");
        }

        result
    }

    async fn build_task_message(&self, task: &str) -> String {
        let mut sections = vec![workspace_summary(self.executor.workspace()).await];

        let recalled = self.memory.retrieve(task, self.config.memory_top_k).await;
        let rendered = render_memories(&recalled);
        if !rendered.is_empty() {
            sections.push(rendered);
        }

        sections.push(format!("Task: {}", task));
        sections.join("\n\n")
    }
}

/// Tool arguments arrive either as a JSON object or as JSON-encoded text.
/// Anything else is a malformed call.
fn parse_arguments(raw: &Value) -> Result<Value, String> {
    match raw {
        Value::Object(_) => Ok(raw.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v @ Value::Object(_)) => Ok(v),
            Ok(_) => Err("arguments must be a JSON object".to_string()),
            Err(e) => Err(format!("arguments are not valid JSON: {}", e)),
        },
        Value::Null => Ok(Value::Object(serde_json::Map::new())),
        _ => Err("arguments must be a JSON object".to_string()),
    }
}
