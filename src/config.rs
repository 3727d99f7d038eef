//! Acorn Configuration
//!
//! Builds the immutable `AgentConfig` for one agent instance: explicit
//! values win over `ACORN_*` environment variables, which win over defaults.
//! Everything is validated once at construction and never mutated afterward.

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

/// State directory name under the user's home: `~/.acorn`.
const STATE_DIR: &str = ".acorn";

/// Commands the shell tool may execute (by basename of the first token).
const DEFAULT_ALLOWED_COMMANDS: &[&str] = &[
    // Read-only inspection
    "ls", "cat", "head", "tail", "grep", "find", "pwd", "whoami", "df", "du",
    "wc", "file", "stat", "tree", "less", "more",
    // Interpreters and package managers
    "python3", "python", "pip", "node", "npm", "npx",
    // Network probes
    "curl", "wget", "ping", "which", "echo", "env", "printenv",
];

/// Substrings that reject a shell command outright, before tokenization.
/// Matched case-insensitively against the raw command string.
const DEFAULT_FORBIDDEN_PATTERNS: &[&str] = &[
    "rm ", "rm\t", "rmdir", "dd if=", "mkfs", "fdisk",
    "kill", "shutdown", "reboot", "halt",
    "sudo", "su ", "chmod", "chown",
    ">", "|&",
];

/// Immutable configuration for one agent instance.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Base URL of the Ollama-compatible backend.
    pub backend_url: String,
    /// Chat model used for both the main loop and reflection.
    pub model: String,
    /// Embedding model for experience memory.
    pub embedding_model: String,
    pub temperature: f32,
    /// The single directory all filesystem and process work is contained in.
    pub workspace_root: PathBuf,
    pub allowed_commands: HashSet<String>,
    pub forbidden_patterns: Vec<String>,
    /// Ceiling for read/write content, in bytes.
    pub max_file_size: u64,
    pub shell_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub git_timeout_secs: u64,
    pub docker_timeout_secs: u64,
    /// Timeout for backend chat/embedding requests.
    pub request_timeout_secs: u64,
    pub max_iterations: u32,
    /// Extra boundary invocations the auditor may spend per tool call.
    pub max_tool_retries: u32,
    /// Append-only JSONL experience log.
    pub memory_path: PathBuf,
    /// Persisted reward counter file.
    pub rewards_path: PathBuf,
    pub memory_top_k: usize,
    pub memory_max_entries: usize,
}

/// The acorn state directory, `~/.acorn`.
pub fn state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/root"))
        .join(STATE_DIR)
}

impl Default for AgentConfig {
    fn default() -> Self {
        let dir = state_dir();
        Self {
            backend_url: "http://localhost:11434".to_string(),
            model: "qwen2.5:7b".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            temperature: 0.0,
            workspace_root: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            allowed_commands: DEFAULT_ALLOWED_COMMANDS.iter().map(|s| s.to_string()).collect(),
            forbidden_patterns: DEFAULT_FORBIDDEN_PATTERNS.iter().map(|s| s.to_string()).collect(),
            max_file_size: 10 * 1024 * 1024,
            shell_timeout_secs: 30,
            http_timeout_secs: 30,
            git_timeout_secs: 30,
            docker_timeout_secs: 60,
            request_timeout_secs: 120,
            max_iterations: 10,
            max_tool_retries: 2,
            memory_path: dir.join("memory.jsonl"),
            rewards_path: dir.join("rewards"),
            memory_top_k: 2,
            memory_max_entries: 500,
        }
    }
}

impl AgentConfig {
    /// Build a config from the environment, starting from defaults.
    ///
    /// Recognized variables: `ACORN_BACKEND_URL`, `ACORN_MODEL`,
    /// `ACORN_EMBEDDING_MODEL`, `ACORN_TEMPERATURE`, `ACORN_WORKSPACE`,
    /// `ACORN_MAX_ITERATIONS`, `ACORN_MAX_TOOL_RETRIES`,
    /// `ACORN_MAX_FILE_SIZE`, `ACORN_SHELL_TIMEOUT`, `ACORN_HTTP_TIMEOUT`,
    /// `ACORN_GIT_TIMEOUT`, `ACORN_DOCKER_TIMEOUT`, `ACORN_REQUEST_TIMEOUT`.
    /// Unparsable numeric values are ignored in favor of the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = env::var("ACORN_BACKEND_URL") {
            if !url.is_empty() {
                config.backend_url = url;
            }
        }
        if let Ok(model) = env::var("ACORN_MODEL") {
            if !model.is_empty() {
                config.model = model;
            }
        }
        if let Ok(model) = env::var("ACORN_EMBEDDING_MODEL") {
            if !model.is_empty() {
                config.embedding_model = model;
            }
        }
        if let Ok(ws) = env::var("ACORN_WORKSPACE") {
            if !ws.is_empty() {
                config.workspace_root = PathBuf::from(resolve_path(&ws));
            }
        }
        if let Some(t) = parse_env("ACORN_TEMPERATURE") {
            config.temperature = t;
        }
        if let Some(n) = parse_env("ACORN_MAX_ITERATIONS") {
            config.max_iterations = n;
        }
        if let Some(n) = parse_env("ACORN_MAX_TOOL_RETRIES") {
            config.max_tool_retries = n;
        }
        if let Some(n) = parse_env("ACORN_MAX_FILE_SIZE") {
            config.max_file_size = n;
        }
        if let Some(n) = parse_env("ACORN_SHELL_TIMEOUT") {
            config.shell_timeout_secs = n;
        }
        if let Some(n) = parse_env("ACORN_HTTP_TIMEOUT") {
            config.http_timeout_secs = n;
        }
        if let Some(n) = parse_env("ACORN_GIT_TIMEOUT") {
            config.git_timeout_secs = n;
        }
        if let Some(n) = parse_env("ACORN_DOCKER_TIMEOUT") {
            config.docker_timeout_secs = n;
        }
        if let Some(n) = parse_env("ACORN_REQUEST_TIMEOUT") {
            config.request_timeout_secs = n;
        }

        config
    }

    /// Validate the config and create the workspace / state directories.
    /// Called once when an agent is constructed.
    pub fn validate(&self) -> Result<()> {
        if self.backend_url.is_empty() {
            bail!("backend_url must not be empty");
        }
        if self.model.is_empty() {
            bail!("model must not be empty");
        }
        if self.max_iterations == 0 {
            bail!("max_iterations must be at least 1");
        }
        if self.allowed_commands.is_empty() {
            bail!("allowed_commands must not be empty");
        }

        std::fs::create_dir_all(&self.workspace_root).with_context(|| {
            format!("Failed to create workspace {}", self.workspace_root.display())
        })?;

        if let Some(parent) = self.memory_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state dir {}", parent.display()))?;
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Resolve a path that may start with `~` to an absolute path.
pub fn resolve_path(p: &str) -> String {
    if let Some(rest) = p.strip_prefix('~') {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        home.join(rest).to_string_lossy().to_string()
    } else {
        p.to_string()
    }
}
