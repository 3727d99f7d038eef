//! Tool Executor
//!
//! Dispatches one named operation against the workspace and returns a
//! `ToolResult`. Dispatch is an exhaustive match over `ToolKind`; the only
//! runtime fallback is for tool names the model invented. Every handler
//! converts its failures into error payloads, and all process and HTTP
//! work runs under a configured timeout.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::warn;

use crate::config::AgentConfig;
use crate::types::ToolResult;

use super::guard::{contain_path, validate_command};

/// The closed set of operations the boundary knows how to execute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolKind {
    Shell,
    ReadFile,
    WriteFile,
    ListDirectory,
    HttpRequest,
    Git,
    Docker,
}

impl FromStr for ToolKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shell" => Ok(Self::Shell),
            "read_file" => Ok(Self::ReadFile),
            "write_file" => Ok(Self::WriteFile),
            "list_directory" => Ok(Self::ListDirectory),
            "http_request" => Ok(Self::HttpRequest),
            "git" => Ok(Self::Git),
            "docker" => Ok(Self::Docker),
            _ => Err(()),
        }
    }
}

impl ToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::ListDirectory => "list_directory",
            Self::HttpRequest => "http_request",
            Self::Git => "git",
            Self::Docker => "docker",
        }
    }
}

/// Executes tools against one workspace root. Owns no persistent state
/// beyond the resolved root and an HTTP client.
pub struct ToolExecutor {
    config: Arc<AgentConfig>,
    workspace: PathBuf,
    http: Client,
}

impl ToolExecutor {
    pub fn new(config: Arc<AgentConfig>) -> Result<Self> {
        std::fs::create_dir_all(&config.workspace_root).with_context(|| {
            format!("Failed to create workspace {}", config.workspace_root.display())
        })?;
        let workspace = config.workspace_root.canonicalize().with_context(|| {
            format!("Failed to resolve workspace {}", config.workspace_root.display())
        })?;
        Ok(Self {
            config,
            workspace,
            http: Client::new(),
        })
    }

    pub fn workspace(&self) -> &PathBuf {
        &self.workspace
    }

    /// Execute a tool by name. Unknown names produce an error result, not
    /// an error; everything the model does is data.
    pub async fn execute(&self, name: &str, args: &Value) -> ToolResult {
        match ToolKind::from_str(name) {
            Ok(kind) => self.execute_kind(kind, args).await,
            Err(()) => ToolResult::err(format!("Unknown tool: {}", name)),
        }
    }

    pub async fn execute_kind(&self, kind: ToolKind, args: &Value) -> ToolResult {
        match kind {
            ToolKind::Shell => self.shell(args).await,
            ToolKind::ReadFile => self.read_file(args),
            ToolKind::WriteFile => self.write_file(args),
            ToolKind::ListDirectory => self.list_directory(args),
            ToolKind::HttpRequest => self.http_request(args).await,
            ToolKind::Git => self.git(args).await,
            ToolKind::Docker => self.docker(args).await,
        }
    }

    // ─── Shell ───────────────────────────────────────────────────

    async fn shell(&self, args: &Value) -> ToolResult {
        let cmd = args.get("cmd").and_then(|c| c.as_str()).unwrap_or("");

        let tokens = match validate_command(
            cmd,
            &self.config.allowed_commands,
            &self.config.forbidden_patterns,
        ) {
            Ok(t) => t,
            Err(e) => {
                warn!(command = %cmd, "shell command rejected: {}", e);
                return ToolResult::err(e);
            }
        };

        match self.run_argv(&tokens, self.config.shell_timeout_secs).await {
            Ok(output) => {
                let code = output.status.code().unwrap_or(-1);
                ToolResult {
                    success: output.status.success(),
                    payload: json!({
                        "stdout": String::from_utf8_lossy(&output.stdout),
                        "stderr": String::from_utf8_lossy(&output.stderr),
                        "returncode": code,
                        "success": output.status.success(),
                    }),
                }
            }
            Err(e) => ToolResult::err(e),
        }
    }

    /// Spawn an argument vector directly -- no shell interpreter is ever
    /// involved, so metacharacters in arguments are inert.
    async fn run_argv(
        &self,
        argv: &[String],
        timeout_secs: u64,
    ) -> Result<std::process::Output, String> {
        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]).current_dir(&self.workspace);

        let fut = command.output();
        match tokio::time::timeout(Duration::from_secs(timeout_secs), fut).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(format!("Command not found: {}", argv[0]))
            }
            Ok(Err(e)) => Err(format!("Failed to run {}: {}", argv[0], e)),
            Err(_) => Err(format!("Command timed out after {}s", timeout_secs)),
        }
    }

    // ─── Files ───────────────────────────────────────────────────

    fn read_file(&self, args: &Value) -> ToolResult {
        let path = args.get("path").and_then(|p| p.as_str()).unwrap_or("");
        let full = match contain_path(&self.workspace, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e),
        };

        if !full.exists() {
            return ToolResult::err(format!("File not found: {}", path));
        }
        if !full.is_file() {
            return ToolResult::err(format!("Not a file: {}", path));
        }

        match full.metadata() {
            Ok(meta) if meta.len() > self.config.max_file_size => {
                return ToolResult::err(format!(
                    "File exceeds {} byte limit",
                    self.config.max_file_size
                ));
            }
            Err(e) => return ToolResult::err(format!("Failed to stat {}: {}", path, e)),
            _ => {}
        }

        let bytes = match std::fs::read(&full) {
            Ok(b) => b,
            Err(e) => return ToolResult::err(format!("Failed to read {}: {}", path, e)),
        };

        let content = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(_) => {
                return ToolResult::err("File is not valid UTF-8 text (binary file?)");
            }
        };

        let lines = content.matches('\n').count()
            + usize::from(!content.is_empty() && !content.ends_with('\n'));

        ToolResult::ok(json!({
            "content": content,
            "size": content.len(),
            "lines": lines,
        }))
    }

    fn write_file(&self, args: &Value) -> ToolResult {
        let path = args.get("path").and_then(|p| p.as_str()).unwrap_or("");
        let content = args.get("content").and_then(|c| c.as_str()).unwrap_or("");

        let full = match contain_path(&self.workspace, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e),
        };

        if content.len() as u64 > self.config.max_file_size {
            return ToolResult::err(format!(
                "Content exceeds {} byte limit",
                self.config.max_file_size
            ));
        }

        if let Some(parent) = full.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolResult::err(format!("Failed to create parent dirs: {}", e));
            }
        }

        match std::fs::write(&full, content) {
            Ok(()) => ToolResult::ok(json!({
                "success": true,
                "path": path,
                "bytes_written": content.len(),
            })),
            Err(e) => ToolResult::err(format!("Failed to write {}: {}", path, e)),
        }
    }

    fn list_directory(&self, args: &Value) -> ToolResult {
        let path = args.get("path").and_then(|p| p.as_str()).unwrap_or(".");
        let full = match contain_path(&self.workspace, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e),
        };

        if !full.exists() {
            return ToolResult::err(format!("Directory not found: {}", path));
        }
        if !full.is_dir() {
            return ToolResult::err(format!("Not a directory: {}", path));
        }

        let entries = match std::fs::read_dir(&full) {
            Ok(rd) => rd,
            Err(e) => return ToolResult::err(format!("Failed to list {}: {}", path, e)),
        };

        let mut names: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
        names.sort();

        let items: Vec<Value> = names
            .iter()
            .map(|p| {
                let name = p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                if p.is_dir() {
                    json!({ "name": name, "type": "dir" })
                } else {
                    let size = p.metadata().map(|m| m.len()).unwrap_or(0);
                    json!({ "name": name, "type": "file", "size": size })
                }
            })
            .collect();

        ToolResult::ok(json!({
            "path": path,
            "count": items.len(),
            "items": items,
        }))
    }

    // ─── HTTP ────────────────────────────────────────────────────

    async fn http_request(&self, args: &Value) -> ToolResult {
        let method = args
            .get("method")
            .and_then(|m| m.as_str())
            .unwrap_or("GET")
            .to_uppercase();
        let url = args.get("url").and_then(|u| u.as_str()).unwrap_or("");

        if url.is_empty() {
            return ToolResult::err("URL is required");
        }

        let method = match method.as_str() {
            "GET" => reqwest::Method::GET,
            "POST" => reqwest::Method::POST,
            "PUT" => reqwest::Method::PUT,
            "DELETE" => reqwest::Method::DELETE,
            "PATCH" => reqwest::Method::PATCH,
            "HEAD" => reqwest::Method::HEAD,
            other => {
                return ToolResult::err(format!(
                    "Unsupported method: {}. Use: GET, POST, PUT, DELETE, PATCH, HEAD",
                    other
                ))
            }
        };

        let mut request = self
            .http
            .request(method, url)
            .timeout(Duration::from_secs(self.config.http_timeout_secs));

        if let Some(headers) = args.get("headers").and_then(|h| h.as_object()) {
            for (key, value) in headers {
                if let Some(v) = value.as_str() {
                    request = request.header(key, v);
                }
            }
        }

        match args.get("body") {
            Some(Value::String(s)) => request = request.body(s.clone()),
            Some(body @ Value::Object(_)) => request = request.json(body),
            _ => {}
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return ToolResult::err(format!(
                    "Request timed out after {}s",
                    self.config.http_timeout_secs
                ))
            }
            Err(e) if e.is_connect() => {
                return ToolResult::err(format!("Connection failed: {}", url))
            }
            Err(e) => return ToolResult::err(format!("HTTP error: {}", e)),
        };

        let status = response.status().as_u16();
        let success = (200..300).contains(&status);
        let text = response.text().await.unwrap_or_default();
        let body: Value = serde_json::from_str(&text)
            .unwrap_or_else(|_| Value::String(truncate(&text, 5000)));

        ToolResult {
            success,
            payload: json!({
                "status_code": status,
                "body": body,
                "success": success,
            }),
        }
    }

    // ─── Git ─────────────────────────────────────────────────────

    async fn git(&self, args: &Value) -> ToolResult {
        let action = args.get("action").and_then(|a| a.as_str()).unwrap_or("");

        let argv = match build_git_argv(action, args) {
            Ok(a) => a,
            Err(e) => return ToolResult::err(e),
        };

        self.run_combined(&argv, self.config.git_timeout_secs).await
    }

    // ─── Docker ──────────────────────────────────────────────────

    async fn docker(&self, args: &Value) -> ToolResult {
        let action = args.get("action").and_then(|a| a.as_str()).unwrap_or("");

        let argv = match build_docker_argv(action, args) {
            Ok(a) => a,
            Err(e) => return ToolResult::err(e),
        };

        self.run_combined(&argv, self.config.docker_timeout_secs).await
    }

    /// Run an argv and fold stdout+stderr into one `output` field, the shape
    /// git and docker results share.
    async fn run_combined(&self, argv: &[String], timeout_secs: u64) -> ToolResult {
        match self.run_argv(argv, timeout_secs).await {
            Ok(output) => {
                let code = output.status.code().unwrap_or(-1);
                let combined = format!(
                    "{}{}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                );
                ToolResult {
                    success: output.status.success(),
                    payload: json!({
                        "output": combined.trim(),
                        "returncode": code,
                        "success": output.status.success(),
                    }),
                }
            }
            Err(e) => ToolResult::err(e),
        }
    }
}

/// Map a git action onto an explicit argument vector. Free-form strings
/// (message, branch, files) only ever become single argv elements.
fn build_git_argv(action: &str, args: &Value) -> Result<Vec<String>, String> {
    let arg = |key: &str| {
        args.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };
    let message = arg("message");
    let branch = arg("branch");

    let argv: Vec<&str> = match action {
        "status" => vec!["git", "status", "--short"],
        "log" => vec!["git", "log", "--oneline", "-10"],
        "diff" => vec!["git", "diff"],
        "branch" => vec!["git", "branch"],
        "stash" => vec!["git", "stash"],
        "remote" => vec!["git", "remote", "-v"],
        "tag" => vec!["git", "tag"],
        "add" => {
            let files = args
                .get("files")
                .and_then(|v| v.as_str())
                .unwrap_or(".")
                .to_string();
            return Ok(vec!["git".into(), "add".into(), files]);
        }
        "commit" => {
            if message.is_empty() {
                return Err("commit requires a 'message' argument".to_string());
            }
            return Ok(vec!["git".into(), "commit".into(), "-m".into(), message]);
        }
        "checkout" => {
            if branch.is_empty() {
                return Err("checkout requires a 'branch' argument".to_string());
            }
            return Ok(vec!["git".into(), "checkout".into(), branch]);
        }
        "push" | "pull" | "fetch" => {
            let mut argv = vec!["git".to_string(), action.to_string()];
            if !branch.is_empty() {
                argv.push("origin".to_string());
                argv.push(branch);
            }
            return Ok(argv);
        }
        other => {
            return Err(format!(
                "Git action not allowed: {}. Allowed: status, log, diff, branch, add, \
                 commit, push, pull, checkout, stash, fetch, remote, tag",
                other
            ))
        }
    };

    Ok(argv.into_iter().map(String::from).collect())
}

/// Map a docker action onto an explicit argument vector.
fn build_docker_argv(action: &str, args: &Value) -> Result<Vec<String>, String> {
    let service = args
        .get("service")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    match action {
        "ps" => Ok(str_argv(&["docker", "ps"])),
        "images" => Ok(str_argv(&["docker", "images"])),
        "logs" => {
            if service.is_empty() {
                return Err("logs requires a 'service' argument".to_string());
            }
            Ok(vec![
                "docker".into(),
                "logs".into(),
                service,
                "--tail".into(),
                "100".into(),
            ])
        }
        "compose_up" => {
            let detach = args.get("detach").and_then(|v| v.as_bool()).unwrap_or(true);
            let mut argv = str_argv(&["docker-compose", "up"]);
            if detach {
                argv.push("-d".to_string());
            }
            Ok(argv)
        }
        "compose_down" => Ok(str_argv(&["docker-compose", "down"])),
        "compose_ps" => Ok(str_argv(&["docker-compose", "ps"])),
        "compose_logs" => {
            let mut argv = str_argv(&["docker-compose", "logs", "--tail", "100"]);
            if !service.is_empty() {
                argv.push(service);
            }
            Ok(argv)
        }
        other => Err(format!(
            "Docker action not allowed: {}. Allowed: ps, images, logs, compose_up, \
             compose_down, compose_ps, compose_logs",
            other
        )),
    }
}

fn str_argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
