//! Acorn - Type Definitions
//!
//! Shared types for the agent runtime: chat messages, tool calls and
//! results, reflection verdicts, and experience-memory entries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Chat Messages ───────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in the conversation history.
///
/// The history is an ordered sequence; a `tool` message always follows the
/// `assistant` message that requested it, in request order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into(), tool_calls: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into(), tool_calls: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into(), tool_calls: None }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Tool, content: content.into(), tool_calls: None }
    }
}

/// A tool call requested by the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: ToolCallFunction,
}

/// Function name plus raw arguments. Ollama delivers arguments either as a
/// JSON object or as JSON-encoded text depending on the model; both forms
/// are accepted, and malformed text is an observable failure, not a crash.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    pub arguments: Value,
}

// ─── Tool Results ────────────────────────────────────────────────

/// The single result shape shared by every tool's success and failure path.
///
/// A failing call carries `{"error": text}` as its payload; the orchestrator
/// never special-cases individual tools.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub payload: Value,
}

impl ToolResult {
    pub fn ok(payload: Value) -> Self {
        Self { success: true, payload }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: serde_json::json!({ "error": message.into() }),
        }
    }

    /// The error text, if this result is a failure payload.
    pub fn error(&self) -> Option<&str> {
        self.payload.get("error").and_then(|e| e.as_str())
    }

    /// Serialize the payload for the `tool` message fed back to the model.
    pub fn to_message_content(&self) -> String {
        self.payload.to_string()
    }
}

// ─── Reflection ──────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NextAction {
    Retry,
    Finalize,
}

/// The auditor's judgment of one tool result.
///
/// Produced fresh per audited result; `normalize` is the only mutation
/// applied after decoding.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReflectionVerdict {
    pub success: bool,
    pub analysis: String,
    pub reward: u8,
    pub next_action: NextAction,
    #[serde(default)]
    pub improved_arguments: Option<String>,
}

impl ReflectionVerdict {
    /// Enforce the verdict invariants: success pins reward=1 and Finalize
    /// and discards any improved arguments; failure pins reward=0 and Retry.
    /// Improved arguments that are empty after trimming are treated as absent.
    pub fn normalize(mut self) -> Self {
        if self.success {
            self.reward = 1;
            self.next_action = NextAction::Finalize;
            self.improved_arguments = None;
        } else {
            self.reward = 0;
            self.next_action = NextAction::Retry;
            if let Some(ref s) = self.improved_arguments {
                if s.trim().is_empty() {
                    self.improved_arguments = None;
                }
            }
        }
        self
    }
}

// ─── Experience Memory ───────────────────────────────────────────

/// One remembered success: the task, the tool call that satisfied it, and
/// the embedding used for similarity retrieval. Append-only once written.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub ts: f64,
    pub task: String,
    pub tool_name: String,
    pub tool_args: Value,
    #[serde(default)]
    pub result_preview: String,
    pub embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_normalize_success_discards_improvements() {
        let v = ReflectionVerdict {
            success: true,
            analysis: "fine".to_string(),
            reward: 0,
            next_action: NextAction::Retry,
            improved_arguments: Some("{\"path\": \"x\"}".to_string()),
        }
        .normalize();

        assert_eq!(v.reward, 1);
        assert_eq!(v.next_action, NextAction::Finalize);
        assert!(v.improved_arguments.is_none());
    }

    #[test]
    fn test_verdict_normalize_failure_forces_retry() {
        let v = ReflectionVerdict {
            success: false,
            analysis: "empty output".to_string(),
            reward: 1,
            next_action: NextAction::Finalize,
            improved_arguments: Some("   ".to_string()),
        }
        .normalize();

        assert_eq!(v.reward, 0);
        assert_eq!(v.next_action, NextAction::Retry);
        assert!(v.improved_arguments.is_none());
    }

    #[test]
    fn test_tool_result_error_accessor() {
        let r = ToolResult::err("Path escape blocked");
        assert!(!r.success);
        assert_eq!(r.error(), Some("Path escape blocked"));
        assert!(ToolResult::ok(serde_json::json!({"count": 1})).error().is_none());
    }

    #[test]
    fn test_tool_message_omits_absent_tool_calls() {
        let msg = ChatMessage::tool("{\"count\":1}");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"tool\""));
        assert!(!json.contains("tool_calls"));
    }
}
