//! Reflection Auditor
//!
//! After every executed tool call, a second temperature-0 pass over the same
//! model judges the result and decides whether to retry with improved
//! arguments. The judge's reply must be a single JSON object; decoding runs
//! through explicit fallback tiers and ends in a deterministic heuristic, so
//! an audit always yields a verdict.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::config::AgentConfig;
use crate::tools::ToolExecutor;
use crate::types::{ChatMessage, NextAction, ReflectionVerdict, ToolResult};

/// Ceiling on the serialized result passed to the judge.
const MAX_AUDIT_CHARS: usize = 6000;

const AUDIT_SYSTEM_PROMPT: &str = "You are a strict execution auditor. You are given a task, the \
tool that was called, and the raw result. Judge whether the result actually satisfies the task.\n\
Respond with EXACTLY one JSON object and nothing else:\n\
{\"success\": bool, \"analysis\": \"one short sentence\", \"reward\": 0 or 1, \
\"next_action\": \"retry\" or \"finalize\", \"improved_arguments\": \
\"JSON object with corrected arguments, or empty string\"}\n\
Empty output, error text, or a result unrelated to the task means failure.";

/// Audits tool results and drives bounded retries.
pub struct Reflector {
    backend: Arc<dyn Backend>,
    config: Arc<AgentConfig>,
}

impl Reflector {
    pub fn new(backend: Arc<dyn Backend>, config: Arc<AgentConfig>) -> Self {
        Self { backend, config }
    }

    /// Judge one tool result. Never fails: a backend error or an
    /// undecodable reply falls through to the heuristic verdict.
    pub async fn audit(&self, tool_name: &str, task: &str, result: &ToolResult) -> ReflectionVerdict {
        let serialized = truncate_chars(&result.to_message_content(), MAX_AUDIT_CHARS);

        let prompt = format!(
            "Task: {}\nTool called: {}\nResult:\n{}",
            task, tool_name, serialized
        );
        let messages = [
            ChatMessage::system(AUDIT_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];

        let verdict = match self.backend.chat(&messages, None, 0.0).await {
            Ok(response) => match decode_verdict(&response.message.content) {
                Some(v) => v,
                None => {
                    debug!(tool = tool_name, "audit reply was not decodable, using heuristic");
                    heuristic_verdict(&serialized, result)
                }
            },
            Err(e) => {
                warn!(tool = tool_name, "audit backend call failed: {}", e);
                heuristic_verdict(&serialized, result)
            }
        };

        verdict.normalize()
    }

    /// Audit a result and, while the verdict says retry and supplies
    /// improved arguments that parse as a JSON object, re-execute and
    /// re-audit. At most `max_tool_retries` extra boundary invocations.
    /// Returns the final result, its verdict, and the arguments that
    /// produced it.
    pub async fn audit_and_retry(
        &self,
        executor: &ToolExecutor,
        tool_name: &str,
        args: &Value,
        task: &str,
        first_result: ToolResult,
    ) -> (ToolResult, ReflectionVerdict, Value) {
        let mut result = first_result;
        let mut current_args = args.clone();
        let mut verdict = self.audit(tool_name, task, &result).await;

        for attempt in 1..=self.config.max_tool_retries {
            if verdict.next_action != NextAction::Retry {
                break;
            }
            let improved = match verdict.improved_arguments.as_deref() {
                Some(s) => s,
                None => break,
            };
            let parsed: Value = match serde_json::from_str(improved) {
                Ok(v @ Value::Object(_)) => v,
                _ => {
                    warn!(
                        tool = tool_name,
                        "improved arguments were not a JSON object, giving up"
                    );
                    break;
                }
            };

            debug!(tool = tool_name, attempt, "retrying with improved arguments");
            current_args = parsed;
            result = executor.execute(tool_name, &current_args).await;
            verdict = self.audit(tool_name, task, &result).await;
        }

        (result, verdict, current_args)
    }
}

/// Decode the judge's reply, trying each tier in turn: the whole trimmed
/// reply as one object, then the first balanced-brace substring, then the
/// same after normalizing typographic quotes.
fn decode_verdict(raw: &str) -> Option<ReflectionVerdict> {
    let trimmed = raw.trim();

    if let Ok(v) = serde_json::from_str::<ReflectionVerdict>(trimmed) {
        return Some(v);
    }

    if let Some(candidate) = balanced_object(trimmed) {
        if let Ok(v) = serde_json::from_str::<ReflectionVerdict>(candidate) {
            return Some(v);
        }
        let straightened: String = candidate
            .chars()
            .map(|c| match c {
                '\u{201c}' | '\u{201d}' => '"',
                '\u{2018}' | '\u{2019}' => '\'',
                other => other,
            })
            .collect();
        if let Ok(v) = serde_json::from_str::<ReflectionVerdict>(&straightened) {
            return Some(v);
        }
    }

    None
}

/// First balanced `{...}` substring, tracking string literals and escapes.
fn balanced_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Deterministic fallback when the judge is unavailable or unintelligible:
/// error-shaped results fail, everything else passes.
fn heuristic_verdict(serialized: &str, result: &ToolResult) -> ReflectionVerdict {
    let lowered = serialized.to_lowercase();
    let error_marker = ["error", "exception", "traceback"]
        .iter()
        .any(|m| lowered.contains(m));
    let nonzero_code = result
        .payload
        .get("returncode")
        .and_then(|c| c.as_i64())
        .map(|c| c != 0)
        .unwrap_or(false);

    let failed = error_marker || !result.success || nonzero_code;

    ReflectionVerdict {
        success: !failed,
        analysis: if failed {
            "Heuristic: result looks like a failure".to_string()
        } else {
            "Heuristic: result looks successful".to_string()
        },
        reward: u8::from(!failed),
        next_action: if failed { NextAction::Retry } else { NextAction::Finalize },
        improved_arguments: None,
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{verdict_json, ScriptedBackend};
    use serde_json::json;

    fn reflector_with(backend: ScriptedBackend) -> Reflector {
        Reflector::new(Arc::new(backend), Arc::new(AgentConfig::default()))
    }

    #[test]
    fn test_decode_whole_object() {
        let v = decode_verdict(&verdict_json(true, None)).unwrap();
        assert!(v.success);
    }

    #[test]
    fn test_decode_object_with_surrounding_prose() {
        let raw = format!("Sure! Here is my verdict:\n{}\nHope that helps.", verdict_json(false, None));
        let v = decode_verdict(&raw).unwrap();
        assert!(!v.success);
    }

    #[test]
    fn test_decode_typographic_quotes() {
        let raw = "{\u{201c}success\u{201d}: true, \u{201c}analysis\u{201d}: \u{201c}ok\u{201d}, \
                   \u{201c}reward\u{201d}: 1, \u{201c}next_action\u{201d}: \u{201c}finalize\u{201d}}";
        let v = decode_verdict(raw).unwrap();
        assert!(v.success);
    }

    #[test]
    fn test_decode_braces_inside_strings() {
        let raw = r#"{"success": true, "analysis": "output was {nested}", "reward": 1, "next_action": "finalize"} trailing"#;
        let v = decode_verdict(raw).unwrap();
        assert!(v.success);
    }

    #[test]
    fn test_decode_garbage_is_none() {
        assert!(decode_verdict("I think it went fine").is_none());
        assert!(decode_verdict("{broken json").is_none());
    }

    #[test]
    fn test_heuristic_flags_error_text() {
        let result = ToolResult::ok(json!({"stdout": "Traceback (most recent call last)"}));
        let v = heuristic_verdict(&result.to_message_content(), &result);
        assert!(!v.success);
    }

    #[test]
    fn test_heuristic_flags_nonzero_returncode() {
        let result = ToolResult {
            success: true,
            payload: json!({"stdout": "", "returncode": 2}),
        };
        let v = heuristic_verdict(&result.to_message_content(), &result);
        assert!(!v.success);
    }

    #[test]
    fn test_heuristic_passes_clean_result() {
        let result = ToolResult::ok(json!({"stdout": "hello", "returncode": 0}));
        let v = heuristic_verdict(&result.to_message_content(), &result);
        assert!(v.success);
        assert_eq!(v.reward, 1);
    }

    #[tokio::test]
    async fn test_audit_uses_heuristic_when_backend_down() {
        // Empty script: chat errors out, so the heuristic decides.
        let reflector = reflector_with(ScriptedBackend::new());
        let result = ToolResult::ok(json!({"stdout": "fine", "returncode": 0}));
        let v = reflector.audit("shell", "say fine", &result).await;
        assert!(v.success);
        assert_eq!(v.next_action, NextAction::Finalize);
    }

    #[tokio::test]
    async fn test_audit_normalizes_judge_output() {
        // Judge says success but also supplies improvements; normalize drops them.
        let raw = json!({
            "success": true,
            "analysis": "good",
            "reward": 0,
            "next_action": "retry",
            "improved_arguments": "{\"cmd\": \"ls\"}",
        })
        .to_string();
        let reflector = reflector_with(ScriptedBackend::new().push_text(&raw));
        let result = ToolResult::ok(json!({"stdout": "x"}));
        let v = reflector.audit("shell", "t", &result).await;
        assert!(v.success);
        assert_eq!(v.reward, 1);
        assert_eq!(v.next_action, NextAction::Finalize);
        assert!(v.improved_arguments.is_none());
    }

    #[tokio::test]
    async fn test_retry_bound_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(AgentConfig {
            workspace_root: dir.path().to_path_buf(),
            max_tool_retries: 2,
            ..AgentConfig::default()
        });
        let executor = ToolExecutor::new(config.clone()).unwrap();

        // The judge forever demands a retry with arguments that will fail again.
        let backend = ScriptedBackend::new().push_text(&verdict_json(
            false,
            Some("{\"path\": \"still_missing.txt\"}"),
        ));
        let backend = Arc::new(backend);
        let reflector = Reflector::new(backend.clone(), config);

        let first = executor
            .execute("read_file", &json!({"path": "missing.txt"}))
            .await;
        let (result, verdict, _) = reflector
            .audit_and_retry(&executor, "read_file", &json!({"path": "missing.txt"}), "read it", first)
            .await;

        assert!(!result.success);
        assert!(!verdict.success);
        // One audit per result: the first plus one per retry.
        assert_eq!(backend.chat_call_count(), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_success() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real.txt"), "content").unwrap();
        let config = Arc::new(AgentConfig {
            workspace_root: dir.path().to_path_buf(),
            max_tool_retries: 3,
            ..AgentConfig::default()
        });
        let executor = ToolExecutor::new(config.clone()).unwrap();

        let backend = Arc::new(
            ScriptedBackend::new()
                .push_text(&verdict_json(false, Some("{\"path\": \"real.txt\"}")))
                .push_text(&verdict_json(true, None)),
        );
        let reflector = Reflector::new(backend.clone(), config);

        let first = executor
            .execute("read_file", &json!({"path": "wrong.txt"}))
            .await;
        let (result, verdict, final_args) = reflector
            .audit_and_retry(&executor, "read_file", &json!({"path": "wrong.txt"}), "read it", first)
            .await;

        assert!(result.success);
        assert!(verdict.success);
        assert_eq!(final_args["path"], "real.txt");
        assert_eq!(backend.chat_call_count(), 2);
    }

    #[tokio::test]
    async fn test_unparsable_improvements_stop_retries() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(AgentConfig {
            workspace_root: dir.path().to_path_buf(),
            ..AgentConfig::default()
        });
        let executor = ToolExecutor::new(config.clone()).unwrap();

        let backend = Arc::new(
            ScriptedBackend::new().push_text(&verdict_json(false, Some("try path=x instead"))),
        );
        let reflector = Reflector::new(backend.clone(), config);

        let first = executor
            .execute("read_file", &json!({"path": "missing.txt"}))
            .await;
        let (result, verdict, _) = reflector
            .audit_and_retry(&executor, "read_file", &json!({"path": "missing.txt"}), "read", first)
            .await;

        assert!(!result.success);
        assert!(!verdict.success);
        assert_eq!(backend.chat_call_count(), 1);
    }
}
