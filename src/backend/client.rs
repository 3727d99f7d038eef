//! Ollama HTTP Client
//!
//! Wraps the Ollama `/api/chat`, `/api/embeddings`, and `/api/tags`
//! endpoints. Requests are non-streaming and run under the configured
//! timeout; failures map onto `BackendError` variants.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::types::{ChatMessage, ChatRole, ToolCall, ToolCallFunction};

use super::{Backend, BackendError, ChatResponse};

/// Client for an Ollama-compatible model server.
pub struct OllamaClient {
    base_url: String,
    model: String,
    embedding_model: String,
    timeout_secs: u64,
    http: Client,
}

/// Result of a preflight probe against the backend.
#[derive(Clone, Debug)]
pub struct Preflight {
    pub reachable: bool,
    pub model_available: bool,
    pub available_models: Vec<String>,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            embedding_model: embedding_model.into(),
            timeout_secs,
            http: Client::new(),
        }
    }

    fn map_transport(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.timeout_secs)
        } else if err.is_connect() {
            BackendError::Connect(self.base_url.clone())
        } else {
            BackendError::Decode(err.to_string())
        }
    }

    /// Probe `/api/tags` to verify the backend is up and the configured
    /// model is pulled. Used by `acorn status`; never called from the loop.
    pub async fn preflight(&self) -> Preflight {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await;

        let data: Value = match resp {
            Ok(r) if r.status().is_success() => r.json().await.unwrap_or(Value::Null),
            _ => {
                return Preflight {
                    reachable: false,
                    model_available: false,
                    available_models: Vec::new(),
                }
            }
        };

        let models: Vec<String> = data["models"]
            .as_array()
            .map(|ms| {
                ms.iter()
                    .filter_map(|m| m["name"].as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let model_available = models.iter().any(|m| m.contains(&self.model));

        Preflight {
            reachable: true,
            model_available,
            available_models: models,
        }
    }
}

#[async_trait]
impl Backend for OllamaClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
        temperature: f32,
    ) -> Result<ChatResponse, BackendError> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": temperature },
        });

        if let Some(tool_defs) = tools {
            if !tool_defs.is_empty() {
                body["tools"] = json!(tool_defs);
            }
        }

        let url = format!("{}/api/chat", self.base_url);
        let resp = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        Ok(ChatResponse {
            message: decode_message(&data["message"])?,
        })
    }

    async fn embeddings(&self, prompt: &str) -> Result<Vec<f32>, BackendError> {
        let body = json!({
            "model": self.embedding_model,
            "prompt": prompt,
        });

        let url = format!("{}/api/embeddings", self.base_url);
        let resp = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        let embedding: Vec<f32> = data["embedding"]
            .as_array()
            .map(|xs| xs.iter().filter_map(|x| x.as_f64()).map(|x| x as f32).collect())
            .unwrap_or_default();

        if embedding.is_empty() {
            return Err(BackendError::Decode("Empty embedding vector".to_string()));
        }

        Ok(embedding)
    }
}

/// Decode the `message` object of an Ollama chat response.
fn decode_message(message: &Value) -> Result<ChatMessage, BackendError> {
    if message.is_null() {
        return Err(BackendError::Decode("Response has no message".to_string()));
    }

    let role = match message["role"].as_str().unwrap_or("assistant") {
        "system" => ChatRole::System,
        "user" => ChatRole::User,
        "tool" => ChatRole::Tool,
        _ => ChatRole::Assistant,
    };

    let tool_calls: Option<Vec<ToolCall>> = message["tool_calls"].as_array().map(|tcs| {
        tcs.iter()
            .map(|tc| ToolCall {
                function: ToolCallFunction {
                    name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                    arguments: tc["function"]["arguments"].clone(),
                },
            })
            .collect()
    });

    Ok(ChatMessage {
        role,
        content: message["content"].as_str().unwrap_or("").to_string(),
        tool_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_message_with_tool_calls() {
        let raw = json!({
            "role": "assistant",
            "content": "",
            "tool_calls": [
                { "function": { "name": "list_directory", "arguments": { "path": "." } } }
            ]
        });

        let msg = decode_message(&raw).unwrap();
        assert_eq!(msg.role, ChatRole::Assistant);
        let calls = msg.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "list_directory");
        assert_eq!(calls[0].function.arguments["path"], ".");
    }

    #[test]
    fn test_decode_message_plain_text() {
        let raw = json!({ "role": "assistant", "content": "done" });
        let msg = decode_message(&raw).unwrap();
        assert_eq!(msg.content, "done");
        assert!(msg.tool_calls.is_none());
    }

    #[test]
    fn test_decode_message_missing_is_error() {
        assert!(decode_message(&Value::Null).is_err());
    }
}
