//! Scripted backend for tests.
//!
//! Plays back a queue of canned chat messages; the final message repeats
//! once the queue is drained so loop-shaped tests never run dry. Embeddings
//! either return a fixed vector or fail, to exercise the offline fallback.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::types::{ChatMessage, ToolCall, ToolCallFunction};

use super::{Backend, BackendError, ChatResponse};

#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<ChatMessage>>,
    embedding: Option<Vec<f32>>,
    pub chat_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain assistant reply.
    pub fn push_text(self, content: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(ChatMessage::assistant(content));
        self
    }

    /// Queue an assistant reply requesting a single tool call.
    pub fn push_tool_call(self, name: &str, arguments: Value) -> Self {
        self.responses.lock().unwrap().push_back(ChatMessage {
            role: crate::types::ChatRole::Assistant,
            content: String::new(),
            tool_calls: Some(vec![ToolCall {
                function: ToolCallFunction {
                    name: name.to_string(),
                    arguments,
                },
            }]),
        });
        self
    }

    /// Serve this vector from `embeddings` instead of failing.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn chat_call_count(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _tools: Option<&[Value]>,
        _temperature: f32,
    ) -> Result<ChatResponse, BackendError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);

        let mut queue = self.responses.lock().unwrap();
        let message = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else if let Some(last) = queue.front() {
            last.clone()
        } else {
            return Err(BackendError::Decode("Script exhausted".to_string()));
        };

        Ok(ChatResponse { message })
    }

    async fn embeddings(&self, _prompt: &str) -> Result<Vec<f32>, BackendError> {
        match &self.embedding {
            Some(v) => Ok(v.clone()),
            None => Err(BackendError::Connect("scripted backend".to_string())),
        }
    }
}

/// A canned reflection verdict reply, for driving the auditor in tests.
pub fn verdict_json(success: bool, improved_arguments: Option<&str>) -> String {
    json!({
        "success": success,
        "analysis": if success { "looks good" } else { "output is an error" },
        "reward": if success { 1 } else { 0 },
        "next_action": if success { "finalize" } else { "retry" },
        "improved_arguments": improved_arguments,
    })
    .to_string()
}
