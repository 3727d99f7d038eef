//! Backend Client
//!
//! The only component that talks to the model-serving endpoint. Exposes a
//! `Backend` trait so the orchestrator, auditor, and memory can be driven by
//! a scripted client in tests.

pub mod client;
pub mod mock;

pub use client::{OllamaClient, Preflight};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::types::ChatMessage;

/// Typed failure from the model-serving endpoint. Fatal for the current
/// turn at the top of the loop; resolved by fallbacks everywhere else.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Cannot connect to backend at {0}")]
    Connect(String),
    #[error("Backend request timed out after {0}s")]
    Timeout(u64),
    #[error("Backend returned HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("Malformed backend response: {0}")]
    Decode(String),
}

/// A chat completion from the backend.
#[derive(Clone, Debug)]
pub struct ChatResponse {
    pub message: ChatMessage,
}

/// Blocking request/response operations against the model endpoint.
/// Every call either completes within its timeout or returns a typed error;
/// there are no hidden retries.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send the full history (plus optional tool schemas) and return the
    /// model's next message.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
        temperature: f32,
    ) -> Result<ChatResponse, BackendError>;

    /// Embed a piece of text for similarity retrieval.
    async fn embeddings(&self, prompt: &str) -> Result<Vec<f32>, BackendError>;
}
