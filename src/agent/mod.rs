//! Agent Orchestration
//!
//! The reason/act loop and its supporting pieces: system prompts, task
//! context assembly, and the orchestrator that ties the backend, boundary,
//! auditor, memory, and rewards together.

pub mod context;
pub mod orchestrator;
pub mod system_prompt;

pub use orchestrator::Agent;
pub use system_prompt::CRACKED_THRESHOLD;
