//! Acorn - Local Agent Runtime
//!
//! Drives a locally served Ollama model through a reason/act loop so a small
//! model can operate autonomously over a sandboxed workspace. Tool calls run
//! through a validating boundary, every result is audited by a reflection
//! pass, and audited successes feed an embedding-retrievable experience
//! memory plus a persistent reward counter.

pub mod agent;
pub mod backend;
pub mod config;
pub mod gateway;
pub mod memory;
pub mod reflection;
pub mod rewards;
pub mod tools;
pub mod types;
