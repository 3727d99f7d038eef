//! Experience Memory
//!
//! Append-only JSONL log of audited successes, recalled by embedding
//! similarity so past solutions can steer new tasks. Embeddings come from
//! the backend when it is up, otherwise from a deterministic hash embedding,
//! so retrieval degrades instead of disappearing offline.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use sha3::{Digest, Sha3_256};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::types::{MemoryEntry, ToolResult};

/// Dimension of the offline hash embedding.
const HASH_DIM: usize = 128;

/// Words per text fed into the hash embedding.
const HASH_MAX_TOKENS: usize = 512;

/// Minimum cosine similarity for an entry to count as relevant.
const SIMILARITY_THRESHOLD: f32 = 0.10;

/// Characters of the result kept as the stored preview.
const PREVIEW_CHARS: usize = 300;

/// Similarity-retrievable log of past tool-call successes.
pub struct ExperienceMemory {
    backend: Arc<dyn Backend>,
    path: PathBuf,
    max_entries: usize,
    /// Most recent first. Loaded lazily on first use.
    cache: Mutex<Option<Vec<MemoryEntry>>>,
}

impl ExperienceMemory {
    pub fn new(backend: Arc<dyn Backend>, path: PathBuf, max_entries: usize) -> Self {
        Self {
            backend,
            path,
            max_entries,
            cache: Mutex::new(None),
        }
    }

    /// Record one audited success. Failures to persist are logged and
    /// swallowed so memory never takes a task down.
    pub async fn add(&self, task: &str, tool_name: &str, args: &Value, result: &ToolResult) {
        let embedding = self.embed(task).await;

        let entry = MemoryEntry {
            id: Uuid::new_v4().to_string(),
            ts: Utc::now().timestamp_millis() as f64 / 1000.0,
            task: task.to_string(),
            tool_name: tool_name.to_string(),
            tool_args: args.clone(),
            result_preview: preview(&result.to_message_content()),
            embedding,
        };

        if let Err(e) = self.append(&entry) {
            warn!("failed to persist memory entry: {:#}", e);
            return;
        }

        let mut cache = self.cache.lock().await;
        let entries = self.loaded(&mut cache);
        entries.insert(0, entry);
        entries.truncate(self.max_entries);
    }

    /// The most similar past successes for `task`, at most `top_k`, all
    /// scoring above the similarity threshold. Most recent wins ties.
    pub async fn retrieve(&self, task: &str, top_k: usize) -> Vec<MemoryEntry> {
        if top_k == 0 {
            return Vec::new();
        }
        let query = self.embed(task).await;

        let mut cache = self.cache.lock().await;
        let entries = self.loaded(&mut cache);

        let mut scored: Vec<(f32, &MemoryEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(&query, &e.embedding), e))
            .filter(|(score, _)| *score > SIMILARITY_THRESHOLD)
            .collect();
        // Stable sort keeps the cache's recency order for equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let hits: Vec<MemoryEntry> = scored.into_iter().take(top_k).map(|(_, e)| e.clone()).collect();
        debug!(task, hits = hits.len(), "memory retrieval");
        hits
    }

    pub async fn len(&self) -> usize {
        let mut cache = self.cache.lock().await;
        self.loaded(&mut cache).len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Backend embedding quantized to 4 decimals, or the hash embedding
    /// when the backend cannot serve one.
    async fn embed(&self, text: &str) -> Vec<f32> {
        match self.backend.embeddings(text).await {
            Ok(v) if !v.is_empty() => v.into_iter().map(quantize4).collect(),
            Ok(_) => hash_embedding(text),
            Err(e) => {
                debug!("backend embedding unavailable ({}), using hash embedding", e);
                hash_embedding(text)
            }
        }
    }

    fn append(&self, entry: &MemoryEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let line = serde_json::to_string(entry).context("Failed to encode memory entry")?;
        writeln!(file, "{}", line).context("Failed to append memory entry")?;
        file.flush().context("Failed to flush memory log")?;
        Ok(())
    }

    /// Ensure the cache is populated; malformed lines are skipped, not fatal.
    fn loaded<'a>(&self, cache: &'a mut Option<Vec<MemoryEntry>>) -> &'a mut Vec<MemoryEntry> {
        cache.get_or_insert_with(|| {
            let mut entries: Vec<MemoryEntry> = Vec::new();
            if let Ok(file) = std::fs::File::open(&self.path) {
                for line in BufReader::new(file).lines().map_while(|l| l.ok()) {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<MemoryEntry>(line) {
                        Ok(entry) => entries.push(entry),
                        Err(e) => warn!("skipping malformed memory line: {}", e),
                    }
                }
            }
            // File order is oldest first; the cache keeps most recent first.
            entries.reverse();
            entries.truncate(self.max_entries);
            entries
        })
    }
}

fn quantize4(x: f32) -> f32 {
    (x * 10_000.0).round() / 10_000.0
}

fn preview(s: &str) -> String {
    if s.chars().count() <= PREVIEW_CHARS {
        s.to_string()
    } else {
        s.chars().take(PREVIEW_CHARS).collect()
    }
}

/// Deterministic embedding that needs no model: each lowercase word token
/// contributes a signed unit at a SHA3-derived dimension, then the whole
/// vector is L2-normalized.
pub fn hash_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; HASH_DIM];

    let lowered = text.to_lowercase();
    let tokens = lowered
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .take(HASH_MAX_TOKENS);

    for token in tokens {
        let digest = Sha3_256::digest(token.as_bytes());
        let index = (digest[0] as usize) % HASH_DIM;
        let sign = if digest[1] & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign;
    }

    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

/// Cosine similarity; -1.0 for empty, mismatched, or zero-norm vectors so
/// degenerate entries can never clear the retrieval threshold.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return -1.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return -1.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::ScriptedBackend;
    use serde_json::json;

    fn memory_at(path: PathBuf, backend: ScriptedBackend) -> ExperienceMemory {
        ExperienceMemory::new(Arc::new(backend), path, 500)
    }

    #[test]
    fn test_cosine_identity_and_bounds() {
        let v = vec![0.5, -0.3, 0.8];
        let s = cosine_similarity(&v, &v);
        assert!((s - 1.0).abs() < 1e-6);

        let w = vec![-0.5, 0.3, -0.8];
        assert!((cosine_similarity(&v, &w) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_symmetry() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![0.2, -0.7, 0.1];
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), -1.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), -1.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), -1.0);
    }

    #[test]
    fn test_hash_embedding_deterministic() {
        let a = hash_embedding("list the files in the workspace");
        let b = hash_embedding("list the files in the workspace");
        assert_eq!(a, b);
        assert_eq!(a.len(), HASH_DIM);
    }

    #[test]
    fn test_hash_embedding_unit_norm() {
        let v = hash_embedding("some task text");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_embedding_empty_text_is_zero() {
        let v = hash_embedding("");
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_hash_embedding_case_insensitive() {
        assert_eq!(hash_embedding("List Files"), hash_embedding("list files"));
    }

    #[tokio::test]
    async fn test_add_then_retrieve_same_task() {
        let dir = tempfile::tempdir().unwrap();
        let memory = memory_at(dir.path().join("memory.jsonl"), ScriptedBackend::new());

        let result = ToolResult::ok(json!({"count": 3}));
        memory
            .add("list files in the project", "list_directory", &json!({"path": "."}), &result)
            .await;

        let hits = memory.retrieve("list files in the project", 2).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tool_name, "list_directory");
    }

    #[tokio::test]
    async fn test_retrieve_skips_unrelated_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let memory = memory_at(dir.path().join("memory.jsonl"), ScriptedBackend::new());

        let result = ToolResult::ok(json!({}));
        memory
            .add("compile the kernel module", "shell", &json!({"cmd": "ls"}), &result)
            .await;

        let hits = memory.retrieve("bake a chocolate cake recipe", 2).await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.jsonl");

        {
            let memory = memory_at(path.clone(), ScriptedBackend::new());
            memory
                .add("check git status", "git", &json!({"action": "status"}), &ToolResult::ok(json!({})))
                .await;
        }

        let reopened = memory_at(path, ScriptedBackend::new());
        assert_eq!(reopened.len().await, 1);
        let hits = reopened.retrieve("check git status", 1).await;
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.jsonl");
        std::fs::write(&path, "not json at all\n").unwrap();

        let memory = memory_at(path, ScriptedBackend::new());
        memory
            .add("some task", "shell", &json!({"cmd": "pwd"}), &ToolResult::ok(json!({})))
            .await;
        assert_eq!(memory.len().await, 1);
    }

    #[tokio::test]
    async fn test_cache_bounded_by_max_entries() {
        let dir = tempfile::tempdir().unwrap();
        let memory = ExperienceMemory::new(
            Arc::new(ScriptedBackend::new()),
            dir.path().join("memory.jsonl"),
            3,
        );

        for i in 0..5 {
            memory
                .add(&format!("task number {}", i), "shell", &json!({}), &ToolResult::ok(json!({})))
                .await;
        }
        assert_eq!(memory.len().await, 3);
    }

    #[tokio::test]
    async fn test_backend_embeddings_are_quantized() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new().with_embedding(vec![0.123456789, -0.987654321]);
        let memory = ExperienceMemory::new(Arc::new(backend), dir.path().join("m.jsonl"), 10);

        memory
            .add("quantize me", "shell", &json!({}), &ToolResult::ok(json!({})))
            .await;
        let hits = memory.retrieve("quantize me", 1).await;
        assert_eq!(hits[0].embedding, vec![0.1235, -0.9877]);
    }
}
