//! Task context assembly.
//!
//! Builds the workspace summary prepended to every task and renders
//! recalled memories as few-shot guidance.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

use crate::types::MemoryEntry;

/// Directory entries shown in the workspace summary.
const MAX_LISTED_ENTRIES: usize = 15;

/// Timeout for the git branch probe.
const GIT_PROBE_SECS: u64 = 5;

/// A human-readable snapshot of the workspace: path, user, a bounded
/// directory listing, and the current git branch when one exists.
pub async fn workspace_summary(workspace: &Path) -> String {
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());

    let mut lines = vec![
        format!("Workspace: {}", workspace.display()),
        format!("User: {}", user),
    ];

    let mut names: Vec<String> = std::fs::read_dir(workspace)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| {
                    let name = e.file_name().to_string_lossy().to_string();
                    if e.path().is_dir() {
                        format!("{}/", name)
                    } else {
                        name
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    names.sort();

    if names.is_empty() {
        lines.push("Contents: (empty)".to_string());
    } else {
        let total = names.len();
        names.truncate(MAX_LISTED_ENTRIES);
        let mut listing = names.join(", ");
        if total > MAX_LISTED_ENTRIES {
            listing.push_str(&format!(", ... ({} total)", total));
        }
        lines.push(format!("Contents: {}", listing));
    }

    if let Some(branch) = git_branch(workspace).await {
        lines.push(format!("Git branch: {}", branch));
    }

    lines.join("\n")
}

/// Current branch via `git branch --show-current`, or None when the
/// workspace is not a repository, git is missing, or the probe times out.
async fn git_branch(workspace: &Path) -> Option<String> {
    let fut = Command::new("git")
        .args(["branch", "--show-current"])
        .current_dir(workspace)
        .output();

    let output = tokio::time::timeout(Duration::from_secs(GIT_PROBE_SECS), fut)
        .await
        .ok()?
        .ok()?;

    if !output.status.success() {
        return None;
    }
    let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if branch.is_empty() {
        None
    } else {
        Some(branch)
    }
}

/// Render recalled successes as few-shot guidance, or an empty string when
/// there is nothing to recall.
pub fn render_memories(entries: &[MemoryEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let mut out = String::from("Similar past successes (reuse what worked):\n");
    for entry in entries {
        out.push_str(&format!(
            "- Task: {}\n  Tool: {} with arguments {}\n",
            entry.task, entry.tool_name, entry.tool_args
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_summary_lists_entries_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();

        let summary = workspace_summary(dir.path()).await;
        assert!(summary.contains("Contents: a/, b.txt"));
    }

    #[tokio::test]
    async fn test_summary_empty_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let summary = workspace_summary(dir.path()).await;
        assert!(summary.contains("Contents: (empty)"));
    }

    #[tokio::test]
    async fn test_summary_caps_listing() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..20 {
            std::fs::write(dir.path().join(format!("f{:02}.txt", i)), "").unwrap();
        }
        let summary = workspace_summary(dir.path()).await;
        assert!(summary.contains("(20 total)"));
        assert!(!summary.contains("f15.txt"));
    }

    #[test]
    fn test_render_memories_empty() {
        assert_eq!(render_memories(&[]), "");
    }

    #[test]
    fn test_render_memories_includes_tool_and_args() {
        let entry = MemoryEntry {
            id: "x".to_string(),
            ts: 0.0,
            task: "count files".to_string(),
            tool_name: "list_directory".to_string(),
            tool_args: json!({"path": "."}),
            result_preview: String::new(),
            embedding: vec![],
        };
        let rendered = render_memories(&[entry]);
        assert!(rendered.contains("count files"));
        assert!(rendered.contains("list_directory"));
        assert!(rendered.contains("\"path\":\".\""));
    }
}
