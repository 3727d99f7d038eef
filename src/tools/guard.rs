//! Containment checks for the tool boundary.
//!
//! Path containment keeps every filesystem operation inside the workspace
//! root; command validation keeps the shell tool on the allowlist and off
//! the forbidden patterns. Both reject before any I/O occurs.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Resolve `requested` against the canonicalized workspace root, rejecting
/// absolute paths, `..` escapes, and symlink tricks before any I/O.
///
/// For targets that do not exist yet (a fresh `write_file` path), the
/// deepest existing ancestor is canonicalized and checked instead; the
/// remaining components are already lexically normalized so they cannot
/// climb back out.
pub fn contain_path(root: &Path, requested: &str) -> Result<PathBuf, String> {
    if requested.is_empty() {
        return Err("Path must not be empty".to_string());
    }

    let req = Path::new(requested);
    if req.is_absolute() {
        return Err(format!(
            "Path escape blocked: '{}' is absolute; paths must be relative to the workspace",
            requested
        ));
    }

    // Lexical normalization: a `..` that pops past the workspace root is an
    // escape even if the final path would wander back inside.
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in req.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(p) => parts.push(p),
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(format!(
                        "Path escape blocked: '{}' resolves outside the workspace",
                        requested
                    ));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!(
                    "Path escape blocked: '{}' is not a relative path",
                    requested
                ));
            }
        }
    }

    let mut joined = root.to_path_buf();
    for p in &parts {
        joined.push(p);
    }

    // Symlink check: canonicalize the path itself if it exists, otherwise
    // its deepest existing ancestor, and require the result to stay under
    // the root.
    let mut probe = joined.clone();
    let mut remainder: Vec<std::ffi::OsString> = Vec::new();
    loop {
        match probe.canonicalize() {
            Ok(resolved) => {
                if !resolved.starts_with(root) {
                    return Err(format!(
                        "Path escape blocked: '{}' resolves outside the workspace",
                        requested
                    ));
                }
                let mut out = resolved;
                for r in remainder.iter().rev() {
                    out.push(r);
                }
                return Ok(out);
            }
            Err(_) => match (probe.parent(), probe.file_name()) {
                (Some(parent), Some(name)) => {
                    remainder.push(name.to_os_string());
                    probe = parent.to_path_buf();
                }
                _ => {
                    return Err(format!(
                        "Path escape blocked: cannot resolve '{}'",
                        requested
                    ))
                }
            },
        }
    }
}

/// Validate a raw shell command string and split it into an argument vector.
///
/// Order matters: the forbidden-substring scan runs on the raw string before
/// tokenization, so a forbidden fragment is rejected even when buried inside
/// an otherwise-allowed command. The returned tokens are executed directly
/// as a process argument vector -- never through a shell interpreter -- so
/// metacharacters like `;` and `|` are inert by construction.
pub fn validate_command(
    raw: &str,
    allowed: &HashSet<String>,
    forbidden: &[String],
) -> Result<Vec<String>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("Empty command".to_string());
    }

    let lowered = raw.to_lowercase();
    for pattern in forbidden {
        if lowered.contains(&pattern.to_lowercase()) {
            return Err(format!("Forbidden pattern detected: '{}'", pattern));
        }
    }

    let tokens = shlex::split(raw)
        .ok_or_else(|| "Malformed command: unbalanced quoting".to_string())?;
    if tokens.is_empty() {
        return Err("Empty command after parsing".to_string());
    }

    let base = Path::new(&tokens[0])
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if base.is_empty() || !allowed.contains(&base) {
        return Err(format!("Command '{}' not in allowlist", base));
    }

    Ok(tokens)
}
