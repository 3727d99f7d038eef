//! Tool schemas exposed to the backend.
//!
//! JSON-Schema-shaped definitions for the fixed tool set. Accepted actions
//! and HTTP methods are enumerated as closed sets so the model cannot invent
//! new ones.

use serde_json::{json, Value};

/// All tool definitions, in the wire format Ollama expects.
pub fn tool_schemas() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": "shell",
                "description": "Run a safe shell command (ls, cat, grep, find, python, npm, ...). Destructive commands, privilege escalation, and output redirection are rejected.",
                "parameters": {
                    "type": "object",
                    "required": ["cmd"],
                    "properties": {
                        "cmd": {
                            "type": "string",
                            "description": "The command to run, e.g. 'ls -la' or 'cat notes.txt'"
                        }
                    }
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "read_file",
                "description": "Read a UTF-8 text file inside the workspace.",
                "parameters": {
                    "type": "object",
                    "required": ["path"],
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Workspace-relative path of the file to read"
                        }
                    }
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "write_file",
                "description": "Write content to a file inside the workspace (creates or overwrites).",
                "parameters": {
                    "type": "object",
                    "required": ["path", "content"],
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Workspace-relative path of the file to write"
                        },
                        "content": {
                            "type": "string",
                            "description": "Content to write"
                        }
                    }
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "list_directory",
                "description": "List files and directories at a workspace-relative path.",
                "parameters": {
                    "type": "object",
                    "required": ["path"],
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Directory to list ('.' for the workspace root)"
                        }
                    }
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "http_request",
                "description": "Make an HTTP request and return status and body.",
                "parameters": {
                    "type": "object",
                    "required": ["method", "url"],
                    "properties": {
                        "method": {
                            "type": "string",
                            "enum": ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD"],
                            "description": "HTTP method"
                        },
                        "url": {
                            "type": "string",
                            "description": "Full URL (https://...)"
                        },
                        "headers": {
                            "type": "object",
                            "description": "Optional request headers"
                        },
                        "body": {
                            "description": "Optional request body (JSON object or raw string)"
                        }
                    }
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "git",
                "description": "Run a git operation in the workspace.",
                "parameters": {
                    "type": "object",
                    "required": ["action"],
                    "properties": {
                        "action": {
                            "type": "string",
                            "enum": ["status", "log", "diff", "branch", "add", "commit",
                                     "push", "pull", "checkout", "stash", "fetch", "remote", "tag"],
                            "description": "Git operation to perform"
                        },
                        "message": {
                            "type": "string",
                            "description": "Commit message (required for action='commit')"
                        },
                        "branch": {
                            "type": "string",
                            "description": "Branch name (for push, pull, checkout, fetch)"
                        },
                        "files": {
                            "type": "string",
                            "description": "Pathspec for action='add' (default '.')"
                        }
                    }
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "docker",
                "description": "Run a docker or docker-compose operation.",
                "parameters": {
                    "type": "object",
                    "required": ["action"],
                    "properties": {
                        "action": {
                            "type": "string",
                            "enum": ["ps", "images", "logs", "compose_up", "compose_down",
                                     "compose_ps", "compose_logs"],
                            "description": "Docker operation to perform"
                        },
                        "service": {
                            "type": "string",
                            "description": "Container/service name (required for logs)"
                        },
                        "detach": {
                            "type": "boolean",
                            "description": "Run compose_up in the background (default true)"
                        }
                    }
                }
            }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas_cover_fixed_tool_set() {
        let names: Vec<String> = tool_schemas()
            .iter()
            .map(|t| t["function"]["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "shell", "read_file", "write_file", "list_directory",
                "http_request", "git", "docker"
            ]
        );
    }

    #[test]
    fn test_http_methods_are_closed_set() {
        let schemas = tool_schemas();
        let methods = &schemas[4]["function"]["parameters"]["properties"]["method"]["enum"];
        assert_eq!(methods.as_array().unwrap().len(), 6);
    }
}
