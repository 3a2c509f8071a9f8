// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool-use policy implementations.

use std::path::{Path, PathBuf};

use tracing::warn;

use corral_core::ToolPolicy;
use corral_core::types::PolicyDecision;

/// Allows every tool invocation unchanged. Used for tests and for projects
/// that opt out of confinement.
pub struct PermissivePolicy;

impl ToolPolicy for PermissivePolicy {
    fn check(&self, _tool_name: &str, _input: &serde_json::Value) -> PolicyDecision {
        PolicyDecision::Allow {
            rewritten_input: None,
        }
    }
}

/// Confines file operations to the project directory and optionally wraps
/// shell commands in a network-isolated sandbox prefix.
pub struct PathRestrictedPolicy {
    project_dir: PathBuf,
    network_isolation: bool,
}

/// Tools whose `path`/`file_path` input must stay inside the project.
const FILE_TOOLS: &[&str] = &["read_file", "write_file", "edit_file", "list_dir", "glob"];

/// Sandbox prefix used when network isolation is on.
const SANDBOX_PREFIX: &str = "unshare -n --map-root-user";

impl PathRestrictedPolicy {
    pub fn new(project_dir: impl Into<PathBuf>, network_isolation: bool) -> Self {
        Self {
            project_dir: project_dir.into(),
            network_isolation,
        }
    }

    fn path_is_confined(&self, raw: &str) -> bool {
        let path = Path::new(raw);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        };
        // Normalize away `..` components without touching the filesystem;
        // the target may not exist yet.
        let mut normalized = PathBuf::new();
        for component in absolute.components() {
            match component {
                std::path::Component::ParentDir => {
                    if !normalized.pop() {
                        return false;
                    }
                }
                std::path::Component::CurDir => {}
                other => normalized.push(other),
            }
        }
        normalized.starts_with(&self.project_dir)
    }
}

impl ToolPolicy for PathRestrictedPolicy {
    fn check(&self, tool_name: &str, input: &serde_json::Value) -> PolicyDecision {
        if FILE_TOOLS.contains(&tool_name) {
            let raw = input
                .get("path")
                .or_else(|| input.get("file_path"))
                .and_then(|v| v.as_str());
            match raw {
                Some(raw) if self.path_is_confined(raw) => {}
                Some(raw) => {
                    warn!(tool = %tool_name, path = %raw, "tool path outside project denied");
                    return PolicyDecision::Deny {
                        reason: format!("path {raw} is outside the project directory"),
                    };
                }
                None => {
                    return PolicyDecision::Deny {
                        reason: format!("{tool_name} invocation carries no path"),
                    };
                }
            }
        }

        if tool_name == "bash"
            && self.network_isolation
            && let Some(command) = input.get("command").and_then(|v| v.as_str())
        {
            let mut rewritten = input.clone();
            rewritten["command"] =
                serde_json::Value::String(format!("{SANDBOX_PREFIX} {command}"));
            return PolicyDecision::Allow {
                rewritten_input: Some(rewritten),
            };
        }

        PolicyDecision::Allow {
            rewritten_input: None,
        }
    }
}
