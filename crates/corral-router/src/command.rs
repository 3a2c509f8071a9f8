// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command classification for inbound chat text.
//!
//! Three equivalent spellings are accepted, case-insensitively:
//! `/corral-status`, `/corral status`, and `!status`. Anything else is
//! free-form chat and is not a command.

/// A parsed relay command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Where,
    Status,
    Cost,
    Projects,
    Cancel,
    New,
    /// `bind <project>`; `project` is `None` when the argument is missing.
    Bind { project: Option<String> },
    Unbind,
    /// `run [project] <workflow>`; `workflow` is `None` when missing.
    Run {
        project: Option<String>,
        workflow: Option<String>,
    },
    Unknown(String),
}

/// Classify a message as a command or free-form chat (`None`).
pub fn parse_command(text: &str) -> Option<Command> {
    let trimmed = text.trim();
    let mut tokens = trimmed.split_whitespace();
    let first = tokens.next()?;
    let lowered = first.to_lowercase();

    let name: String = if lowered == "/corral" {
        tokens.next()?.to_lowercase()
    } else if let Some(rest) = lowered.strip_prefix("/corral-") {
        if rest.is_empty() {
            return None;
        }
        rest.to_string()
    } else if let Some(rest) = lowered.strip_prefix('!') {
        if rest.is_empty() {
            return None;
        }
        rest.to_string()
    } else {
        return None;
    };

    let args: Vec<&str> = tokens.collect();
    Some(match name.as_str() {
        "help" => Command::Help,
        "where" => Command::Where,
        "status" => Command::Status,
        "cost" => Command::Cost,
        "projects" => Command::Projects,
        "cancel" => Command::Cancel,
        "new" => Command::New,
        "bind" => Command::Bind {
            project: args.first().map(|s| s.to_string()),
        },
        "unbind" => Command::Unbind,
        "run" => match args.as_slice() {
            [] => Command::Run {
                project: None,
                workflow: None,
            },
            [workflow] => Command::Run {
                project: None,
                workflow: Some(workflow.to_string()),
            },
            [project, workflow, ..] => Command::Run {
                project: Some(project.to_string()),
                workflow: Some(workflow.to_string()),
            },
        },
        other => Command::Unknown(other.to_string()),
    })
}
