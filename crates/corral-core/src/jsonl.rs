// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capped append-only JSONL logs.
//!
//! One JSON object per line. Appends hold an advisory exclusive lock on the
//! file so the relay process and CLI invocations never interleave writes.
//! When the cap is exceeded the oldest lines fall off the front.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use fs4::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::CorralError;

fn io_err(context: &str, e: std::io::Error) -> CorralError {
    CorralError::Internal(format!("{context}: {e}"))
}

/// Append one entry, evicting oldest lines beyond `cap`.
pub fn append_capped<T: Serialize>(path: &Path, entry: &T, cap: usize) -> Result<(), CorralError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| io_err("jsonl dir", e))?;
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| io_err("jsonl open", e))?;
    file.lock_exclusive().map_err(|e| io_err("jsonl lock", e))?;

    let result = append_locked(&mut file, entry, cap);
    let _ = file.unlock();
    result
}

fn append_locked<T: Serialize>(
    file: &mut std::fs::File,
    entry: &T,
    cap: usize,
) -> Result<(), CorralError> {
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| io_err("jsonl read", e))?;

    let line = serde_json::to_string(entry)
        .map_err(|e| CorralError::Internal(format!("jsonl encode: {e}")))?;

    let mut lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    lines.push(&line);
    if lines.len() > cap {
        let drop = lines.len() - cap;
        lines.drain(..drop);
    }

    let mut rewritten = lines.join("\n");
    rewritten.push('\n');
    file.seek(SeekFrom::Start(0)).map_err(|e| io_err("jsonl seek", e))?;
    file.set_len(0).map_err(|e| io_err("jsonl truncate", e))?;
    file.write_all(rewritten.as_bytes())
        .map_err(|e| io_err("jsonl write", e))?;
    Ok(())
}

/// Read all entries; malformed lines are skipped with a warning.
pub fn read_entries<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, CorralError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path).map_err(|e| io_err("jsonl read", e))?;
    let mut entries = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line = idx + 1, error = %e, path = %path.display(), "skipping malformed jsonl line"),
        }
    }
    Ok(entries)
}
