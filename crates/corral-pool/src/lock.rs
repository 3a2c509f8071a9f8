// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Advisory per-project run lock.
//!
//! A marker file under the lock directory, containing the holder's pid and
//! an ISO timestamp. Every trigger path (CLI run, schedule tick, relay run)
//! acquires the lock before executing the engine, so concurrent triggers on
//! the same project collapse to one run plus "busy" replies. A lock older
//! than the staleness ceiling is assumed to be a crash leftover and broken.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use corral_config::model::LockConfig;
use corral_core::CorralError;

/// Factory for per-project run locks.
pub struct RunLock {
    dir: PathBuf,
    stale: Duration,
}

/// Held lock; removes its marker file when dropped.
pub struct RunLockGuard {
    path: PathBuf,
    project: String,
}

impl RunLock {
    pub fn new(config: &LockConfig) -> Self {
        Self {
            dir: PathBuf::from(&config.lock_dir),
            stale: Duration::from_secs(config.stale_secs),
        }
    }

    fn lock_path(&self, project: &str) -> PathBuf {
        self.dir.join(format!("{project}.lock"))
    }

    /// Try to acquire the lock for a project. `Ok(None)` means another run
    /// holds it; the caller should reply "busy" rather than wait.
    pub fn acquire(&self, project: &str) -> Result<Option<RunLockGuard>, CorralError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| CorralError::Internal(format!("lock dir: {e}")))?;
        let path = self.lock_path(project);

        match self.try_create(&path, project)? {
            Some(guard) => Ok(Some(guard)),
            None => {
                if self.is_stale(&path) {
                    warn!(project = %project, "breaking stale run lock");
                    let _ = fs::remove_file(&path);
                    self.try_create(&path, project)
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn try_create(&self, path: &Path, project: &str) -> Result<Option<RunLockGuard>, CorralError> {
        match fs::OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
                writeln!(file, "{}", std::process::id())
                    .and_then(|_| writeln!(file, "{stamp}"))
                    .map_err(|e| CorralError::Internal(format!("lock write: {e}")))?;
                debug!(project = %project, "run lock acquired");
                Ok(Some(RunLockGuard {
                    path: path.to_path_buf(),
                    project: project.to_string(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(CorralError::Internal(format!("lock create: {e}"))),
        }
    }

    /// Whether a non-stale lock is currently held for the project.
    pub fn is_locked(&self, project: &str) -> bool {
        let path = self.lock_path(project);
        path.exists() && !self.is_stale(&path)
    }

    /// A lock file is stale when its recorded timestamp is older than the
    /// ceiling. Unreadable or garbled files are stale too; a healthy holder
    /// rewrites neither.
    fn is_stale(&self, path: &Path) -> bool {
        let Ok(content) = fs::read_to_string(path) else {
            return true;
        };
        let Some(stamp) = content.lines().nth(1) else {
            return true;
        };
        let Ok(held_at) = DateTime::parse_from_rfc3339(stamp.trim()) else {
            return true;
        };
        let age = Utc::now().signed_duration_since(held_at.with_timezone(&Utc));
        age.to_std().map(|age| age > self.stale).unwrap_or(false)
    }
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(project = %self.project, error = %e, "failed to remove run lock");
        } else {
            debug!(project = %self.project, "run lock released");
        }
    }
}
