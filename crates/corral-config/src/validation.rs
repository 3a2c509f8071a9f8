// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation of configuration values.

use corral_core::CorralError;

use crate::model::CorralConfig;

/// Validate cross-field constraints that serde defaults cannot express.
pub fn validate_config(config: &CorralConfig) -> Result<(), CorralError> {
    if config.pool.max_concurrent == 0 {
        return Err(CorralError::Config(
            "pool.max_concurrent must be at least 1".into(),
        ));
    }
    if config.pool.max_queue_depth == 0 {
        return Err(CorralError::Config(
            "pool.max_queue_depth must be at least 1".into(),
        ));
    }
    if config.retention.interval_minutes == 0 {
        return Err(CorralError::Config(
            "retention.interval_minutes must be at least 1".into(),
        ));
    }
    if config.retention.cold_days >= config.retention.expired_days {
        return Err(CorralError::Config(format!(
            "retention.cold_days ({}) must be less than retention.expired_days ({})",
            config.retention.cold_days, config.retention.expired_days
        )));
    }
    if config.engine.command.is_empty() {
        return Err(CorralError::Config(
            "engine.command must name the agent program".into(),
        ));
    }
    for (name, entry) in &config.projects {
        if entry.path.is_empty() {
            return Err(CorralError::Config(format!(
                "projects.{name}.path must not be empty"
            )));
        }
    }
    for schedule in &config.schedules {
        if !config.projects.contains_key(&schedule.project) {
            return Err(CorralError::Config(format!(
                "schedule references unknown project: {}",
                schedule.project
            )));
        }
    }
    Ok(())
}
