// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./corral.toml` > `~/.config/corral/corral.toml` >
//! `/etc/corral/corral.toml` with environment variable overrides via the
//! `CORRAL_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CorralConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/corral/corral.toml` (system-wide)
/// 3. `~/.config/corral/corral.toml` (user XDG config)
/// 4. `./corral.toml` (local directory)
/// 5. `CORRAL_*` environment variables
pub fn load_config() -> Result<CorralConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CorralConfig::default()))
        .merge(Toml::file("/etc/corral/corral.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("corral/corral.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("corral.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from an inline TOML string only (no XDG lookup).
///
/// Used for testing and for callers that already hold the TOML content.
pub fn load_config_from_str(toml_content: &str) -> Result<CorralConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CorralConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CorralConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CorralConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `CORRAL_TELEGRAM_BOT_TOKEN` must map to
/// `telegram.bot_token`, not `telegram.bot.token`.
fn env_provider() -> Env {
    Env::prefixed("CORRAL_").map(|key| {
        // Keys arrive in the variable's original (upper) case.
        let lowered = key.as_str().to_ascii_lowercase();
        let mapped = lowered
            .replacen("relay_", "relay.", 1)
            .replacen("pool_", "pool.", 1)
            .replacen("lock_", "lock.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("context_", "context.", 1)
            .replacen("retention_", "retention.", 1)
            .replacen("notify_", "notify.", 1)
            .replacen("feedback_", "feedback.", 1)
            .replacen("engine_", "engine.", 1)
            .replacen("telegram_", "telegram.", 1);
        mapped.into()
    })
}
