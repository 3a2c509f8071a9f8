// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model re-exports and row conversion helpers.
//!
//! The canonical entity types live in `corral-core::types`; this module
//! re-exports them and provides the string conversions used by every query
//! module. Timestamps are stored as RFC 3339 strings with millisecond
//! precision, which sort lexicographically.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

pub use corral_core::types::{
    Binding, CachedMessage, InboundMessage, PendingMessage, PendingStatus, Platform, RelayRun,
    RunStatus,
};

/// Format a timestamp for storage.
pub(crate) fn ts_to_db(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp, mapping failure to a rusqlite conversion error.
pub(crate) fn ts_from_db(idx: usize, raw: String) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

/// Parse a stored enum string (platform, status) via `FromStr`.
pub(crate) fn enum_from_db<T>(idx: usize, raw: String) -> Result<T, rusqlite::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
