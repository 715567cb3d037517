//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`GroupcastSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `GROUPCAST_*` environment overrides
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::GroupcastSettings;

/// Resolve the default settings path (`~/.groupcast/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".groupcast").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<GroupcastSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<GroupcastSettings> {
    load_with(path, |name| std::env::var(name).ok())
}

/// Load from `path`, resolving overrides through `lookup` instead of the
/// process environment.
pub fn load_with(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<GroupcastSettings> {
    let defaults = serde_json::to_value(GroupcastSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: GroupcastSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `GROUPCAST_*` overrides.
///
/// Values that fail to parse or fall outside their range are ignored with a
/// warning, leaving the file/default value in place.
pub fn apply_overrides(settings: &mut GroupcastSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read("GROUPCAST_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("GROUPCAST_PORT")
        .and_then(|v| parsed("GROUPCAST_PORT", &v, parse_u16_range(&v, 0, 65535)))
    {
        settings.server.port = v;
    }
    if let Some(v) = read("GROUPCAST_QUEUE_CAPACITY")
        .and_then(|v| parsed("GROUPCAST_QUEUE_CAPACITY", &v, parse_usize_range(&v, 1, 1_000_000)))
    {
        settings.server.queue_capacity = v;
    }
    if let Some(v) = read("GROUPCAST_DRAIN_TIMEOUT_MS")
        .and_then(|v| parsed("GROUPCAST_DRAIN_TIMEOUT_MS", &v, parse_u64_range(&v, 0, 600_000)))
    {
        settings.server.drain_timeout_ms = v;
    }
    if let Some(v) = read("GROUPCAST_HEARTBEAT_INTERVAL_SECS")
        .and_then(|v| parsed("GROUPCAST_HEARTBEAT_INTERVAL_SECS", &v, parse_u64_range(&v, 1, 3_600)))
    {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = read("GROUPCAST_HEARTBEAT_TIMEOUT_SECS")
        .and_then(|v| parsed("GROUPCAST_HEARTBEAT_TIMEOUT_SECS", &v, parse_u64_range(&v, 2, 86_400)))
    {
        settings.server.heartbeat_timeout_secs = v;
    }
    if let Some(v) = read("GROUPCAST_MAX_MESSAGE_SIZE")
        .and_then(|v| parsed("GROUPCAST_MAX_MESSAGE_SIZE", &v, parse_usize_range(&v, 1, 64 << 20)))
    {
        settings.server.max_message_size = v;
    }
    if let Some(v) = read("GROUPCAST_SHUTDOWN_TIMEOUT_SECS")
        .and_then(|v| parsed("GROUPCAST_SHUTDOWN_TIMEOUT_SECS", &v, parse_u64_range(&v, 0, 3_600)))
    {
        settings.server.shutdown_timeout_secs = v;
    }

    // ── App ─────────────────────────────────────────────────────────
    if let Some(v) = read("GROUPCAST_GROUP") {
        settings.app.group = v;
    }
    if let Some(v) = read("GROUPCAST_GREETING") {
        settings.app.greeting = v;
    }
    if let Some(v) = read("GROUPCAST_ECHO_PREFIX") {
        settings.app.echo_prefix = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read("GROUPCAST_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("GROUPCAST_LOG_FORMAT") {
        match v.parse() {
            Ok(format) => settings.logging.format = format,
            Err(_) => tracing::warn!(key = "GROUPCAST_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

fn parsed<T>(key: &str, raw: &str, value: Option<T>) -> Option<T> {
    if value.is_none() {
        tracing::warn!(key, value = %raw, "invalid numeric env var, ignoring");
    }
    value
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
