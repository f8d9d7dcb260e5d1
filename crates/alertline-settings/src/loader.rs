//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`AlertlineSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `ALERTLINE_*` overrides (highest priority)
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
use crate::types::AlertlineSettings;

/// Resolve the path to the settings file (`~/.alertline/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".alertline").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<AlertlineSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a value that fails
/// validation is an error.
pub fn load_settings_from_path(path: &Path) -> Result<AlertlineSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

fn load_with_env<F>(path: &Path, env: F) -> Result<AlertlineSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(AlertlineSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: AlertlineSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, &EnvReader { lookup: env });
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

/// Apply `ALERTLINE_*` overrides to loaded settings.
///
/// Integers must parse and fall within range; booleans accept
/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`. Invalid values are
/// logged and ignored.
fn apply_overrides<F>(settings: &mut AlertlineSettings, env: &EnvReader<F>)
where
    F: Fn(&str) -> Option<String>,
{
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("ALERTLINE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("ALERTLINE_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("ALERTLINE_PATH") {
        settings.server.path = v;
    }
    if let Some(v) = env.u64("ALERTLINE_BROADCAST_INTERVAL_MS", 10, 3_600_000) {
        settings.server.broadcast_interval_ms = v;
    }

    // ── Client ──────────────────────────────────────────────────────
    if let Some(v) = env.string("ALERTLINE_URL") {
        settings.client.url = v;
    }
    if let Some(v) = env.u64("ALERTLINE_RECONNECT_DELAY_MS", 0, 600_000) {
        settings.client.reconnect_delay_ms = v;
    }
    if let Some(v) = env.u32("ALERTLINE_MAX_RECONNECT_ATTEMPTS", 0, 1_000) {
        settings.client.max_reconnect_attempts = v;
    }
    if let Some(v) = env.usize("ALERTLINE_STORE_CAPACITY", 1, 100_000) {
        settings.client.store_capacity = v;
    }
    if let Some(v) = env.bool("ALERTLINE_DEMO_ENABLED") {
        settings.client.demo_enabled = v;
    }
    if let Some(v) = env.u64("ALERTLINE_DEMO_INTERVAL_MS", 10, 3_600_000) {
        settings.client.demo_interval_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("ALERTLINE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("ALERTLINE_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
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

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
    }

    fn string(&self, name: &str) -> Option<String> {
        self.raw(name).filter(|v| !v.is_empty())
    }

    fn checked<T>(
        &self,
        name: &str,
        kind: &str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Option<T> {
        let val = self.raw(name)?;
        let result = parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.checked(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.checked(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        self.checked(name, "u32", |v| parse_u32_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.checked(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.checked(name, "usize", |v| parse_usize_range(v, min, max))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::errors::SettingsError;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    // ── deep_merge ──────────────────────────────────────────────────────

    #[test]
    fn deep_merge_nested_objects() {
        let target = json!({"server": {"port": 5566, "path": "/alerts"}});
        let source = json!({"server": {"port": 9000}});
        let result = deep_merge(target, source);
        assert_eq!(result["server"]["port"], 9000);
        assert_eq!(result["server"]["path"], "/alerts");
    }

    #[test]
    fn deep_merge_null_skipped() {
        let target = json!({"a": 1, "b": 2});
        let source = json!({"a": null, "b": 3});
        let result = deep_merge(target, source);
        assert_eq!(result["a"], 1);
        assert_eq!(result["b"], 3);
    }

    #[test]
    fn deep_merge_arrays_replaced() {
        let target = json!({"items": [1, 2, 3]});
        let source = json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], json!([4]));
    }

    #[test]
    fn deep_merge_adds_new_keys() {
        let result = deep_merge(json!({"a": 1}), json!({"b": 2}));
        assert_eq!(result, json!({"a": 1, "b": 2}));
    }

    // ── file loading ────────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_with_env(&dir.path().join("nope.json"), no_env).unwrap();
        assert_eq!(settings.server.port, 5566);
        assert_eq!(settings.client.store_capacity, 100);
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"broadcastIntervalMs": 1000}, "client": {"demoEnabled": true}}"#,
        )
        .unwrap();

        let settings = load_with_env(&path, no_env).unwrap();
        assert_eq!(settings.server.broadcast_interval_ms, 1000);
        assert_eq!(settings.server.port, 5566);
        assert!(settings.client.demo_enabled);
        assert_eq!(settings.client.reconnect_delay_ms, 3000);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_matches!(load_with_env(&path, no_env), Err(SettingsError::Json(_)));
    }

    #[test]
    fn invalid_value_in_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"client": {"storeCapacity": 0}}"#).unwrap();
        assert_matches!(load_with_env(&path, no_env), Err(SettingsError::InvalidValue(_)));
    }

    // ── env overrides ───────────────────────────────────────────────────

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 7000}}"#).unwrap();

        let env = env_of(&[
            ("ALERTLINE_PORT", "7100"),
            ("ALERTLINE_URL", "ws://alerts.internal:7100/alerts"),
            ("ALERTLINE_MAX_RECONNECT_ATTEMPTS", "2"),
            ("ALERTLINE_DEMO_ENABLED", "yes"),
            ("ALERTLINE_LOG_JSON", "on"),
        ]);
        let settings = load_with_env(&path, env).unwrap();
        assert_eq!(settings.server.port, 7100);
        assert_eq!(settings.client.url, "ws://alerts.internal:7100/alerts");
        assert_eq!(settings.client.max_reconnect_attempts, 2);
        assert!(settings.client.demo_enabled);
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = AlertlineSettings::default();
        let env = EnvReader {
            lookup: env_of(&[
                ("ALERTLINE_PORT", "not-a-port"),
                ("ALERTLINE_STORE_CAPACITY", "0"),
                ("ALERTLINE_DEMO_ENABLED", "maybe"),
                ("ALERTLINE_BROADCAST_INTERVAL_MS", "5"),
            ]),
        };
        apply_overrides(&mut settings, &env);
        assert_eq!(settings.server.port, 5566);
        assert_eq!(settings.client.store_capacity, 100);
        assert!(!settings.client.demo_enabled);
        assert_eq!(settings.server.broadcast_interval_ms, 4000);
    }

    #[test]
    fn empty_string_env_is_ignored() {
        let mut settings = AlertlineSettings::default();
        let env = EnvReader {
            lookup: env_of(&[("ALERTLINE_HOST", ""), ("ALERTLINE_LOG_LEVEL", "")]),
        };
        apply_overrides(&mut settings, &env);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.logging.level, "info");
    }

    // ── parse helpers ───────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for t in ["true", "TRUE", "1", "yes", "On"] {
            assert_eq!(parse_bool(t), Some(true), "{t}");
        }
        for f in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(f), Some(false), "{f}");
        }
        assert_eq!(parse_bool("2"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u32_range("5", 0, 1000), Some(5));
        assert_eq!(parse_u32_range("-1", 0, 1000), None);
        assert_eq!(parse_u64_range("3000", 0, 600_000), Some(3000));
        assert_eq!(parse_u64_range("700000", 0, 600_000), None);
        assert_eq!(parse_usize_range("100", 1, 100_000), Some(100));
        assert_eq!(parse_usize_range("0", 1, 100_000), None);
        assert_eq!(parse_usize_range("abc", 1, 10), None);
    }
}
