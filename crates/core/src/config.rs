use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => parse_bool(&v).unwrap_or(default),
        None => default,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub engine: EngineConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CELLWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CELLWATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            engine: EngineConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  engine:      lookup_table_ttl={}s, weather_backfill={}, persist_alerts={}",
            self.engine.lookup_table_ttl_secs,
            self.engine.weather_backfill,
            self.engine.persist_alerts,
        );
    }

    /// Return a JSON view of the effective configuration.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "engine": {
                "lookup_table_ttl_secs": self.engine.lookup_table_ttl_secs,
                "weather_backfill": self.engine.weather_backfill,
                "persist_alerts": self.engine.persist_alerts,
            },
        })
    }
}

// ── Trigger engine ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds a cached EMC lookup table stays valid. 0 disables expiry.
    pub lookup_table_ttl_secs: u64,
    /// Ask the weather collaborator to backfill an empty outside window.
    pub weather_backfill: bool,
    /// Default for the per-call `persist_alerts` option.
    pub persist_alerts: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookup_table_ttl_secs: 300,
            weather_backfill: true,
            persist_alerts: true,
        }
    }
}

impl EngineConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            lookup_table_ttl_secs: profiled_env_u64(
                p,
                "LOOKUP_TABLE_TTL_SECS",
                defaults.lookup_table_ttl_secs,
            ),
            weather_backfill: profiled_env_bool(p, "WEATHER_BACKFILL", defaults.weather_backfill),
            persist_alerts: profiled_env_bool(p, "PERSIST_ALERTS", defaults.persist_alerts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" on "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn profiled_lookup_prefers_prefixed_key() {
        // Keys are unique to this test so parallel tests do not interfere.
        env::set_var("CWTEST_LOOKUP_TABLE_TTL_SECS", "42");
        env::set_var("CWTEST_WEATHER_BACKFILL", "false");
        let cfg = EngineConfig::from_env_profiled("CWTEST");
        assert_eq!(cfg.lookup_table_ttl_secs, 42);
        assert!(!cfg.weather_backfill);
        env::remove_var("CWTEST_LOOKUP_TABLE_TTL_SECS");
        env::remove_var("CWTEST_WEATHER_BACKFILL");
    }

    #[test]
    fn summary_uses_default_label_without_profile() {
        let cfg = Config {
            profile: String::new(),
            engine: EngineConfig::default(),
        };
        let summary = cfg.redacted_summary();
        assert_eq!(summary["profile"], "default");
        assert_eq!(summary["engine"]["lookup_table_ttl_secs"], 300);
    }
}
