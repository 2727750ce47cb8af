//! Configuration surface consumed by the engine. Loaded from
//! `~/.ctxd/prefetch.toml` if present, else built from defaults, then
//! overridden by a fixed set of environment variables. Config loading must
//! never be fatal to daemon startup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuleConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
    pub max_size_kb: usize,
    pub max_files: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub enabled: bool,
    pub cache_ttl_ms: u64,
    pub cache_max_entries: usize,
    pub max_parallel: usize,
    pub branch_diff: RuleConfig,
    pub recent_commit: RuleConfig,
    pub common_files: RuleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_ttl_ms: 5 * 60 * 1000,
            cache_max_entries: 100,
            max_parallel: 3,
            branch_diff: RuleConfig {
                enabled: true,
                timeout_ms: 1000,
                max_size_kb: 50,
                max_files: 0,
            },
            recent_commit: RuleConfig {
                enabled: true,
                timeout_ms: 500,
                max_size_kb: 20,
                max_files: 0,
            },
            common_files: RuleConfig {
                enabled: true,
                timeout_ms: 500,
                max_size_kb: 0,
                max_files: 3,
            },
        }
    }
}

impl Default for RuleConfig {
    fn default() -> Self {
        Config::default().branch_diff
    }
}

/// Directory holding the engine's own config file (`~/.ctxd/`).
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .expect("Cannot find home directory")
        .join(".ctxd")
}

pub fn config_file() -> PathBuf {
    config_dir().join("prefetch.toml")
}

/// Load configuration from the default location, falling back to compiled-in
/// defaults on any error, then apply environment variable overrides.
pub fn load_or_default() -> Config {
    let path = config_file();
    let mut config = match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse prefetch config, using defaults");
                Config::default()
            }
        },
        Err(_) => Config::default(),
    };

    apply_env_overrides(&mut config);
    config
}

fn apply_env_overrides(config: &mut Config) {
    override_bool(&mut config.enabled, "CTXD_PREFETCH_ENABLED");
    override_u64(&mut config.cache_ttl_ms, "CTXD_PREFETCH_CACHE_TTL_MS");
    override_usize(&mut config.cache_max_entries, "CTXD_PREFETCH_CACHE_MAX_ENTRIES");
    override_usize(&mut config.max_parallel, "CTXD_PREFETCH_MAX_PARALLEL");

    apply_rule_env_overrides(&mut config.branch_diff, "BRANCH_DIFF");
    apply_rule_env_overrides(&mut config.recent_commit, "RECENT_COMMIT");
    apply_rule_env_overrides(&mut config.common_files, "COMMON_FILES");
}

fn apply_rule_env_overrides(rule: &mut RuleConfig, prefix: &str) {
    override_bool(&mut rule.enabled, &format!("CTXD_PREFETCH_RULE_{prefix}_ENABLED"));
    override_u64(&mut rule.timeout_ms, &format!("CTXD_PREFETCH_RULE_{prefix}_TIMEOUT_MS"));
    override_usize(&mut rule.max_size_kb, &format!("CTXD_PREFETCH_RULE_{prefix}_MAX_SIZE_KB"));
    override_usize(&mut rule.max_files, &format!("CTXD_PREFETCH_RULE_{prefix}_MAX_FILES"));
}

fn override_bool(field: &mut bool, var: &str) {
    if let Ok(raw) = std::env::var(var) {
        match raw.trim().parse::<bool>() {
            Ok(v) => *field = v,
            Err(_) => tracing::warn!(var, value = raw, "ignoring unparseable bool override"),
        }
    }
}

fn override_u64(field: &mut u64, var: &str) {
    if let Ok(raw) = std::env::var(var) {
        match raw.trim().parse::<u64>() {
            Ok(v) => *field = v,
            Err(_) => tracing::warn!(var, value = raw, "ignoring unparseable integer override"),
        }
    }
}

fn override_usize(field: &mut usize, var: &str) {
    if let Ok(raw) = std::env::var(var) {
        match raw.trim().parse::<usize>() {
            Ok(v) => *field = v,
            Err(_) => tracing::warn!(var, value = raw, "ignoring unparseable integer override"),
        }
    }
}
