use crate::types::*;
use std::{
  env,
  fs,
  path::{Path, PathBuf},
};

pub const ENV_BIND_ADDR: &str = "SCOREKEEPER_BIND_ADDR";
pub const ENV_DATA_DIR: &str = "SCOREKEEPER_DATA_DIR";
pub const ENV_BRACKET_PATH: &str = "BRACKET_CONFIG_PATH";
pub const ENV_BROADCAST_URL: &str = "AUDIENCE_BOT_URL";
pub const ENV_MAX_INNINGS: &str = "MAX_INNINGS";
pub const ENV_LOCK_TIMEOUT_MS: &str = "LOCK_TIMEOUT_MS";
pub const ENV_DEDUP_TTL_SECS: &str = "DEDUP_TTL_SECS";

pub fn repo_root() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn resolve_repo_path(raw: &str) -> PathBuf {
  let path = PathBuf::from(raw);
  if path.is_absolute() {
    path
  } else {
    repo_root().join(path)
  }
}

pub fn config_path() -> PathBuf {
  repo_root().join("config.json")
}

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

/// Applies overrides from `lookup` (normally the process environment).
/// Numbers that fail to parse leave the config value alone.
pub fn apply_overrides<F>(mut config: AppConfig, lookup: F) -> AppConfig
where
  F: Fn(&str) -> Option<String>,
{
  if let Some(value) = lookup(ENV_BIND_ADDR) {
    config.bind_addr = value;
  }
  if let Some(value) = lookup(ENV_DATA_DIR) {
    config.data_dir = value;
  }
  if let Some(value) = lookup(ENV_BRACKET_PATH) {
    config.bracket_path = value;
  }
  if let Some(value) = lookup(ENV_BROADCAST_URL) {
    config.broadcast_url = value;
  }
  if let Some(value) = lookup(ENV_MAX_INNINGS).and_then(|raw| parse_number::<u32>(ENV_MAX_INNINGS, &raw)) {
    config.max_innings = value;
  }
  if let Some(value) = lookup(ENV_LOCK_TIMEOUT_MS).and_then(|raw| parse_number::<u64>(ENV_LOCK_TIMEOUT_MS, &raw)) {
    config.lock_timeout_ms = value;
  }
  if let Some(value) = lookup(ENV_DEDUP_TTL_SECS).and_then(|raw| parse_number::<u64>(ENV_DEDUP_TTL_SECS, &raw)) {
    config.dedup_ttl_secs = value;
  }
  if config.max_innings == 0 {
    tracing::warn!("max innings of 0 is not playable, using {DEFAULT_MAX_INNINGS}");
    config.max_innings = DEFAULT_MAX_INNINGS;
  } else if config.max_innings > MAX_INNINGS_LIMIT {
    tracing::warn!(
      "max innings of {} is more than a game can run, using {MAX_INNINGS_LIMIT}",
      config.max_innings
    );
    config.max_innings = MAX_INNINGS_LIMIT;
  }
  config
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Option<T> {
  match raw.parse::<T>() {
    Ok(value) => Some(value),
    Err(_) => {
      tracing::warn!("{key}={raw} is not a whole number, ignoring it");
      None
    }
  }
}

pub fn apply_env_overrides(config: AppConfig) -> AppConfig {
  apply_overrides(config, env_default)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig, String> {
  if !path.is_file() {
    return Ok(AppConfig::default());
  }
  let data = fs::read_to_string(path).map_err(|e| format!("read config {}: {e}", path.display()))?;
  serde_json::from_str::<AppConfig>(&data).map_err(|e| format!("parse config {}: {e}", path.display()))
}

pub fn load_config_inner() -> Result<AppConfig, String> {
  load_config_from(&config_path()).map(apply_env_overrides)
}

pub fn load_env_file() {
  let env_path = repo_root().join(".env");
  if !env_path.is_file() {
    return;
  }
  let contents = match fs::read_to_string(&env_path) {
    Ok(data) => data,
    Err(_) => return,
  };
  for line in contents.lines() {
    if let Some((key, value)) = parse_env_line(line) {
      if env::var_os(&key).is_none() {
        env::set_var(key, value);
      }
    }
  }
}

pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let trimmed = line.trim();
  if trimmed.is_empty() || trimmed.starts_with('#') {
    return None;
  }
  let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
  let (key, raw_value) = trimmed.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  let mut value = raw_value.trim();
  if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if let Some(idx) = value.find('#') {
    value = value[..idx].trim_end();
  }
  Some((key.to_string(), value.to_string()))
}

pub fn log_env_warnings(config: &AppConfig) {
  let mut warnings = Vec::new();

  if config.bracket_path.trim().is_empty() {
    warnings.push("BRACKET_CONFIG_PATH not set and no bracket path in config; matches are only created by start commands");
  }
  if config.broadcast_url.trim().is_empty() {
    warnings.push("AUDIENCE_BOT_URL not set and no broadcast URL in config; broadcasts will not be relayed");
  }

  for msg in warnings {
    tracing::warn!("{}", msg);
  }
}
