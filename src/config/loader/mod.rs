use crate::config::{Config, Transport};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

/// Load configuration: optional JSON file, then environment overrides,
/// then validation. Missing file means defaults + env only.
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config JSON from {}", path.display()))?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config);

    // Interval floor, matching the monitor loop's minimum cadence
    if config.health.check_interval_secs < 5 {
        warn!(
            "health.checkInterval {}s below minimum, clamping to 5s",
            config.health.check_interval_secs
        );
        config.health.check_interval_secs = 5;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e.to_string()))
        .context("Configuration validation failed")?;

    Ok(config)
}

/// Environment variables win over the config file.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(raw) = std::env::var("TRANSPORT") {
        match raw.to_lowercase().as_str() {
            "stdio" => config.server.transport = Transport::Stdio,
            "http" => config.server.transport = Transport::Http,
            other => warn!("ignoring unknown TRANSPORT value {:?}", other),
        }
    }
    if let Ok(host) = std::env::var("HOST") {
        config.server.host = host;
    }
    set_parsed(&mut config.server.port, "PORT");
    set_parsed(&mut config.server.shutdown_grace_secs, "SHUTDOWN_GRACE");
    set_parsed(&mut config.security.max_args_len, "MAX_ARGS_LEN");
    set_parsed(&mut config.security.max_stdout_bytes, "MAX_STDOUT_BYTES");
    set_parsed(&mut config.security.max_stderr_bytes, "MAX_STDERR_BYTES");
    set_parsed(&mut config.tool.default_timeout_secs, "DEFAULT_TIMEOUT_SEC");
    set_parsed(&mut config.tool.default_concurrency, "DEFAULT_CONCURRENCY");

    if let Ok(raw) = std::env::var("ALLOW_INTRUSIVE") {
        config.security.allow_intrusive = matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes");
    }
    if let Some(names) = parse_csv_env("TOOL_INCLUDE") {
        config.tool.include = names;
    }
    if let Some(names) = parse_csv_env("TOOL_EXCLUDE") {
        config.tool.exclude = names;
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, var: &str) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => warn!("ignoring unparseable {}={:?}", var, raw),
        }
    }
}

fn parse_csv_env(var: &str) -> Option<Vec<String>> {
    let raw = std::env::var(var).ok()?;
    let names: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() { None } else { Some(names) }
}
