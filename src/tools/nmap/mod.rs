//! Nmap network scanner behind scope checks, an allow-listed flag grammar,
//! script policy enforcement, and performance defaults.

use crate::config::Config;
use crate::exec::breaker::BreakerConfig;
use crate::safety::args::{ArgPolicy, sanitize};
use crate::safety::{ValidationError, target};
use crate::tools::base::{
    BreakerInfo, PreparedCommand, Tool, ToolInfo, ToolInput, breaker_from_config,
    concurrency_from_config, timeout_from_config, valid_port_spec,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

const MAX_NETWORK_SIZE: u64 = 1024;
const MAX_PORT_RANGES: usize = 100;

/// `-A` excluded; admitted only under the intrusive policy.
const BASE_ALLOWED_FLAGS: &[&str] = &[
    "-sV", "-sC", "-sS", "-sT", "-sU", "-sn",
    "-Pn", "-PS", "-PA", "-PU", "-PY",
    "-p", "--top-ports",
    "--script",
    "-O", "--open", "--reason", "-v", "-vv", "--version-intensity",
    "--min-rate", "--max-rate", "--max-retries", "--host-timeout", "--max-parallelism",
    "-T0", "-T1", "-T2", "-T3", "-T4", "-T5",
    "--scan-delay", "--max-scan-delay",
    "-oX", "-oN", "-oG",
    "-f", "--mtu", "-D", "--source-port", "-g", "--data-length", "--ttl",
    "--spoof-mac", "--randomize-hosts",
];

const SAFE_SCRIPT_CATEGORIES: &[&str] = &["safe", "default", "discovery", "version"];

const SAFE_SCRIPTS: &[&str] = &[
    "http-headers", "ssl-cert", "ssh-hostkey", "smb-os-discovery",
    "dns-brute", "http-title", "ftp-anon", "smtp-commands",
    "pop3-capabilities", "imap-capabilities", "mongodb-info",
    "mysql-info", "ms-sql-info", "oracle-sid-brute",
    "rdp-enum-encryption", "vnc-info", "x11-access",
];

const INTRUSIVE_SCRIPT_CATEGORIES: &[&str] = &["vuln", "exploit", "intrusive", "brute", "dos"];

const INTRUSIVE_SCRIPTS: &[&str] = &[
    "http-vuln-*", "smb-vuln-*", "ssl-heartbleed", "ms-sql-brute",
    "mysql-brute", "ftp-brute", "ssh-brute", "rdp-brute",
    "dns-zone-transfer", "snmp-brute", "http-slowloris",
];

/// Flags whose next token must be a plain numeric/duration value.
const VALUE_FLAGS: &[&str] = &[
    "--max-parallelism", "--version-intensity", "--min-rate", "--max-rate",
    "--max-retries", "--host-timeout", "--top-ports", "--scan-delay",
    "--max-scan-delay", "--mtu", "--data-length", "--ttl", "--source-port", "-g",
];

pub struct NmapTool {
    allow_intrusive: bool,
    max_args_len: usize,
    concurrency: usize,
    default_timeout: Duration,
    breaker: BreakerConfig,
    allowed_flags: Vec<&'static str>,
}

impl NmapTool {
    pub fn new(config: &Config) -> Self {
        let allow_intrusive = config.security.allow_intrusive;
        let mut allowed_flags: Vec<&'static str> = BASE_ALLOWED_FLAGS.to_vec();
        if allow_intrusive {
            allowed_flags.push("-A");
        }
        Self {
            allow_intrusive,
            max_args_len: config.security.max_args_len,
            concurrency: concurrency_from_config(config, 1),
            default_timeout: timeout_from_config(config, Duration::from_secs(600)),
            breaker: breaker_from_config(
                config,
                BreakerConfig {
                    failure_threshold: 5,
                    recovery_timeout: Duration::from_secs(120),
                    ..BreakerConfig::default()
                },
            ),
            allowed_flags,
        }
    }

    fn validate_target(&self, raw: &str) -> Result<(), ValidationError> {
        let target_str = raw.trim();

        if target_str.contains('/') {
            let Some(network) = target::parse_network(target_str) else {
                return Err(ValidationError::new(
                    format!("Invalid network range: {}", target_str),
                    "Use valid CIDR notation (e.g. 192.168.1.0/24)",
                ));
            };
            let hosts = 1u64 << (32 - u32::from(network.prefix_len()));
            if hosts > MAX_NETWORK_SIZE {
                let suggested_prefix = 32 - MAX_NETWORK_SIZE.ilog2();
                return Err(ValidationError::new(
                    format!(
                        "Network range too large: {} addresses (max: {})",
                        hosts, MAX_NETWORK_SIZE
                    ),
                    format!("Use /{} or smaller (max {} hosts)", suggested_prefix, MAX_NETWORK_SIZE),
                )
                .with_meta("network_size", serde_json::json!(hosts))
                .with_meta("max_allowed", serde_json::json!(MAX_NETWORK_SIZE))
                .with_meta("suggested_cidr", serde_json::json!(format!("/{}", suggested_prefix)))
                .with_meta(
                    "example",
                    serde_json::json!(format!("{}/{}", network.network(), suggested_prefix)),
                ));
            }
            if !target::network_in_scope(&network) {
                return Err(ValidationError::new(
                    format!("Only private networks allowed: {}", target_str),
                    "Use RFC1918 ranges (10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16) or loopback",
                ));
            }
            return Ok(());
        }

        target::validate_scope(target_str)
    }

    fn parse_and_validate_args(&self, extra_args: &str) -> Result<Vec<String>, ValidationError> {
        let policy = ArgPolicy::new(self.max_args_len).with_flags(&self.allowed_flags);
        let tokens = sanitize(extra_args, &policy)?;

        let mut validated: Vec<String> = Vec::with_capacity(tokens.len());
        let mut iter = tokens.into_iter();
        while let Some(token) = iter.next() {
            // Positional arguments are never accepted; the target is
            // injected by the runner path only
            if !token.starts_with('-') {
                return Err(ValidationError::new(
                    format!("Unexpected non-flag token (potential injection): {}", token),
                    "Pass the scan target via the target field, not extra_args",
                )
                .with_meta("token", serde_json::json!(token)));
            }

            if token == "-A" {
                if !self.allow_intrusive {
                    return Err(ValidationError::new(
                        "-A flag requires intrusive operations to be enabled",
                        "Enable ALLOW_INTRUSIVE or drop -A",
                    ));
                }
                validated.push(token);
            } else if token == "-p" || token == "--ports" {
                let Some(spec) = iter.next() else {
                    return Err(ValidationError::new(
                        format!("Port flag {} requires a value", token),
                        "Supply a port list such as 22,80 or 1-1024",
                    ));
                };
                if !valid_port_spec(&spec, 1, MAX_PORT_RANGES) {
                    return Err(ValidationError::new(
                        format!("Invalid port specification: {}", spec),
                        "Ports are 1-65535, comma-separated, with at most 100 ranges",
                    )
                    .with_meta("port_spec", serde_json::json!(spec)));
                }
                validated.push(token);
                validated.push(spec);
            } else if token == "--script" {
                let Some(spec) = iter.next() else {
                    return Err(ValidationError::new(
                        "--script requires a value",
                        "Supply script names or categories, comma-separated",
                    ));
                };
                let filtered = self.filter_scripts(&spec);
                if filtered.is_empty() {
                    return Err(ValidationError::new(
                        format!("No allowed scripts in specification: {}", spec),
                        "Use safe categories (safe, default, discovery, version) or known safe scripts",
                    )
                    .with_meta("script_spec", serde_json::json!(spec)));
                }
                validated.push(token);
                validated.push(filtered);
            } else if let Some(level) = token.strip_prefix("-T") {
                if level.len() == 1 && level.chars().all(|c| ('0'..='5').contains(&c)) {
                    validated.push(token);
                } else {
                    return Err(ValidationError::new(
                        format!("Invalid timing template: {}", token),
                        "Use -T0 through -T5",
                    ));
                }
            } else if VALUE_FLAGS.contains(&token.as_str()) {
                let Some(value) = iter.next() else {
                    return Err(ValidationError::new(
                        format!("{} requires a value", token),
                        "Supply a numeric value",
                    ));
                };
                if !plain_numeric(&value) {
                    return Err(ValidationError::new(
                        format!("Invalid value for {}: {}", token, value),
                        "Values are digits with an optional ms/s suffix",
                    ));
                }
                validated.push(token);
                validated.push(value);
            } else if let Some((base, value)) = token.split_once('=') {
                // `--flag=value` forms get the same value checks as the
                // space-separated spellings
                if base == "--script" {
                    let filtered = self.filter_scripts(value);
                    if filtered.is_empty() {
                        return Err(ValidationError::new(
                            format!("No allowed scripts in specification: {}", value),
                            "Use safe categories (safe, default, discovery, version) or known safe scripts",
                        ));
                    }
                    validated.push(format!("--script={}", filtered));
                } else if base == "-p" || base == "--ports" {
                    if !valid_port_spec(value, 1, MAX_PORT_RANGES) {
                        return Err(ValidationError::new(
                            format!("Invalid port specification: {}", value),
                            "Ports are 1-65535, comma-separated, with at most 100 ranges",
                        ));
                    }
                    validated.push(token);
                } else if VALUE_FLAGS.contains(&base) {
                    if !plain_numeric(value) {
                        return Err(ValidationError::new(
                            format!("Invalid value for {}: {}", base, value),
                            "Values are digits with an optional ms/s suffix",
                        ));
                    }
                    validated.push(token);
                } else {
                    validated.push(token);
                }
            } else {
                // Boolean flags that already passed the allow-list prefix
                // check in the sanitizer
                validated.push(token);
            }
        }
        Ok(validated)
    }

    /// Admit safe scripts/categories, gate intrusive ones behind policy,
    /// and silently drop anything unknown.
    fn filter_scripts(&self, spec: &str) -> String {
        let mut allowed: Vec<&str> = Vec::new();
        for script in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if SAFE_SCRIPT_CATEGORIES.contains(&script) || SAFE_SCRIPTS.contains(&script) {
                allowed.push(script);
            } else if INTRUSIVE_SCRIPT_CATEGORIES.contains(&script)
                || INTRUSIVE_SCRIPTS.contains(&script)
                || INTRUSIVE_SCRIPTS
                    .iter()
                    .filter(|pattern| pattern.contains('*'))
                    .any(|pattern| script.starts_with(pattern.trim_end_matches('*')))
            {
                if self.allow_intrusive {
                    allowed.push(script);
                } else {
                    warn!("nmap.intrusive_script_blocked script={}", script);
                }
            } else {
                warn!("nmap.unknown_script_blocked script={}", script);
            }
        }
        allowed.join(",")
    }

    /// Inject performance/safety defaults the caller did not specify.
    fn optimize(&self, args: Vec<String>) -> (Vec<String>, Vec<String>) {
        let has_timing = args.iter().any(|a| a.starts_with("-T"));
        let has_parallelism = args.iter().any(|a| a.starts_with("--max-parallelism"));
        let has_host_discovery = args
            .iter()
            .any(|a| matches!(a.as_str(), "-Pn" | "-sn" | "-PS" | "-PA"));
        let has_port_spec = args
            .iter()
            .any(|a| matches!(a.as_str(), "-p" | "--ports") || a.starts_with("--top-ports"));

        let mut optimizations: Vec<String> = Vec::new();
        if !has_timing {
            optimizations.push("-T4".to_string());
        }
        if !has_parallelism {
            optimizations.push("--max-parallelism=10".to_string());
        }
        if !has_host_discovery {
            optimizations.push("-Pn".to_string());
        }
        if !has_port_spec {
            optimizations.push("--top-ports=1000".to_string());
        }

        let mut optimized = optimizations.clone();
        optimized.extend(args);
        (optimized, optimizations)
    }
}

fn plain_numeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit() || c == 'm' || c == 's')
}

impl Tool for NmapTool {
    fn name(&self) -> &'static str {
        "NmapTool"
    }

    fn command_name(&self) -> &'static str {
        "nmap"
    }

    fn description(&self) -> &'static str {
        "Network scanner with script policy enforcement and private-scope targeting"
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    fn allowed_flags(&self) -> &[&'static str] {
        &self.allowed_flags
    }

    fn breaker_config(&self) -> BreakerConfig {
        self.breaker.clone()
    }

    fn validate_and_build(&self, input: &ToolInput) -> Result<PreparedCommand, ValidationError> {
        self.validate_target(&input.target)?;
        let args = self.parse_and_validate_args(&input.extra_args)?;
        let (mut args, optimizations_applied) = self.optimize(args);
        args.push(input.target.trim().to_string());
        Ok(PreparedCommand {
            args,
            optimizations_applied,
        })
    }

    fn info(&self) -> ToolInfo {
        let mut extras = HashMap::new();
        extras.insert(
            "safety_limits".to_string(),
            serde_json::json!({
                "max_network_size": MAX_NETWORK_SIZE,
                "max_port_ranges": MAX_PORT_RANGES,
                "safe_script_categories": SAFE_SCRIPT_CATEGORIES,
                "intrusive_categories_allowed": self.allow_intrusive,
            }),
        );
        extras.insert(
            "optimizations".to_string(),
            serde_json::json!({
                "default_timing": "-T4",
                "default_parallelism": 10,
                "default_ports": "top-1000",
                "host_discovery": "disabled (-Pn)",
            }),
        );
        ToolInfo {
            name: self.name().to_string(),
            command: self.command_name().to_string(),
            description: self.description().to_string(),
            concurrency: self.concurrency,
            timeout_secs: self.default_timeout.as_secs_f64(),
            allowed_flags: self.allowed_flags.iter().map(|s| (*s).to_string()).collect(),
            intrusive_allowed: self.allow_intrusive,
            circuit_breaker: BreakerInfo {
                failure_threshold: self.breaker.failure_threshold,
                recovery_timeout_secs: self.breaker.recovery_timeout.as_secs_f64(),
            },
            extras,
        }
    }
}

#[cfg(test)]
mod tests;
