//! Masscan fast port scanner with rate clamping and tiered network-size
//! limits: a warning above 65 536 addresses and a hard cap at four times
//! that.

use crate::config::Config;
use crate::exec::breaker::BreakerConfig;
use crate::safety::args::{ArgPolicy, sanitize};
use crate::safety::{ValidationError, target};
use crate::tools::base::{
    BreakerInfo, PreparedCommand, Tool, ToolInfo, ToolInput, breaker_from_config,
    concurrency_from_config, timeout_from_config, valid_port_spec,
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{info, warn};

const MAX_NETWORK_SIZE: u64 = 65_536;
const MAX_PORT_RANGES: usize = 100;
const DEFAULT_RATE: u32 = 1000;
const MIN_RATE: u32 = 100;
const MAX_RATE: u32 = 100_000;
const DEFAULT_PORTS: &str = "80,443,22,21,23,25,3306,3389,8080,8443";

const ALLOWED_FLAGS: &[&str] = &[
    "-p", "--ports",
    "--rate", "--max-rate",
    "-e", "--interface",
    "--wait",
    "--banners",
    "--router-ip", "--router-mac",
    "--source-ip", "--source-port",
    "--exclude", "--excludefile",
    "-oG", "-oJ", "-oX", "-oL",
    "--rotate",
    "--connection-timeout",
    "--ping",
    "--retries",
];

static INTERFACE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-.]+$").expect("static regex"));

pub struct MasscanTool {
    max_args_len: usize,
    concurrency: usize,
    default_timeout: Duration,
    breaker: BreakerConfig,
}

impl MasscanTool {
    pub fn new(config: &Config) -> Self {
        Self {
            max_args_len: config.security.max_args_len,
            concurrency: concurrency_from_config(config, 1),
            default_timeout: timeout_from_config(config, Duration::from_secs(300)),
            breaker: breaker_from_config(
                config,
                BreakerConfig {
                    failure_threshold: 3,
                    recovery_timeout: Duration::from_secs(90),
                    ..BreakerConfig::default()
                },
            ),
        }
    }

    fn validate_target(&self, raw: &str) -> Result<(), ValidationError> {
        let target_str = raw.trim();
        if target_str.contains('/') {
            let Some(network) = target::parse_network(target_str) else {
                return Err(ValidationError::new(
                    format!("Invalid network range: {}", target_str),
                    "Use valid CIDR notation (e.g. 10.0.0.0/24)",
                ));
            };
            let hosts = 1u64 << (32 - u32::from(network.prefix_len()));
            if hosts > MAX_NETWORK_SIZE {
                warn!(
                    "masscan.large_network target={} size={} max={}",
                    target_str, hosts, MAX_NETWORK_SIZE
                );
                if hosts > MAX_NETWORK_SIZE * 4 {
                    return Err(ValidationError::new(
                        format!("Network range too large: {} addresses", hosts),
                        format!("Maximum supported: {} addresses", MAX_NETWORK_SIZE * 4),
                    )
                    .with_meta("network_size", serde_json::json!(hosts))
                    .with_meta("max_allowed", serde_json::json!(MAX_NETWORK_SIZE * 4)));
                }
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
        let policy = ArgPolicy::new(self.max_args_len).with_flags(ALLOWED_FLAGS);
        let tokens = sanitize(extra_args, &policy)?;

        let mut validated: Vec<String> = Vec::with_capacity(tokens.len());
        let mut iter = tokens.into_iter();
        while let Some(token) = iter.next() {
            if token == "--rate" || token == "--max-rate" {
                let Some(spec) = iter.next() else {
                    return Err(ValidationError::new(
                        format!("{} requires a value", token),
                        "Supply a packets-per-second rate",
                    ));
                };
                let rate: u32 = spec.parse().map_err(|_| {
                    ValidationError::new(
                        format!("Invalid rate specification: {}", spec),
                        format!("Rate must be an integer between {} and {}", MIN_RATE, MAX_RATE),
                    )
                })?;
                if !(MIN_RATE..=MAX_RATE).contains(&rate) {
                    return Err(ValidationError::new(
                        format!("Rate out of range: {}", rate),
                        format!("Rate must be between {} and {}", MIN_RATE, MAX_RATE),
                    )
                    .with_meta("rate", serde_json::json!(rate)));
                }
                validated.push(token);
                validated.push(rate.to_string());
            } else if token == "-p" || token == "--ports" {
                let Some(spec) = iter.next() else {
                    return Err(ValidationError::new(
                        format!("Port flag {} requires a value", token),
                        "Supply a port list such as 80,443",
                    ));
                };
                // Masscan accepts protocol-tagged specs like T:80 or U:53
                let bare = spec
                    .strip_prefix("T:")
                    .or_else(|| spec.strip_prefix("U:"))
                    .unwrap_or(&spec);
                if !valid_port_spec(bare, 0, MAX_PORT_RANGES) {
                    return Err(ValidationError::new(
                        format!("Invalid port specification: {}", spec),
                        "Ports are 0-65535, comma-separated ranges",
                    )
                    .with_meta("port_spec", serde_json::json!(spec)));
                }
                validated.push(token);
                validated.push(spec);
            } else if token == "-e" || token == "--interface" {
                let Some(interface) = iter.next() else {
                    return Err(ValidationError::new(
                        format!("Interface flag {} requires a value", token),
                        "Supply an interface name such as eth0",
                    ));
                };
                if !INTERFACE_NAME.is_match(&interface) {
                    return Err(ValidationError::new(
                        format!("Invalid interface name: {}", interface),
                        "Interface names are alphanumeric with - _ .",
                    ));
                }
                validated.push(token);
                validated.push(interface);
            } else if token.starts_with('-') {
                validated.push(token);
            } else {
                return Err(ValidationError::new(
                    format!("Unexpected non-flag token (potential injection): {}", token),
                    "Pass the scan target via the target field, not extra_args",
                )
                .with_meta("token", serde_json::json!(token)));
            }
        }
        Ok(validated)
    }

    /// Inject rate limiting and sane defaults when unspecified.
    fn apply_safety_limits(&self, args: Vec<String>) -> (Vec<String>, Vec<String>) {
        let has_rate = args.iter().any(|a| a.starts_with("--rate"));
        let has_wait = args.iter().any(|a| a.starts_with("--wait"));
        let has_retries = args.iter().any(|a| a.starts_with("--retries"));
        let has_ports = args.iter().any(|a| matches!(a.as_str(), "-p" | "--ports"));

        let mut optimizations: Vec<String> = Vec::new();
        if !has_rate {
            optimizations.extend(["--rate".to_string(), DEFAULT_RATE.to_string()]);
            info!("masscan.rate_limit_applied rate={}", DEFAULT_RATE);
        }
        if !has_wait {
            optimizations.extend(["--wait".to_string(), "0".to_string()]);
        }
        if !has_retries {
            optimizations.extend(["--retries".to_string(), "1".to_string()]);
        }
        if !has_ports {
            optimizations.extend(["-p".to_string(), DEFAULT_PORTS.to_string()]);
        }

        let mut optimized = optimizations.clone();
        optimized.extend(args);
        (optimized, optimizations)
    }
}

impl Tool for MasscanTool {
    fn name(&self) -> &'static str {
        "MasscanTool"
    }

    fn command_name(&self) -> &'static str {
        "masscan"
    }

    fn description(&self) -> &'static str {
        "Fast port scanner with enforced rate limiting and private-scope targeting"
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    fn allowed_flags(&self) -> &[&'static str] {
        ALLOWED_FLAGS
    }

    fn breaker_config(&self) -> BreakerConfig {
        self.breaker.clone()
    }

    fn validate_and_build(&self, input: &ToolInput) -> Result<PreparedCommand, ValidationError> {
        self.validate_target(&input.target)?;
        let args = self.parse_and_validate_args(&input.extra_args)?;
        let (mut args, optimizations_applied) = self.apply_safety_limits(args);
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
                "hard_cap": MAX_NETWORK_SIZE * 4,
                "default_rate": DEFAULT_RATE,
                "min_rate": MIN_RATE,
                "max_rate": MAX_RATE,
            }),
        );
        extras.insert(
            "optimizations".to_string(),
            serde_json::json!({
                "rate_limiting": format!("{} packets/sec", DEFAULT_RATE),
                "wait_time": "0s between packets",
                "retries": 1,
                "default_ports": DEFAULT_PORTS,
            }),
        );
        ToolInfo {
            name: self.name().to_string(),
            command: self.command_name().to_string(),
            description: self.description().to_string(),
            concurrency: self.concurrency,
            timeout_secs: self.default_timeout.as_secs_f64(),
            allowed_flags: ALLOWED_FLAGS.iter().map(|s| (*s).to_string()).collect(),
            intrusive_allowed: false,
            circuit_breaker: BreakerInfo {
                failure_threshold: self.breaker.failure_threshold,
                recovery_timeout_secs: self.breaker.recovery_timeout.as_secs_f64(),
            },
            extras,
        }
    }
}
