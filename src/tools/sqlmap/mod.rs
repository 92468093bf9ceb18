//! Sqlmap SQL injection testing with strict scope and blast-radius
//! controls: URL-only targets, clamped risk/test levels, forced batch
//! mode, and silent stripping of anything outside the allow-list.

use crate::config::Config;
use crate::exec::breaker::BreakerConfig;
use crate::safety::args::{ArgPolicy, sanitize};
use crate::safety::{ValidationError, target};
use crate::tools::base::{
    BreakerInfo, PreparedCommand, Tool, ToolInfo, ToolInput, concurrency_from_config,
    timeout_from_config,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

const MAX_RISK_LEVEL: u32 = 2;
const MAX_TEST_LEVEL: u32 = 3;

const ALLOWED_FLAGS: &[&str] = &[
    "-u", "--url",
    "--batch",
    "--risk",
    "--level",
    "--dbs", "--tables", "--columns", "--dump",
    "--current-user", "--current-db", "--users", "--passwords", "--roles",
    "--technique", "--time-sec", "--union-cols",
    "--cookie", "--user-agent", "--referer", "--headers",
    "--output-dir", "--flush-session",
    "--json", "--xml",
];

/// Flags followed by a value token.
const VALUE_FLAGS: &[&str] = &[
    "-u", "--url", "--risk", "--level", "--technique", "--time-sec",
    "--union-cols", "--cookie", "--user-agent", "--referer", "--headers",
    "--output-dir",
];

pub struct SqlmapTool {
    max_args_len: usize,
    concurrency: usize,
    default_timeout: Duration,
    breaker: BreakerConfig,
}

impl SqlmapTool {
    pub fn new(config: &Config) -> Self {
        Self {
            max_args_len: config.security.max_args_len,
            concurrency: concurrency_from_config(config, 1),
            default_timeout: timeout_from_config(config, Duration::from_secs(1800)),
            // Deliberately stricter than the shared settings; operator
            // config does not loosen this tool
            breaker: BreakerConfig {
                failure_threshold: 3,
                recovery_timeout: Duration::from_secs(300),
                ..BreakerConfig::default()
            },
        }
    }

    fn clamp_level(token: &str, raw: &str, max: u32) -> String {
        match raw.parse::<u32>() {
            Ok(value) if (1..=max).contains(&value) => value.to_string(),
            Ok(value) => {
                warn!("sqlmap.level_restricted flag={} requested={} max={}", token, value, max);
                max.to_string()
            }
            Err(_) => "1".to_string(),
        }
    }

    /// Keep allow-listed flags, clamp risk/level, validate any explicit
    /// URL values against the scope rule, and strip everything else.
    fn secure_args(&self, tokens: Vec<String>) -> Result<Vec<String>, ValidationError> {
        let mut secured: Vec<String> = Vec::with_capacity(tokens.len());
        let mut iter = tokens.into_iter().peekable();
        while let Some(token) = iter.next() {
            if !token.starts_with('-') {
                warn!("sqlmap.unsafe_token_skipped token={}", token);
                continue;
            }
            if !ALLOWED_FLAGS.contains(&token.as_str()) {
                warn!("sqlmap.unsafe_flag_skipped flag={}", token);
                // Drop the flag's value along with it
                if iter.peek().is_some_and(|next| !next.starts_with('-')) {
                    iter.next();
                }
                continue;
            }
            if token == "-u" || token == "--url" {
                let Some(url_spec) = iter.next() else {
                    return Err(ValidationError::new(
                        "URL flag requires a value",
                        "Supply a target URL after -u",
                    ));
                };
                // An explicit URL must clear the same scope bar as the target
                target::validate_url_target(&url_spec)?;
                secured.push(token);
                secured.push(url_spec);
            } else if token == "--risk" {
                let Some(raw) = iter.next() else {
                    return Err(ValidationError::new(
                        "--risk requires a value",
                        "Supply a risk level (1-2)",
                    ));
                };
                secured.push(token.clone());
                secured.push(Self::clamp_level(&token, &raw, MAX_RISK_LEVEL));
            } else if token == "--level" {
                let Some(raw) = iter.next() else {
                    return Err(ValidationError::new(
                        "--level requires a value",
                        "Supply a test level (1-3)",
                    ));
                };
                secured.push(token.clone());
                secured.push(Self::clamp_level(&token, &raw, MAX_TEST_LEVEL));
            } else if VALUE_FLAGS.contains(&token.as_str()) {
                let Some(value) = iter.next() else {
                    return Err(ValidationError::new(
                        format!("{} requires a value", token),
                        "Supply a value for the flag",
                    ));
                };
                secured.push(token);
                secured.push(value);
            } else {
                secured.push(token);
            }
        }
        Ok(secured)
    }

    fn apply_defaults(args: Vec<String>, target_url: &str) -> (Vec<String>, Vec<String>) {
        let mut out = args;
        let mut optimizations: Vec<String> = Vec::new();

        if !out.iter().any(|a| matches!(a.as_str(), "-u" | "--url")) {
            out.extend(["-u".to_string(), target_url.to_string()]);
        }
        // Batch mode is non-negotiable: no interactive prompts
        if !out.iter().any(|a| a == "--batch") {
            optimizations.push("--batch".to_string());
        }
        if !out.iter().any(|a| a == "--risk") {
            optimizations.extend(["--risk".to_string(), "1".to_string()]);
        }
        if !out.iter().any(|a| a == "--level") {
            optimizations.extend(["--level".to_string(), "1".to_string()]);
        }

        out.extend(optimizations.clone());
        (out, optimizations)
    }
}

impl Tool for SqlmapTool {
    fn name(&self) -> &'static str {
        "SqlmapTool"
    }

    fn command_name(&self) -> &'static str {
        "sqlmap"
    }

    fn description(&self) -> &'static str {
        "SQL injection testing restricted to low risk levels and private URL targets"
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
        // Hostnames outside .lab.internal are rejected without DNS
        // resolution, even if they would resolve to a private address
        target::validate_url_target(input.target.trim())?;

        let policy = ArgPolicy::new(self.max_args_len);
        let tokens = sanitize(&input.extra_args, &policy)?;
        let secured = self.secure_args(tokens)?;
        let (args, optimizations_applied) = Self::apply_defaults(secured, input.target.trim());

        Ok(PreparedCommand {
            args,
            optimizations_applied,
        })
    }

    fn info(&self) -> ToolInfo {
        let mut extras = HashMap::new();
        extras.insert(
            "security_restrictions".to_string(),
            serde_json::json!({
                "max_risk_level": MAX_RISK_LEVEL,
                "max_test_level": MAX_TEST_LEVEL,
                "batch_mode": "always enforced",
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

#[cfg(test)]
mod tests;
