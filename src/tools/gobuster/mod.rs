//! Gobuster content/DNS/vhost discovery. The first non-flag token selects
//! the mode; targets are checked against the mode (URLs for dir/vhost, lab
//! hostnames for dns), wordlists are vetted before use, and thread counts
//! are defaulted and capped per mode.

use crate::config::Config;
use crate::exec::breaker::BreakerConfig;
use crate::safety::args::{ArgPolicy, sanitize};
use crate::safety::{ValidationError, target};
use crate::tools::base::{
    BreakerInfo, PreparedCommand, Tool, ToolInfo, ToolInput, breaker_from_config,
    concurrency_from_config, timeout_from_config,
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::warn;

const MAX_WORDLIST_BYTES: u64 = 50 * 1024 * 1024;
const MAX_WORDLIST_LINES: usize = 1_000_000;

const SAFE_EXTENSIONS: &[&str] = &["html", "htm", "php", "asp", "aspx", "txt", "xml", "json"];

const DIR_STATUS_CODES: &str = "200,204,301,302,307,401,403";

const ALLOWED_FLAGS: &[&str] = &[
    "-w", "--wordlist",
    "-t", "--threads",
    "-q", "--quiet",
    "-k", "--no-tls-validation",
    "-o", "--output",
    "-s", "--status-codes",
    "-x", "--extensions",
    "--timeout",
    "--no-color",
    "--no-progress",
    "-H", "--header",
    "-r", "--follow-redirect",
    "-u", "--url",
    "-d", "--domain",
    "--wildcard",
    "--append-domain",
];

static EXTENSIONS_ALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9,]+$").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Dir,
    Dns,
    Vhost,
}

impl Mode {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "dir" => Some(Self::Dir),
            "dns" => Some(Self::Dns),
            "vhost" => Some(Self::Vhost),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Dir => "dir",
            Self::Dns => "dns",
            Self::Vhost => "vhost",
        }
    }

    fn default_threads(self) -> u32 {
        match self {
            Self::Dir | Self::Vhost => 10,
            Self::Dns => 20,
        }
    }

    fn max_threads(self) -> u32 {
        match self {
            Self::Dir => 30,
            Self::Dns => 50,
            Self::Vhost => 20,
        }
    }
}

pub struct GobusterTool {
    allow_intrusive: bool,
    max_args_len: usize,
    concurrency: usize,
    default_timeout: Duration,
    breaker: BreakerConfig,
}

impl GobusterTool {
    pub fn new(config: &Config) -> Self {
        Self {
            allow_intrusive: config.security.allow_intrusive,
            max_args_len: config.security.max_args_len,
            concurrency: concurrency_from_config(config, 1),
            default_timeout: timeout_from_config(config, Duration::from_secs(1200)),
            breaker: breaker_from_config(
                config,
                BreakerConfig {
                    failure_threshold: 4,
                    recovery_timeout: Duration::from_secs(180),
                    ..BreakerConfig::default()
                },
            ),
        }
    }

    /// The mode is the first non-flag token; everything else keeps its
    /// relative order. A second mode token is an error.
    fn extract_mode(tokens: Vec<String>) -> Result<(Mode, Vec<String>), ValidationError> {
        let mut mode: Option<Mode> = None;
        let mut rest: Vec<String> = Vec::with_capacity(tokens.len());

        for token in tokens {
            if mode.is_none() && !token.starts_with('-') {
                let Some(parsed) = Mode::parse(&token) else {
                    return Err(ValidationError::new(
                        format!("gobuster mode not allowed: {}", token),
                        "Use one of: dir, dns, vhost",
                    )
                    .with_meta("mode", serde_json::json!(token)));
                };
                mode = Some(parsed);
            } else {
                if let Some(current) = mode
                    && !token.starts_with('-')
                    && Mode::parse(&token).is_some()
                {
                    return Err(ValidationError::new(
                        format!("Multiple modes specified: {}, {}", current.as_str(), token),
                        "Specify only one mode",
                    ));
                }
                rest.push(token);
            }
        }

        match mode {
            Some(mode) => Ok((mode, rest)),
            None => Err(ValidationError::new(
                "gobuster requires a mode: one of dir, dns, vhost as the first non-flag token",
                "Start extra_args with the mode, e.g. \"dir -w /lists/common.txt\"",
            )),
        }
    }

    fn validate_target_for_mode(&self, mode: Mode, raw: &str) -> Result<(), ValidationError> {
        let target_str = raw.trim();
        match mode {
            Mode::Dir | Mode::Vhost => {
                target::validate_url_target(target_str).map_err(|err| {
                    ValidationError::new(
                        format!(
                            "Invalid target '{}' for mode '{}': {}",
                            target_str,
                            mode.as_str(),
                            err.message
                        ),
                        "dir/vhost modes take an absolute URL with a private or .lab.internal host",
                    )
                })?;
                Ok(())
            }
            Mode::Dns => {
                if target_str.starts_with("http://") || target_str.starts_with("https://") {
                    return Err(ValidationError::new(
                        format!("DNS mode takes a domain, not a URL: {}", target_str),
                        "Use a bare hostname ending in .lab.internal",
                    ));
                }
                if !target_str.ends_with(target::LAB_DOMAIN_SUFFIX) {
                    return Err(ValidationError::new(
                        format!("DNS mode requires a .lab.internal domain: {}", target_str),
                        "Use a hostname ending in .lab.internal",
                    ));
                }
                Ok(())
            }
        }
    }

    fn validate_wordlist(path: &str) -> Result<(), ValidationError> {
        let metadata = std::fs::metadata(path).map_err(|_| {
            ValidationError::new(
                format!("Wordlist not found: {}", path),
                "Provide a readable wordlist path",
            )
            .with_meta("wordlist", serde_json::json!(path))
        })?;
        if !metadata.is_file() {
            return Err(ValidationError::new(
                format!("Wordlist is not a file: {}", path),
                "Provide a regular file",
            ));
        }
        if metadata.len() > MAX_WORDLIST_BYTES {
            return Err(ValidationError::new(
                format!(
                    "Wordlist too large: {} bytes (max {})",
                    metadata.len(),
                    MAX_WORDLIST_BYTES
                ),
                "Use a wordlist under 50 MiB",
            )
            .with_meta("size_bytes", serde_json::json!(metadata.len())));
        }
        let content = std::fs::read(path).map_err(|e| {
            ValidationError::new(
                format!("Cannot read wordlist {}: {}", path, e),
                "Check file permissions",
            )
        })?;
        let lines = content.iter().filter(|&&b| b == b'\n').count() + 1;
        if lines > MAX_WORDLIST_LINES {
            return Err(ValidationError::new(
                format!("Wordlist has too many entries: {} lines (max {})", lines, MAX_WORDLIST_LINES),
                "Use a wordlist under 1,000,000 lines",
            ));
        }
        Ok(())
    }

    fn validate_extensions(&self, spec: &str) -> Result<String, ValidationError> {
        if !EXTENSIONS_ALLOWED.is_match(spec) {
            return Err(ValidationError::new(
                format!("Invalid extensions specification: {}", spec),
                "Extensions are letters and digits, comma-separated",
            ));
        }
        if self.allow_intrusive {
            return Ok(spec.to_string());
        }
        let filtered: Vec<&str> = spec
            .split(',')
            .filter(|ext| {
                let keep = SAFE_EXTENSIONS.contains(&ext.to_lowercase().as_str());
                if !keep {
                    warn!("gobuster.extension_blocked extension={}", ext);
                }
                keep
            })
            .collect();
        if filtered.is_empty() {
            return Err(ValidationError::new(
                format!("No allowed extensions in specification: {}", spec),
                "Use common web extensions (html, php, txt, ...) or enable intrusive operations",
            ));
        }
        Ok(filtered.join(","))
    }

    /// Walk the flag/value pairs: vet the wordlist, filter extensions,
    /// and clamp thread counts to the per-mode cap.
    fn validate_pairs(&self, mode: Mode, tokens: Vec<String>) -> Result<Vec<String>, ValidationError> {
        let mut validated: Vec<String> = Vec::with_capacity(tokens.len());
        let mut iter = tokens.into_iter();
        while let Some(token) = iter.next() {
            match token.as_str() {
                "-w" | "--wordlist" => {
                    let Some(path) = iter.next() else {
                        return Err(ValidationError::new(
                            "Wordlist flag requires a path",
                            "Supply a wordlist file path",
                        ));
                    };
                    Self::validate_wordlist(&path)?;
                    validated.push(token);
                    validated.push(path);
                }
                "-x" | "--extensions" => {
                    let Some(spec) = iter.next() else {
                        return Err(ValidationError::new(
                            "Extensions flag requires a value",
                            "Supply comma-separated extensions",
                        ));
                    };
                    let filtered = self.validate_extensions(&spec)?;
                    validated.push(token);
                    validated.push(filtered);
                }
                "-t" | "--threads" => {
                    let Some(spec) = iter.next() else {
                        return Err(ValidationError::new(
                            "Threads flag requires a value",
                            "Supply a thread count",
                        ));
                    };
                    let threads: u32 = spec.parse().map_err(|_| {
                        ValidationError::new(
                            format!("Invalid thread count: {}", spec),
                            "Thread count must be a positive integer",
                        )
                    })?;
                    if threads == 0 {
                        return Err(ValidationError::new(
                            "Thread count must be at least 1",
                            "Supply a positive thread count",
                        ));
                    }
                    let clamped = threads.min(mode.max_threads());
                    if clamped != threads {
                        warn!(
                            "gobuster.threads_clamped mode={} requested={} cap={}",
                            mode.as_str(),
                            threads,
                            clamped
                        );
                    }
                    validated.push(token);
                    validated.push(clamped.to_string());
                }
                _ => validated.push(token),
            }
        }
        Ok(validated)
    }

    /// Inject `-u`/`-d` when the caller omitted them, then mode defaults.
    fn finalize(&self, mode: Mode, args: Vec<String>, target_str: &str) -> (Vec<String>, Vec<String>) {
        let mut out = args;
        let mut optimizations: Vec<String> = Vec::new();

        let has_url = out.iter().any(|a| matches!(a.as_str(), "-u" | "--url"));
        let has_domain = out.iter().any(|a| matches!(a.as_str(), "-d" | "--domain"));
        match mode {
            Mode::Dir | Mode::Vhost => {
                if !has_url {
                    out.extend(["-u".to_string(), target_str.to_string()]);
                }
            }
            Mode::Dns => {
                if !has_domain {
                    out.extend(["-d".to_string(), target_str.to_string()]);
                }
            }
        }

        let has_threads = out.iter().any(|a| matches!(a.as_str(), "-t" | "--threads"));
        if !has_threads {
            optimizations.extend(["-t".to_string(), mode.default_threads().to_string()]);
        }

        match mode {
            Mode::Dir => {
                if !out.iter().any(|a| matches!(a.as_str(), "-s" | "--status-codes")) {
                    optimizations.extend(["-s".to_string(), DIR_STATUS_CODES.to_string()]);
                }
            }
            Mode::Dns => {
                if !out.iter().any(|a| a == "--wildcard") {
                    optimizations.push("--wildcard".to_string());
                }
            }
            Mode::Vhost => {
                if !out.iter().any(|a| a == "--append-domain") {
                    optimizations.push("--append-domain".to_string());
                }
            }
        }

        if !out.iter().any(|a| a == "--timeout") {
            optimizations.extend(["--timeout".to_string(), "10s".to_string()]);
        }
        if !out.iter().any(|a| matches!(a.as_str(), "-q" | "--quiet")) {
            optimizations.push("-q".to_string());
        }
        if !out.iter().any(|a| a == "--no-progress") {
            optimizations.push("--no-progress".to_string());
        }

        out.extend(optimizations.clone());
        (out, optimizations)
    }
}

impl Tool for GobusterTool {
    fn name(&self) -> &'static str {
        "GobusterTool"
    }

    fn command_name(&self) -> &'static str {
        "gobuster"
    }

    fn description(&self) -> &'static str {
        "Content, DNS, and vhost discovery with mode-aware target checks and wordlist vetting"
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
        if input.extra_args.trim().is_empty() {
            return Err(ValidationError::new(
                "gobuster requires a mode: dir, dns, or vhost",
                "Specify a mode as the first argument",
            ));
        }
        let policy = ArgPolicy::new(self.max_args_len).with_flags(ALLOWED_FLAGS);
        let tokens = sanitize(&input.extra_args, &policy)?;
        let (mode, rest) = Self::extract_mode(tokens)?;
        self.validate_target_for_mode(mode, &input.target)?;
        let validated = self.validate_pairs(mode, rest)?;
        let (args, optimizations_applied) = self.finalize(mode, validated, input.target.trim());

        let mut argv = vec![mode.as_str().to_string()];
        argv.extend(args);
        Ok(PreparedCommand {
            args: argv,
            optimizations_applied,
        })
    }

    fn info(&self) -> ToolInfo {
        let mut extras = HashMap::new();
        extras.insert(
            "allowed_modes".to_string(),
            serde_json::json!(["dir", "dns", "vhost"]),
        );
        extras.insert(
            "safety_limits".to_string(),
            serde_json::json!({
                "max_wordlist_bytes": MAX_WORDLIST_BYTES,
                "max_wordlist_lines": MAX_WORDLIST_LINES,
                "thread_defaults": {"dir": 10, "dns": 20, "vhost": 10},
                "thread_caps": {"dir": 30, "dns": 50, "vhost": 20},
            }),
        );
        extras.insert(
            "mode_optimizations".to_string(),
            serde_json::json!({
                "dir": {"status_codes": DIR_STATUS_CODES},
                "dns": {"wildcard_detection": true},
                "vhost": {"append_domain": true},
            }),
        );
        ToolInfo {
            name: self.name().to_string(),
            command: self.command_name().to_string(),
            description: self.description().to_string(),
            concurrency: self.concurrency,
            timeout_secs: self.default_timeout.as_secs_f64(),
            allowed_flags: ALLOWED_FLAGS.iter().map(|s| (*s).to_string()).collect(),
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
