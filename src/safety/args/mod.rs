//! Argument sanitization for caller-supplied `extra_args` strings.
//!
//! Defense in depth on top of shell-free spawning: metacharacters are
//! rejected outright, tokens are restricted to a conservative character
//! class, and flags must prefix-match the tool's allow-list.

use crate::safety::ValidationError;
use regex::Regex;
use std::sync::LazyLock;

/// Control/meta characters never allowed anywhere in the raw string.
const DENY_CHARS: &[char] = &[';', '&', '|', '`', '$', '>', '<', '\n', '\r'];

static TOKEN_ALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._:/=+\-,@%]+$").expect("static regex"));

/// Per-tool sanitization policy.
pub struct ArgPolicy<'a> {
    /// Max raw length in bytes.
    pub max_len: usize,
    /// Flag prefixes permitted for `-`-leading tokens. `None` skips the
    /// allow-list layer (character-class checks still apply).
    pub allowed_flags: Option<&'a [&'a str]>,
    /// Literal non-flag tokens permitted beyond the character class
    /// (e.g. gobuster's mode words).
    pub extra_tokens: &'a [&'a str],
}

impl<'a> ArgPolicy<'a> {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            allowed_flags: None,
            extra_tokens: &[],
        }
    }

    pub fn with_flags(mut self, flags: &'a [&'a str]) -> Self {
        self.allowed_flags = Some(flags);
        self
    }

    pub fn with_extra_tokens(mut self, tokens: &'a [&'a str]) -> Self {
        self.extra_tokens = tokens;
        self
    }
}

/// Tokenize and validate an `extra_args` string. Returns the clean tokens.
pub fn sanitize(extra_args: &str, policy: &ArgPolicy<'_>) -> Result<Vec<String>, ValidationError> {
    if let Some(bad) = extra_args.chars().find(|c| DENY_CHARS.contains(c)) {
        return Err(ValidationError::new(
            format!("extra_args contains forbidden metacharacter {:?}", bad),
            "Remove shell metacharacters; arguments are passed without a shell",
        )
        .with_meta("character", serde_json::json!(bad.to_string())));
    }

    if extra_args.len() > policy.max_len {
        return Err(ValidationError::new(
            format!("extra_args too long ({} > {} bytes)", extra_args.len(), policy.max_len),
            "Shorten the argument string",
        ));
    }

    if extra_args.trim().is_empty() {
        return Ok(Vec::new());
    }

    let tokens = shlex::split(extra_args).ok_or_else(|| {
        ValidationError::new(
            "extra_args has unbalanced quoting",
            "Close all quotes in the argument string",
        )
    })?;

    let mut clean = Vec::with_capacity(tokens.len());
    for token in tokens {
        if token.is_empty() {
            continue;
        }
        if !TOKEN_ALLOWED.is_match(&token) && !policy.extra_tokens.contains(&token.as_str()) {
            return Err(ValidationError::new(
                format!("Disallowed token in args: {:?}", token),
                "Tokens may contain only letters, digits, and . _ : / = + - , @ %",
            )
            .with_meta("token", serde_json::json!(token)));
        }
        if let Some(allowed) = policy.allowed_flags
            && token.starts_with('-')
            && !allowed.iter().any(|prefix| token.starts_with(prefix))
        {
            return Err(ValidationError::new(
                format!("Flag not allowed: {:?}", token),
                "Use only flags from the tool's allow-list",
            )
            .with_meta("token", serde_json::json!(token)));
        }
        clean.push(token);
    }

    Ok(clean)
}

#[cfg(test)]
mod tests;
