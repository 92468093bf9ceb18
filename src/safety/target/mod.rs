//! Target scope validation.
//!
//! A target is in scope iff it is an RFC1918 or loopback IPv4 address, an
//! IPv4 CIDR entirely inside those ranges, or a hostname under
//! `.lab.internal`. Everything else — public addresses, IPv6, bare
//! hostnames — is rejected before any subprocess is spawned.

use crate::safety::ValidationError;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

pub const LAB_DOMAIN_SUFFIX: &str = ".lab.internal";

/// Supernets a CIDR target must be entirely contained in.
const PERMITTED_NETS: [(Ipv4Addr, u8); 4] = [
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    (Ipv4Addr::new(127, 0, 0, 0), 8),
];

fn scope_error(target: &str) -> ValidationError {
    ValidationError::new(
        format!("Target not permitted: {}", target),
        "Use RFC1918/loopback IPv4 addresses, private CIDR ranges, or .lab.internal hostnames",
    )
    .with_meta("target", serde_json::json!(target))
}

/// Parse a CIDR target non-strictly: host bits are allowed and truncated
/// away, the way `ip_network(..., strict=False)` parsers behave.
pub fn parse_network(target: &str) -> Option<Ipv4Net> {
    target.trim().parse::<Ipv4Net>().ok().map(|net| net.trunc())
}

/// Whether a network lies entirely inside the permitted private/loopback space.
pub fn network_in_scope(net: &Ipv4Net) -> bool {
    PERMITTED_NETS.iter().any(|&(addr, prefix)| {
        Ipv4Net::new(addr, prefix).is_ok_and(|supernet| supernet.contains(net))
    })
}

/// Whether a single IPv4 address is in scope.
pub fn address_in_scope(ip: Ipv4Addr) -> bool {
    ip.is_private() || ip.is_loopback()
}

/// Validate a plain (non-URL) target string against the scope rule.
pub fn validate_scope(target: &str) -> Result<(), ValidationError> {
    let v = target.trim();
    if v.is_empty() {
        return Err(ValidationError::new(
            "Target must not be empty",
            "Provide an RFC1918 IPv4 address, CIDR, or .lab.internal hostname",
        ));
    }

    if v.ends_with(LAB_DOMAIN_SUFFIX) {
        return Ok(());
    }

    if v.contains('/') {
        return match parse_network(v) {
            Some(net) if network_in_scope(&net) => Ok(()),
            _ => Err(scope_error(v)),
        };
    }

    match v.parse::<Ipv4Addr>() {
        Ok(ip) if address_in_scope(ip) => Ok(()),
        _ => Err(scope_error(v)),
    }
}

/// Validate a URL target (gobuster dir/vhost, sqlmap): well-formed http(s)
/// URL whose host passes the same scope rule. Hostnames that are not under
/// `.lab.internal` are rejected without DNS resolution, even if they would
/// resolve to a private address.
pub fn validate_url_target(target: &str) -> Result<url::Url, ValidationError> {
    let parsed = url::Url::parse(target.trim()).map_err(|e| {
        ValidationError::new(
            format!("Invalid URL: {}", e),
            "Use an absolute http(s) URL, e.g. http://10.0.0.5/",
        )
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::new(
            format!("URL scheme not permitted: {}", parsed.scheme()),
            "Only http and https URLs are accepted",
        ));
    }

    match parsed.host() {
        Some(url::Host::Ipv4(ip)) if address_in_scope(ip) => Ok(parsed),
        Some(url::Host::Domain(domain)) if domain.ends_with(LAB_DOMAIN_SUFFIX) => Ok(parsed),
        Some(_) => Err(scope_error(target)),
        None => Err(ValidationError::new(
            "URL has no host",
            "Use an absolute http(s) URL with a host component",
        )),
    }
}

#[cfg(test)]
mod tests;
