use super::*;

#[test]
fn test_rfc1918_addresses_accepted() {
    for target in ["10.0.0.1", "172.16.5.9", "172.31.255.254", "192.168.1.10"] {
        assert!(validate_scope(target).is_ok(), "{} should pass", target);
    }
}

#[test]
fn test_loopback_accepted() {
    assert!(validate_scope("127.0.0.1").is_ok());
    assert!(validate_scope("127.8.8.8").is_ok());
}

#[test]
fn test_public_addresses_rejected() {
    for target in ["8.8.8.8", "1.1.1.1", "172.32.0.1", "192.169.0.1", "100.64.0.1"] {
        assert!(validate_scope(target).is_err(), "{} should fail", target);
    }
}

#[test]
fn test_lab_internal_hostnames_accepted() {
    assert!(validate_scope("db.lab.internal").is_ok());
    assert!(validate_scope("  web01.lab.internal  ").is_ok());
}

#[test]
fn test_other_hostnames_rejected() {
    assert!(validate_scope("example.com").is_err());
    assert!(validate_scope("lab.internal.evil.com").is_err());
}

#[test]
fn test_private_cidr_accepted() {
    assert!(validate_scope("10.0.0.0/24").is_ok());
    assert!(validate_scope("192.168.0.0/16").is_ok());
    // Host bits tolerated (non-strict parse)
    assert!(validate_scope("10.0.0.1/24").is_ok());
}

#[test]
fn test_cidr_straddling_public_space_rejected() {
    // 172.0.0.0/8 includes far more than 172.16/12
    assert!(validate_scope("172.0.0.0/8").is_err());
    assert!(validate_scope("0.0.0.0/0").is_err());
}

#[test]
fn test_ipv6_rejected() {
    assert!(validate_scope("::1").is_err());
    assert!(validate_scope("fe80::1").is_err());
}

#[test]
fn test_url_target_private_ip() {
    assert!(validate_url_target("http://10.0.0.5/admin").is_ok());
    assert!(validate_url_target("https://192.168.1.1:8443/").is_ok());
}

#[test]
fn test_url_target_public_ip_rejected() {
    assert!(validate_url_target("http://8.8.8.8/").is_err());
}

#[test]
fn test_url_target_lab_hostname() {
    assert!(validate_url_target("http://app.lab.internal/login").is_ok());
}

#[test]
fn test_url_target_external_hostname_rejected() {
    // Conservative rule: no DNS resolution, non-lab hostnames always fail
    assert!(validate_url_target("http://intranet.corp/").is_err());
}

#[test]
fn test_url_target_bad_scheme_rejected() {
    assert!(validate_url_target("ftp://10.0.0.5/").is_err());
    assert!(validate_url_target("file:///etc/passwd").is_err());
}

#[test]
fn test_network_in_scope_boundaries() {
    let net: Ipv4Net = "172.16.0.0/12".parse().unwrap();
    assert!(network_in_scope(&net));
    let net: Ipv4Net = "172.16.0.0/11".parse().unwrap();
    assert!(!network_in_scope(&net));
}
