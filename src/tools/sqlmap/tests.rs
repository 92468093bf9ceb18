use super::*;
use crate::config::Config;

fn tool() -> SqlmapTool {
    SqlmapTool::new(&Config::default())
}

fn build(target: &str, args: &str) -> Result<PreparedCommand, ValidationError> {
    tool().validate_and_build(&ToolInput::new(target, args))
}

#[test]
fn test_url_target_injected_with_defaults() {
    let prepared = build("http://192.168.1.10/page.php?id=1", "").unwrap();
    let joined = prepared.args.join(" ");
    assert!(joined.contains("-u http://192.168.1.10/page.php?id=1"));
    assert!(joined.contains("--batch"));
    assert!(joined.contains("--risk 1"));
    assert!(joined.contains("--level 1"));
    assert!(prepared.optimizations_applied.contains(&"--batch".to_string()));
}

#[test]
fn test_non_url_target_rejected() {
    assert!(build("192.168.1.10", "").is_err());
    assert!(build("sqlmap.lab.internal", "").is_err());
}

#[test]
fn test_public_url_rejected() {
    assert!(build("http://8.8.8.8/page.php?id=1", "").is_err());
}

#[test]
fn test_external_hostname_rejected_without_resolution() {
    // Conservative rule: even a host that might resolve privately is
    // rejected unless it is under .lab.internal
    assert!(build("http://intranet.corp/app?id=1", "").is_err());
    assert!(build("http://db.lab.internal/app?id=1", "").is_ok());
}

#[test]
fn test_risk_clamped_to_max() {
    let prepared = build("http://10.0.0.5/x.php?id=1", "--risk 3").unwrap();
    let idx = prepared.args.iter().position(|a| a == "--risk").unwrap();
    assert_eq!(prepared.args[idx + 1], "2");
}

#[test]
fn test_level_clamped_to_max() {
    let prepared = build("http://10.0.0.5/x.php?id=1", "--level 5").unwrap();
    let idx = prepared.args.iter().position(|a| a == "--level").unwrap();
    assert_eq!(prepared.args[idx + 1], "3");
}

#[test]
fn test_valid_risk_level_kept() {
    let prepared = build("http://10.0.0.5/x.php?id=1", "--risk 2 --level 2").unwrap();
    let joined = prepared.args.join(" ");
    assert!(joined.contains("--risk 2"));
    assert!(joined.contains("--level 2"));
    // No duplicate defaults appended
    assert_eq!(prepared.args.iter().filter(|a| *a == "--risk").count(), 1);
}

#[test]
fn test_garbage_risk_value_defaults_to_one() {
    let prepared = build("http://10.0.0.5/x.php?id=1", "--risk high").unwrap();
    let idx = prepared.args.iter().position(|a| a == "--risk").unwrap();
    assert_eq!(prepared.args[idx + 1], "1");
}

#[test]
fn test_unsafe_flags_stripped() {
    let prepared = build("http://10.0.0.5/x.php?id=1", "--dbs --os-shell --tables").unwrap();
    assert!(!prepared.args.contains(&"--os-shell".to_string()));
    assert!(prepared.args.contains(&"--dbs".to_string()));
    assert!(prepared.args.contains(&"--tables".to_string()));
}

#[test]
fn test_unsafe_flag_value_stripped_with_it() {
    let prepared = build("http://10.0.0.5/x.php?id=1", "--tamper space2comment --dbs").unwrap();
    assert!(!prepared.args.contains(&"--tamper".to_string()));
    assert!(!prepared.args.contains(&"space2comment".to_string()));
    assert!(prepared.args.contains(&"--dbs".to_string()));
}

#[test]
fn test_explicit_url_flag_scope_checked() {
    let err = build("http://10.0.0.5/x.php?id=1", "-u http://8.8.8.8/y.php").unwrap_err();
    assert!(err.message.contains("not permitted"));

    let prepared = build("http://10.0.0.5/x.php?id=1", "-u http://10.0.0.9/y.php").unwrap();
    let joined = prepared.args.join(" ");
    assert!(joined.contains("-u http://10.0.0.9/y.php"));
    // Caller-supplied URL wins; the target is not injected twice
    assert_eq!(prepared.args.iter().filter(|a| *a == "-u").count(), 1);
}

#[test]
fn test_query_string_target_injected_untokenized() {
    // '?' is outside the token character class, so query-string URLs are
    // only usable as the injected target, never inside extra_args
    assert!(build("http://10.0.0.5/x.php?id=1", "-u http://10.0.0.9/y.php?id=2").is_err());
    let prepared = build("http://10.0.0.5/x.php?id=1", "--dbs").unwrap();
    assert!(prepared.args.contains(&"http://10.0.0.5/x.php?id=1".to_string()));
}

#[test]
fn test_batch_not_duplicated() {
    let prepared = build("http://10.0.0.5/x.php?id=1", "--batch").unwrap();
    assert_eq!(prepared.args.iter().filter(|a| *a == "--batch").count(), 1);
}

#[test]
fn test_metacharacters_rejected() {
    let err = build("http://10.0.0.5/x.php?id=1", "--dbs; cat /etc/shadow").unwrap_err();
    assert!(err.message.contains("metacharacter"));
}

#[test]
fn test_stricter_breaker_policy() {
    let config = tool().breaker_config();
    assert_eq!(config.failure_threshold, 3);
    assert_eq!(config.recovery_timeout, Duration::from_secs(300));
}

#[test]
fn test_info_reports_restrictions() {
    let info = tool().info();
    assert_eq!(info.name, "SqlmapTool");
    assert_eq!(
        info.extras["security_restrictions"]["max_risk_level"],
        serde_json::json!(2)
    );
}
