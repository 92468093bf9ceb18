use super::*;
use crate::config::Config;

fn tool() -> NmapTool {
    NmapTool::new(&Config::default())
}

fn intrusive_tool() -> NmapTool {
    let mut config = Config::default();
    config.security.allow_intrusive = true;
    NmapTool::new(&config)
}

fn build(tool: &NmapTool, target: &str, args: &str) -> Result<PreparedCommand, ValidationError> {
    tool.validate_and_build(&ToolInput::new(target, args))
}

#[test]
fn test_happy_path_appends_target_last() {
    let prepared = build(&tool(), "127.0.0.1", "-sV -p 22,80").unwrap();
    assert_eq!(prepared.args.last().unwrap(), "127.0.0.1");
    assert!(prepared.args.contains(&"-sV".to_string()));
    assert!(prepared.args.contains(&"22,80".to_string()));
}

#[test]
fn test_optimizer_injects_defaults() {
    let prepared = build(&tool(), "10.0.0.1", "-sV").unwrap();
    assert!(prepared.optimizations_applied.contains(&"-T4".to_string()));
    assert!(
        prepared
            .optimizations_applied
            .contains(&"--max-parallelism=10".to_string())
    );
    assert!(prepared.optimizations_applied.contains(&"-Pn".to_string()));
    assert!(
        prepared
            .optimizations_applied
            .contains(&"--top-ports=1000".to_string())
    );
    // Optimizations come before caller args
    assert_eq!(prepared.args[0], "-T4");
}

#[test]
fn test_optimizer_respects_existing_choices() {
    let prepared = build(&tool(), "10.0.0.1", "-T2 -Pn -p 80").unwrap();
    assert!(!prepared.optimizations_applied.contains(&"-T4".to_string()));
    assert!(!prepared.optimizations_applied.contains(&"-Pn".to_string()));
    assert!(
        !prepared
            .optimizations_applied
            .iter()
            .any(|o| o.starts_with("--top-ports"))
    );
}

#[test]
fn test_public_target_rejected() {
    let err = build(&tool(), "8.8.8.8", "-sV").unwrap_err();
    assert!(err.message.contains("not permitted"));
}

#[test]
fn test_lab_hostname_accepted() {
    assert!(build(&tool(), "scanner.lab.internal", "").is_ok());
}

#[test]
fn test_cidr_too_large_suggests_prefix() {
    // /20 is 4096 hosts, over the 1024 cap
    let err = build(&tool(), "10.0.0.0/20", "").unwrap_err();
    assert!(err.message.contains("too large"));
    assert_eq!(err.metadata["suggested_cidr"], serde_json::json!("/22"));
    assert_eq!(err.metadata["network_size"], serde_json::json!(4096));
}

#[test]
fn test_cidr_at_cap_accepted() {
    // /22 is exactly 1024 hosts
    assert!(build(&tool(), "10.0.0.0/22", "").is_ok());
}

#[test]
fn test_public_cidr_rejected() {
    let err = build(&tool(), "11.0.0.0/24", "").unwrap_err();
    assert!(err.message.contains("private"));
}

#[test]
fn test_invalid_cidr_rejected() {
    let err = build(&tool(), "10.0.0.0/40", "").unwrap_err();
    assert!(err.message.contains("Invalid network range"));
}

#[test]
fn test_non_flag_token_rejected() {
    let err = build(&tool(), "10.0.0.1", "-sV 10.0.0.2").unwrap_err();
    assert!(err.message.contains("non-flag token"));
}

#[test]
fn test_unknown_flag_rejected() {
    let err = build(&tool(), "10.0.0.1", "--badflag").unwrap_err();
    assert!(err.message.contains("Flag not allowed"));
}

#[test]
fn test_port_spec_validation() {
    assert!(build(&tool(), "10.0.0.1", "-p 1-1024").is_ok());
    let err = build(&tool(), "10.0.0.1", "-p 99999").unwrap_err();
    assert!(err.message.contains("Invalid port specification"));
    let err = build(&tool(), "10.0.0.1", "-p").unwrap_err();
    assert!(err.message.contains("requires a value"));
}

#[test]
fn test_timing_template_validation() {
    assert!(build(&tool(), "10.0.0.1", "-T0").is_ok());
    assert!(build(&tool(), "10.0.0.1", "-T5").is_ok());
    let err = build(&tool(), "10.0.0.1", "-T7").unwrap_err();
    assert!(err.message.contains("Flag not allowed") || err.message.contains("timing"));
}

#[test]
fn test_value_flags_numeric_only() {
    assert!(build(&tool(), "10.0.0.1", "--max-retries 3").is_ok());
    assert!(build(&tool(), "10.0.0.1", "--host-timeout 30s").is_ok());
    let err = build(&tool(), "10.0.0.1", "--max-retries x3z").unwrap_err();
    assert!(err.message.contains("Invalid value"));
}

#[test]
fn test_a_flag_policy_gated() {
    let err = build(&tool(), "10.0.0.1", "-A").unwrap_err();
    assert!(
        err.message.contains("Flag not allowed") || err.message.contains("intrusive"),
        "got {:?}",
        err.message
    );
    assert!(build(&intrusive_tool(), "10.0.0.1", "-A").is_ok());
}

#[test]
fn test_safe_scripts_pass() {
    let prepared = build(&tool(), "10.0.0.1", "--script safe,ssl-cert").unwrap();
    let idx = prepared.args.iter().position(|a| a == "--script").unwrap();
    assert_eq!(prepared.args[idx + 1], "safe,ssl-cert");
}

#[test]
fn test_intrusive_scripts_dropped_without_policy() {
    // vuln is dropped, safe survives
    let prepared = build(&tool(), "10.0.0.1", "--script safe,vuln").unwrap();
    let idx = prepared.args.iter().position(|a| a == "--script").unwrap();
    assert_eq!(prepared.args[idx + 1], "safe");
}

#[test]
fn test_all_scripts_dropped_fails() {
    let err = build(&tool(), "10.0.0.1", "--script vuln,exploit").unwrap_err();
    assert!(err.message.contains("No allowed scripts"));
}

#[test]
fn test_intrusive_scripts_allowed_with_policy() {
    let prepared = build(&intrusive_tool(), "10.0.0.1", "--script vuln,ssl-heartbleed").unwrap();
    let idx = prepared.args.iter().position(|a| a == "--script").unwrap();
    assert_eq!(prepared.args[idx + 1], "vuln,ssl-heartbleed");
}

#[test]
fn test_wildcard_intrusive_scripts() {
    // http-vuln-cve2017 matches the http-vuln-* pattern
    let err = build(&tool(), "10.0.0.1", "--script http-vuln-cve2017").unwrap_err();
    assert!(err.message.contains("No allowed scripts"));
    assert!(build(&intrusive_tool(), "10.0.0.1", "--script http-vuln-cve2017").is_ok());
}

#[test]
fn test_script_equals_form_also_filtered() {
    // --script=vuln must not bypass the policy applied to "--script vuln"
    let err = build(&tool(), "10.0.0.1", "--script=vuln").unwrap_err();
    assert!(err.message.contains("No allowed scripts"));

    let prepared = build(&tool(), "10.0.0.1", "--script=safe,vuln").unwrap();
    assert!(prepared.args.contains(&"--script=safe".to_string()));
}

#[test]
fn test_value_equals_form_checked() {
    assert!(build(&tool(), "10.0.0.1", "--max-rate=100").is_ok());
    let err = build(&tool(), "10.0.0.1", "--max-rate=fast").unwrap_err();
    assert!(err.message.contains("Invalid value"));
}

#[test]
fn test_unknown_scripts_silently_dropped() {
    let prepared = build(&tool(), "10.0.0.1", "--script default,not-a-script").unwrap();
    let idx = prepared.args.iter().position(|a| a == "--script").unwrap();
    assert_eq!(prepared.args[idx + 1], "default");
}

#[test]
fn test_metacharacters_rejected() {
    let err = build(&tool(), "10.0.0.1", "-sV; rm -rf /").unwrap_err();
    assert!(err.message.contains("metacharacter"));
}

#[test]
fn test_info_reflects_policy() {
    let info = tool().info();
    assert_eq!(info.name, "NmapTool");
    assert_eq!(info.command, "nmap");
    assert!(!info.intrusive_allowed);
    assert!(!info.allowed_flags.contains(&"-A".to_string()));
    assert!(intrusive_tool().info().allowed_flags.contains(&"-A".to_string()));
}
