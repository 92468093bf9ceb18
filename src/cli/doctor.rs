use crate::config::{self, Config};
use crate::tools::build_tools;
use anyhow::Result;
use std::path::Path;

#[derive(Debug)]
enum CheckResult {
    Pass(String),
    Fail(String),
    Skip(String),
}

impl CheckResult {
    fn label(&self) -> &'static str {
        match self {
            Self::Pass(_) => "PASS",
            Self::Fail(_) => "FAIL",
            Self::Skip(_) => "SKIP",
        }
    }

    fn detail(&self) -> &str {
        match self {
            Self::Pass(s) | Self::Fail(s) | Self::Skip(s) => s,
        }
    }

    fn is_fail(&self) -> bool {
        matches!(self, Self::Fail(_))
    }
}

fn print_check(name: &str, result: &CheckResult) {
    println!("  {:<6} {:<30} {}", result.label(), name, result.detail());
}

fn check_config_file(path: Option<&Path>) -> CheckResult {
    match path {
        Some(path) if path.exists() => CheckResult::Pass(format!("{}", path.display())),
        Some(path) => CheckResult::Fail(format!("not found at {}", path.display())),
        None => CheckResult::Skip("no --config given, env/defaults only".to_string()),
    }
}

fn check_config_loads(path: Option<&Path>) -> CheckResult {
    match config::load_config(path) {
        Ok(_) => CheckResult::Pass("valid".to_string()),
        Err(e) => CheckResult::Fail(format!("{:#}", e)),
    }
}

fn check_tool_binary(command: &str) -> CheckResult {
    match which::which(command) {
        Ok(path) => CheckResult::Pass(format!("{}", path.display())),
        Err(_) => CheckResult::Fail("not found in PATH".to_string()),
    }
}

fn check_external_command(name: &str, args: &[&str]) -> CheckResult {
    match std::process::Command::new(name).args(args).output() {
        Ok(output) => {
            if output.status.success() {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let version = stdout.lines().next().unwrap_or("").trim().to_string();
                CheckResult::Pass(version)
            } else {
                CheckResult::Fail("command failed".to_string())
            }
        }
        Err(_) => CheckResult::Fail("not found in PATH".to_string()),
    }
}

fn check_dependencies(config: &Config) -> CheckResult {
    if config.health.dependencies.is_empty() {
        return CheckResult::Skip("none configured".to_string());
    }
    let missing: Vec<&str> = config
        .health
        .dependencies
        .iter()
        .filter(|dep| which::which(dep).is_err())
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        CheckResult::Pass(format!("{} available", config.health.dependencies.len()))
    } else {
        CheckResult::Fail(format!("missing: {}", missing.join(", ")))
    }
}

fn check_intrusive_policy(config: &Config) -> CheckResult {
    if config.security.allow_intrusive {
        CheckResult::Pass("intrusive operations ENABLED — verify this is intended".to_string())
    } else {
        CheckResult::Pass("intrusive operations disabled".to_string())
    }
}

pub async fn doctor_command(config_path: Option<&Path>) -> Result<()> {
    println!("scangate doctor\n");
    println!("{}", "=".repeat(60));

    let mut pass_count = 0u32;
    let mut fail_count = 0u32;
    let mut skip_count = 0u32;

    let mut record = |name: &str, result: &CheckResult| {
        print_check(name, result);
        match result {
            CheckResult::Pass(_) => pass_count += 1,
            CheckResult::Fail(_) => fail_count += 1,
            CheckResult::Skip(_) => skip_count += 1,
        }
    };

    println!("\n  Config");
    println!("  {}", "-".repeat(56));

    let r = check_config_file(config_path);
    record("Config file", &r);

    let config_result = config::load_config(config_path);
    let r = check_config_loads(config_path);
    record("Config loads", &r);

    let config = config_result.unwrap_or_default();

    let r = check_intrusive_policy(&config);
    record("Intrusive policy", &r);

    println!("\n  Scanner binaries");
    println!("  {}", "-".repeat(56));

    for tool in build_tools(&config) {
        let r = check_tool_binary(tool.command_name());
        record(tool.name(), &r);
    }

    println!("\n  Environment");
    println!("  {}", "-".repeat(56));

    let r = check_external_command("sh", &["-c", "echo ok"]);
    record("POSIX shell", &r);

    let r = check_dependencies(&config);
    record("Configured dependencies", &r);

    println!("\n{}", "=".repeat(60));
    println!(
        "  {} passed, {} failed, {} skipped",
        pass_count, fail_count, skip_count
    );

    if fail_count > 0 {
        println!("\n  Some checks failed. Review the output above.");
    } else {
        println!("\n  All checks passed!");
    }

    // Only an unloadable config is fatal for diagnostics
    let critical_fail = check_config_loads(config_path).is_fail();
    if critical_fail {
        anyhow::bail!("critical checks failed");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_result_variants() {
        let pass = CheckResult::Pass("ok".to_string());
        assert_eq!(pass.label(), "PASS");
        assert_eq!(pass.detail(), "ok");
        assert!(!pass.is_fail());

        let fail = CheckResult::Fail("bad".to_string());
        assert_eq!(fail.label(), "FAIL");
        assert!(fail.is_fail());

        let skip = CheckResult::Skip("n/a".to_string());
        assert_eq!(skip.label(), "SKIP");
        assert!(!skip.is_fail());
    }

    #[test]
    fn test_check_shell_available() {
        let result = check_external_command("sh", &["-c", "echo ok"]);
        assert!(matches!(result, CheckResult::Pass(_)));
    }

    #[test]
    fn test_check_missing_binary_fails() {
        let result = check_tool_binary("scangate-no-such-binary");
        assert!(result.is_fail());
    }

    #[test]
    fn test_check_config_without_path_skips() {
        let result = check_config_file(None);
        assert!(matches!(result, CheckResult::Skip(_)));
    }
}
