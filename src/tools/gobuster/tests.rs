use super::*;
use crate::config::Config;
use std::io::Write;

fn tool() -> GobusterTool {
    GobusterTool::new(&Config::default())
}

fn build(target: &str, args: &str) -> Result<PreparedCommand, ValidationError> {
    tool().validate_and_build(&ToolInput::new(target, args))
}

fn wordlist(lines: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for i in 0..lines {
        writeln!(file, "entry{}", i).unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn test_dir_mode_happy_path() {
    let list = wordlist(10);
    let args = format!("dir -w {}", list.path().display());
    let prepared = build("http://10.0.0.5/", &args).unwrap();

    assert_eq!(prepared.args[0], "dir");
    let joined = prepared.args.join(" ");
    assert!(joined.contains("-u http://10.0.0.5/"));
    assert!(joined.contains(&format!("-w {}", list.path().display())));
    // Mode defaults injected
    assert!(joined.contains("-s 200,204,301,302,307,401,403"));
    assert!(joined.contains("-t 10"));
    assert!(joined.contains("--timeout 10s"));
    assert!(prepared.optimizations_applied.contains(&"-q".to_string()));
    assert!(prepared.optimizations_applied.contains(&"--no-progress".to_string()));
}

#[test]
fn test_dns_mode_happy_path() {
    let list = wordlist(10);
    let args = format!("dns -w {}", list.path().display());
    let prepared = build("corp.lab.internal", &args).unwrap();

    assert_eq!(prepared.args[0], "dns");
    let joined = prepared.args.join(" ");
    assert!(joined.contains("-d corp.lab.internal"));
    assert!(joined.contains("--wildcard"));
    assert!(joined.contains("-t 20"));
}

#[test]
fn test_vhost_mode_defaults() {
    let list = wordlist(10);
    let args = format!("vhost -w {}", list.path().display());
    let prepared = build("http://app.lab.internal/", &args).unwrap();
    let joined = prepared.args.join(" ");
    assert!(joined.contains("--append-domain"));
    assert!(joined.contains("-t 10"));
}

#[test]
fn test_missing_mode_rejected() {
    let err = build("http://10.0.0.5/", "-w /tmp/list.txt").unwrap_err();
    assert!(err.message.contains("requires a mode"));
    let err = build("http://10.0.0.5/", "").unwrap_err();
    assert!(err.message.contains("requires a mode"));
}

#[test]
fn test_unknown_mode_rejected() {
    let err = build("http://10.0.0.5/", "fuzz -w /tmp/x").unwrap_err();
    assert!(err.message.contains("mode not allowed"));
}

#[test]
fn test_second_mode_rejected() {
    let list = wordlist(5);
    let args = format!("dir dns -w {}", list.path().display());
    let err = build("http://10.0.0.5/", &args).unwrap_err();
    assert!(err.message.contains("Multiple modes"));
}

#[test]
fn test_dns_mode_rejects_url_target() {
    let list = wordlist(5);
    let args = format!("dns -w {}", list.path().display());
    let err = build("http://10.0.0.5", &args).unwrap_err();
    assert!(err.message.contains("domain, not a URL"));
}

#[test]
fn test_dns_mode_rejects_external_domain() {
    let list = wordlist(5);
    let args = format!("dns -w {}", list.path().display());
    let err = build("example.com", &args).unwrap_err();
    assert!(err.message.contains(".lab.internal"));
}

#[test]
fn test_dir_mode_requires_url_target() {
    let list = wordlist(5);
    let args = format!("dir -w {}", list.path().display());
    let err = build("10.0.0.5", &args).unwrap_err();
    assert!(err.message.contains("Invalid target"));
}

#[test]
fn test_dir_mode_rejects_public_url_host() {
    let list = wordlist(5);
    let args = format!("dir -w {}", list.path().display());
    let err = build("http://8.8.8.8/", &args).unwrap_err();
    assert!(err.message.contains("Invalid target"));
}

#[test]
fn test_missing_wordlist_rejected() {
    let err = build("http://10.0.0.5/", "dir -w /nonexistent/words.txt").unwrap_err();
    assert!(err.message.contains("Wordlist not found"));
}

#[test]
fn test_caller_url_not_overridden() {
    let list = wordlist(5);
    let args = format!("dir -u http://192.168.1.7/app -w {}", list.path().display());
    let prepared = build("http://10.0.0.5/", &args).unwrap();
    let joined = prepared.args.join(" ");
    assert!(joined.contains("-u http://192.168.1.7/app"));
    // Target injection skipped; only one -u present
    assert_eq!(prepared.args.iter().filter(|a| *a == "-u").count(), 1);
}

#[test]
fn test_thread_count_clamped_to_mode_cap() {
    let list = wordlist(5);
    let args = format!("dir -t 100 -w {}", list.path().display());
    let prepared = build("http://10.0.0.5/", &args).unwrap();
    let idx = prepared.args.iter().position(|a| a == "-t").unwrap();
    assert_eq!(prepared.args[idx + 1], "30");
}

#[test]
fn test_invalid_thread_count_rejected() {
    let list = wordlist(5);
    let args = format!("dir -t zero -w {}", list.path().display());
    let err = build("http://10.0.0.5/", &args).unwrap_err();
    assert!(err.message.contains("Invalid thread count"));
}

#[test]
fn test_extensions_filtered_without_intrusive() {
    let list = wordlist(5);
    let args = format!("dir -x php,jsp,txt -w {}", list.path().display());
    let prepared = build("http://10.0.0.5/", &args).unwrap();
    let idx = prepared.args.iter().position(|a| a == "-x").unwrap();
    // jsp is not in the safe set
    assert_eq!(prepared.args[idx + 1], "php,txt");
}

#[test]
fn test_extensions_unfiltered_with_intrusive() {
    let mut config = Config::default();
    config.security.allow_intrusive = true;
    let tool = GobusterTool::new(&config);
    let list = wordlist(5);
    let args = format!("dir -x php,jsp -w {}", list.path().display());
    let prepared = tool
        .validate_and_build(&ToolInput::new("http://10.0.0.5/", args))
        .unwrap();
    let idx = prepared.args.iter().position(|a| a == "-x").unwrap();
    assert_eq!(prepared.args[idx + 1], "php,jsp");
}

#[test]
fn test_extensions_all_filtered_fails() {
    let list = wordlist(5);
    let args = format!("dir -x jsp,war -w {}", list.path().display());
    let err = build("http://10.0.0.5/", &args).unwrap_err();
    assert!(err.message.contains("No allowed extensions"));
}

#[test]
fn test_extensions_bad_characters_rejected() {
    let list = wordlist(5);
    let args = format!("dir -x php.bak -w {}", list.path().display());
    let err = build("http://10.0.0.5/", &args).unwrap_err();
    assert!(err.message.contains("Invalid extensions"));
}

#[test]
fn test_info_lists_modes() {
    let info = tool().info();
    assert_eq!(info.name, "GobusterTool");
    assert_eq!(
        info.extras["allowed_modes"],
        serde_json::json!(["dir", "dns", "vhost"])
    );
}
