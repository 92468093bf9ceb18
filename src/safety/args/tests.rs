use super::*;

fn policy() -> ArgPolicy<'static> {
    ArgPolicy::new(2048)
}

#[test]
fn test_clean_args_pass() {
    let tokens = sanitize("-sV -p 22,80", &policy()).unwrap();
    assert_eq!(tokens, vec!["-sV", "-p", "22,80"]);
}

#[test]
fn test_empty_args_ok() {
    assert!(sanitize("", &policy()).unwrap().is_empty());
    assert!(sanitize("   ", &policy()).unwrap().is_empty());
}

#[test]
fn test_metacharacters_rejected() {
    for args in [
        "-sV; rm -rf /",
        "-p 80 && whoami",
        "-p `id`",
        "-p $(id)",
        "-oN > /etc/passwd",
        "-p 80\nwhoami",
        "-p 80 | tee out",
    ] {
        let err = sanitize(args, &policy()).unwrap_err();
        assert!(
            err.message.contains("metacharacter"),
            "{:?} should cite the metacharacter, got {:?}",
            args,
            err.message
        );
    }
}

#[test]
fn test_length_cap_enforced() {
    let long = "-p ".to_string() + &"1,".repeat(2000);
    let err = sanitize(&long, &ArgPolicy::new(2048)).unwrap_err();
    assert!(err.message.contains("too long"));
}

#[test]
fn test_unbalanced_quotes_rejected() {
    assert!(sanitize("-p \"80", &policy()).is_err());
}

#[test]
fn test_disallowed_token_characters() {
    let err = sanitize("-p 80 !bang", &policy()).unwrap_err();
    assert!(err.message.contains("Disallowed token"));
}

#[test]
fn test_flag_allowlist_prefix_match() {
    let flags = &["-p", "--top-ports", "-T"];
    let p = ArgPolicy::new(2048).with_flags(flags);
    assert!(sanitize("-p 80 --top-ports 100 -T4", &p).is_ok());
    let err = sanitize("--script vuln", &p).unwrap_err();
    assert!(err.message.contains("Flag not allowed"));
}

#[test]
fn test_extra_tokens_bypass_character_class() {
    let p = ArgPolicy::new(2048).with_extra_tokens(&["a*b"]);
    assert!(sanitize("a*b", &ArgPolicy::new(2048)).is_err());
    let tokens = sanitize("a*b", &p).unwrap();
    assert_eq!(tokens[0], "a*b");
}

#[test]
fn test_quoted_values_tokenize() {
    let tokens = sanitize("-w /tmp/list.txt -t 10", &policy()).unwrap();
    assert_eq!(tokens.len(), 4);
}
