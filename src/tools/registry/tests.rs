use super::*;
use crate::config::Config;
use crate::tools::build_tools;

fn registry_with(include: &[&str], exclude: &[&str]) -> ToolRegistry {
    let include: Vec<String> = include.iter().map(|s| (*s).to_string()).collect();
    let exclude: Vec<String> = exclude.iter().map(|s| (*s).to_string()).collect();
    ToolRegistry::new(build_tools(&Config::default()), &include, &exclude)
}

#[test]
fn test_all_enabled_by_default() {
    let registry = registry_with(&[], &[]);
    let (enabled, total) = registry.counts();
    assert_eq!(total, 4);
    assert_eq!(enabled, 4);
    assert_eq!(
        registry.tool_names(),
        vec!["GobusterTool", "MasscanTool", "NmapTool", "SqlmapTool"]
    );
}

#[test]
fn test_include_whitelist() {
    let registry = registry_with(&["NmapTool"], &[]);
    assert!(registry.is_enabled("NmapTool"));
    assert!(!registry.is_enabled("SqlmapTool"));
    let (enabled, total) = registry.counts();
    assert_eq!((enabled, total), (1, 4));
}

#[test]
fn test_exclude_wins() {
    let registry = registry_with(&[], &["SqlmapTool"]);
    assert!(!registry.is_enabled("SqlmapTool"));
    assert!(registry.is_enabled("NmapTool"));

    // Exclude beats include when both name the same tool
    let registry = registry_with(&["SqlmapTool"], &["SqlmapTool"]);
    assert!(!registry.is_enabled("SqlmapTool"));
}

#[test]
fn test_enable_disable_roundtrip() {
    let registry = registry_with(&[], &["MasscanTool"]);
    assert!(!registry.is_enabled("MasscanTool"));
    assert!(registry.enable("MasscanTool"));
    assert!(registry.is_enabled("MasscanTool"));
    assert!(registry.disable("MasscanTool"));
    assert!(!registry.is_enabled("MasscanTool"));
}

#[test]
fn test_unknown_tool_operations() {
    let registry = registry_with(&[], &[]);
    assert!(registry.get("NopeTool").is_none());
    assert!(!registry.enable("NopeTool"));
    assert!(!registry.disable("NopeTool"));
}

#[test]
fn test_enabled_tools_respects_set() {
    let registry = registry_with(&["NmapTool", "GobusterTool"], &[]);
    let names: Vec<&str> = registry.enabled_tools().iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["GobusterTool", "NmapTool"]);
}

#[test]
fn test_listings_flag_enabled_state() {
    let registry = registry_with(&[], &["SqlmapTool"]);
    let listings = registry.listings();
    assert_eq!(listings.len(), 4);
    let sqlmap = listings.iter().find(|l| l.info.name == "SqlmapTool").unwrap();
    assert!(!sqlmap.enabled);
    let nmap = listings.iter().find(|l| l.info.name == "NmapTool").unwrap();
    assert!(nmap.enabled);
}

#[test]
fn test_listing_serializes_flat() {
    let registry = registry_with(&[], &[]);
    let json = serde_json::to_value(registry.listings()).unwrap();
    let first = &json[0];
    assert!(first["enabled"].is_boolean());
    assert!(first["name"].is_string());
    assert!(first["allowed_flags"].is_array());
}
