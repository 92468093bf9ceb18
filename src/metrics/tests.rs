use super::*;

fn registry() -> MetricsRegistry {
    MetricsRegistry::new(1000, Duration::from_secs(3600))
}

#[test]
fn test_record_and_read_basic_stats() {
    let metrics = registry();
    metrics.record_execution("NmapTool", true, 1.0, false, None);
    metrics.record_execution("NmapTool", true, 3.0, false, None);
    metrics.record_execution("NmapTool", false, 2.0, true, Some("timeout"));

    let stats = metrics.tool_stats("NmapTool").unwrap();
    assert_eq!(stats.execution_count, 3);
    assert_eq!(stats.success_count, 2);
    assert_eq!(stats.failure_count, 1);
    assert_eq!(stats.timeout_count, 1);
    assert_eq!(stats.error_count, 1);
    assert!((stats.average_execution_time - 2.0).abs() < 1e-9);
    assert!((stats.min_execution_time - 1.0).abs() < 1e-9);
    assert!((stats.max_execution_time - 3.0).abs() < 1e-9);
    assert!((stats.success_rate - 66.66).abs() < 0.01);
}

#[test]
fn test_unknown_tool_has_no_stats() {
    assert!(registry().tool_stats("NopeTool").is_none());
}

#[test]
fn test_nan_and_infinite_durations_sanitized() {
    let metrics = registry();
    metrics.record_execution("t", true, f64::NAN, false, None);
    metrics.record_execution("t", true, f64::INFINITY, false, None);
    metrics.record_execution("t", true, -5.0, false, None);

    let stats = metrics.tool_stats("t").unwrap();
    assert_eq!(stats.execution_count, 3);
    assert!(stats.average_execution_time.is_finite());
    assert_eq!(stats.min_execution_time, 0.0);
    assert_eq!(stats.max_execution_time, 0.0);
}

#[test]
fn test_recent_window_bounded_at_100() {
    let metrics = registry();
    for i in 0..150 {
        metrics.record_execution("t", true, f64::from(i), false, None);
    }
    let stats = metrics.tool_stats("t").unwrap();
    assert_eq!(stats.execution_count, 150);
    // Window holds executions 50..149, so p50 sits mid-window
    assert!(stats.p50_execution_time >= 50.0);
    assert!(stats.p99_execution_time <= 149.0);
}

#[test]
fn test_percentiles_ordering() {
    let metrics = registry();
    for i in 1..=100 {
        metrics.record_execution("t", true, f64::from(i) / 100.0, false, None);
    }
    let stats = metrics.tool_stats("t").unwrap();
    assert!(stats.p50_execution_time <= stats.p95_execution_time);
    assert!(stats.p95_execution_time <= stats.p99_execution_time);
}

#[test]
fn test_recent_failure_rate() {
    let metrics = registry();
    for i in 0..10 {
        metrics.record_execution("t", i % 2 == 0, 1.0, false, None);
    }
    let stats = metrics.tool_stats("t").unwrap();
    assert!((stats.recent_failure_rate - 50.0).abs() < f64::EPSILON);
}

#[test]
fn test_lru_eviction_at_cap() {
    let metrics = MetricsRegistry::new(3, Duration::from_secs(3600));
    let tick = Duration::from_millis(2);
    metrics.record_execution("a", true, 1.0, false, None);
    std::thread::sleep(tick);
    metrics.record_execution("b", true, 1.0, false, None);
    std::thread::sleep(tick);
    metrics.record_execution("c", true, 1.0, false, None);
    std::thread::sleep(tick);
    // Touch "a" so "b" is the least recently used
    metrics.record_execution("a", true, 1.0, false, None);
    metrics.record_execution("d", true, 1.0, false, None);

    assert_eq!(metrics.tracked_tools(), 3);
    assert!(metrics.tool_stats("b").is_none());
    assert!(metrics.tool_stats("a").is_some());
    assert!(metrics.tool_stats("d").is_some());
}

#[test]
fn test_system_counters() {
    let metrics = registry();
    metrics.system.record_request();
    metrics.system.record_request();
    metrics.system.record_error();
    metrics.system.connection_opened();

    let snapshot = metrics.system.snapshot();
    assert_eq!(snapshot.requests, 2);
    assert_eq!(snapshot.errors, 1);
    assert_eq!(snapshot.active_connections, 1);
    assert!(snapshot.uptime_seconds >= 0.0);

    metrics.system.connection_closed();
    assert_eq!(metrics.system.snapshot().active_connections, 0);
}

#[test]
fn test_all_tool_stats_sorted() {
    let metrics = registry();
    metrics.record_execution("zz", true, 1.0, false, None);
    metrics.record_execution("aa", true, 1.0, false, None);
    let all = metrics.all_tool_stats();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].tool_name, "aa");
    assert_eq!(all[1].tool_name, "zz");
}

#[test]
fn test_install_prometheus_idempotent() {
    // Both calls resolve to the same OnceLock slot without panicking.
    // (Another recorder may already be installed by a parallel test; either
    // way the two results must agree.)
    let first = install_prometheus().is_some();
    let second = install_prometheus().is_some();
    assert_eq!(first, second);
}
