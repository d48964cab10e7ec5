use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::config::{ScanConfig, ScanMode};
use crate::platform::ListeningSocket;
use crate::platform::mock::{MockPlatform, MockProcess};

const CLAUDE_CONFIG: &str = "/home/tester/.config/Claude/claude_desktop_config.json";

fn scanner(platform: MockPlatform) -> Scanner {
    Scanner::new(Arc::new(platform))
}

fn populated_platform() -> MockPlatform {
    let mut platform = MockPlatform::default();
    platform.files.insert(
        CLAUDE_CONFIG.to_string(),
        json!({"mcpServers": {"fs": {"command": "node", "args": ["/a/b.js"]}}}),
    );
    platform.processes = vec![
        MockProcess {
            pid: 123,
            name: "node".to_string(),
            command: "node /a/b.js".to_string(),
            parent_pid: 1,
            bidirectional_pipes: true,
            ..MockProcess::default()
        },
        MockProcess {
            pid: 200,
            name: "chrome_crashpad_handler".to_string(),
            command: "chrome_crashpad_handler --enable-crashpad".to_string(),
            parent_pid: 1,
            bidirectional_pipes: true,
            ..MockProcess::default()
        },
    ];
    platform.sockets = vec![ListeningSocket {
        pid: 0,
        address: "0.0.0.0".to_string(),
        port: 3000,
        protocol: "tcp".to_string(),
        process_name: String::new(),
    }];
    platform
}

#[test]
fn embedded_rulepacks_parse() {
    let default = crate::rulepack::Rulepack::from_str(DEFAULT_RULEPACK).unwrap();
    assert!(!default.rules.is_empty());

    let exclusions = crate::rulepack::Rulepack::from_str(EXCLUSIONS_RULEPACK).unwrap();
    assert!(!exclusions.rules.is_empty());
}

#[tokio::test]
async fn passive_scan_discovers_and_merges_across_sources() {
    let scanner = scanner(populated_platform());
    let results = scanner.scan(&ScanConfig::default()).await;

    assert!(results.active.is_none());
    assert_eq!(results.passive.config_files_checked, 1);
    assert_eq!(results.passive.processes_scanned, 2);
    assert_eq!(results.passive.network_sockets_checked, 1);

    // The declared server and the running pid 123 share a command line and
    // merge into one candidate; the crashpad helper and the listener stay
    // separate.
    let merged = results
        .passive
        .candidates
        .iter()
        .find(|c| c.command == "node /a/b.js")
        .expect("merged candidate");
    assert_eq!(merged.config_key, "fs");
    assert!(merged.evidence.len() >= 2);
    assert!(merged.confidence_score > 0.9);
    assert_eq!(results.passive.candidates.len(), 3);
}

#[tokio::test]
async fn exclusion_rulepack_vetoes_and_filter_drops() {
    let mut config = ScanConfig::default();
    config.passive.min_confidence = 0.1;

    let scanner = scanner(populated_platform()).with_default_rulepacks();
    let results = scanner.scan(&config).await;

    assert!(
        !results
            .passive
            .candidates
            .iter()
            .any(|c| c.process_name == "chrome_crashpad_handler"),
        "vetoed candidate must not survive the confidence filter"
    );
}

#[tokio::test]
async fn min_confidence_filters_low_scores() {
    let mut config = ScanConfig::default();
    config.passive.min_confidence = 0.5;

    let scanner = scanner(populated_platform());
    let results = scanner.scan(&config).await;

    // The 0.10 network listener is gone; the merged high-confidence
    // candidate survives.
    assert!(
        results
            .passive
            .candidates
            .iter()
            .all(|c| c.confidence_score >= 0.5)
    );
    assert!(!results.passive.candidates.is_empty());
}

#[tokio::test]
async fn candidate_cap_keeps_highest_confidence() {
    let mut platform = MockPlatform::default();
    platform.sockets = (0..20)
        .map(|i| ListeningSocket {
            pid: 0,
            address: "127.0.0.1".to_string(),
            port: 9000 + i,
            // Half the listeners are UDP and score lower.
            protocol: if i % 2 == 0 { "tcp" } else { "udp" }.to_string(),
            process_name: String::new(),
        })
        .collect();

    let mut config = ScanConfig::default();
    config.passive.scan_configs = false;
    config.passive.scan_processes = false;
    config.passive.max_candidates = 5;

    let results = scanner(platform).scan(&config).await;
    assert_eq!(results.passive.candidates.len(), 5);
    for candidate in &results.passive.candidates {
        assert!((candidate.confidence_score - 0.10).abs() < 1e-9, "tcp only");
    }
}

#[tokio::test]
async fn output_is_sorted_by_descending_confidence() {
    let results = scanner(populated_platform()).scan(&ScanConfig::default()).await;
    let scores: Vec<f64> = results
        .passive
        .candidates
        .iter()
        .map(|c| c.confidence_score)
        .collect();
    let mut sorted = scores.clone();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
    assert_eq!(scores, sorted);
}

#[tokio::test]
async fn source_failure_is_isolated() {
    let mut platform = populated_platform();
    platform.fail_process_list = true;

    let results = scanner(platform).scan(&ScanConfig::default()).await;

    // The process source failed, but config and network candidates are
    // still there and the error is recorded at both levels.
    assert!(!results.passive.candidates.is_empty());
    assert!(
        results
            .passive
            .errors
            .iter()
            .any(|e| e.starts_with("process source:"))
    );
    assert!(results.errors.iter().any(|e| e.starts_with("Passive scan:")));
}

#[tokio::test]
async fn disabled_sources_are_not_run() {
    let mut config = ScanConfig::default();
    config.passive.scan_configs = false;
    config.passive.scan_network = false;
    config.passive.scan_processes = false;

    let results = scanner(populated_platform()).scan(&config).await;
    assert_eq!(results.passive.config_files_checked, 0);
    assert_eq!(results.passive.processes_scanned, 0);
    assert_eq!(results.passive.network_sockets_checked, 0);
    assert!(results.passive.candidates.is_empty());
}

#[tokio::test]
async fn active_phase_skips_listed_candidates_and_records_failures() {
    let mut platform = MockPlatform::default();
    platform.processes = vec![MockProcess {
        pid: 77,
        name: "mystery".to_string(),
        command: "/nonexistent/mystery-server".to_string(),
        parent_pid: 1,
        bidirectional_pipes: true,
        ..MockProcess::default()
    }];

    let mut config = ScanConfig::default();
    config.mode = ScanMode::PassiveThenActive;
    config.passive.scan_configs = false;
    config.passive.scan_network = false;
    config.active.probe_timeout = std::time::Duration::from_millis(200);

    // First without the skip list: the spawn fails and the candidate lands
    // in failed_tests with a probe error.
    let results = scanner(platform.clone()).scan(&config).await;
    let active = results.active.as_ref().expect("active results");
    assert_eq!(active.candidates_tested_count, 1);
    assert_eq!(active.tests_failed_count, 1);
    assert_eq!(active.failed_tests.len(), 1);
    assert!(active.errors[0].contains("stdio:"), "err={}", active.errors[0]);

    // With the pid on the skip list nothing is tested.
    config.active.skip_pids = vec![77];
    let results = scanner(platform).scan(&config).await;
    let active = results.active.as_ref().expect("active results");
    assert_eq!(active.candidates_tested_count, 0);
    assert!(active.failed_tests.is_empty());
}

#[tokio::test]
async fn active_only_mode_runs_no_discovery() {
    let config = ScanConfig {
        mode: ScanMode::ActiveOnly,
        ..ScanConfig::default()
    };
    let results = scanner(populated_platform()).scan(&config).await;

    assert!(results.passive.candidates.is_empty());
    assert_eq!(results.passive.processes_scanned, 0);
    let active = results.active.expect("active results");
    assert_eq!(active.candidates_tested_count, 0);
}

#[tokio::test]
async fn url_skip_list_applies_to_network_candidates() {
    let mut platform = MockPlatform::default();
    platform.sockets = vec![ListeningSocket {
        pid: 0,
        address: "127.0.0.1".to_string(),
        port: 1,
        protocol: "tcp".to_string(),
        process_name: String::new(),
    }];

    let mut config = ScanConfig::default();
    config.mode = ScanMode::PassiveThenActive;
    config.passive.scan_configs = false;
    config.passive.scan_processes = false;
    config.active.probe_timeout = std::time::Duration::from_millis(200);
    config.active.skip_urls = vec!["http://127.0.0.1:1".to_string()];

    let results = scanner(platform).scan(&config).await;
    let active = results.active.expect("active results");
    assert_eq!(active.candidates_tested_count, 0);
    assert_eq!(active.candidates_tested.len(), 1);
}
