#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use mcp_scout::candidate::{Candidate, Transport};
use mcp_scout::config::{ActiveScanConfig, InterrogationConfig};
use mcp_scout::probe::{ProtocolDetector, ProtocolType, StdioProbe, split_command};
use mcp_scout::scan::ActiveScanner;
use scout_jsonrpc::PipeProcess;

/// Writes an executable shell script and returns its path.
fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut permissions = std::fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).unwrap();
    path.to_string_lossy().into_owned()
}

/// A scripted server that answers initialize and tools/list.
fn scripted_server(dir: &Path) -> String {
    write_script(
        dir,
        "fake-mcp-server",
        r#"while read line; do
  case "$line" in
    *initialize*) printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","serverInfo":{"name":"scripted","version":"1.0"},"capabilities":{"tools":{}}}}' ;;
    *tools/list*) printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"tools":[{"name":"echo","description":"Echo text","inputSchema":{"type":"object","properties":{"text":{},"upper":{}},"required":["text"]}}]}}' ;;
    *) printf '%s\n' '{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}' ;;
  esac
done
"#,
    )
}

fn stdio_candidate(command: String) -> Candidate {
    Candidate {
        command,
        transport_hint: Transport::Stdio,
        ..Candidate::default()
    }
}

#[tokio::test]
async fn handshake_confirms_scripted_server() {
    let dir = tempfile::tempdir().unwrap();
    let candidate = stdio_candidate(scripted_server(dir.path()));

    let probe = StdioProbe::new(Duration::from_secs(5));
    let server = probe.test(&candidate).await.unwrap().expect("confirmed");

    assert_eq!(server.transport_type, Transport::Stdio);
    assert_eq!(server.server_name, "scripted");
    assert_eq!(server.server_version, "1.0");
    assert_eq!(server.protocol_version, "2024-11-05");
    assert!(server.has_tools());
}

#[tokio::test]
async fn error_response_still_confirms_without_info() {
    let dir = tempfile::tempdir().unwrap();
    let command = write_script(
        dir.path(),
        "rejecting-server",
        r#"read line
printf '%s\n' '{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"unauthorized"}}'
"#,
    );
    let candidate = stdio_candidate(command);

    let probe = StdioProbe::new(Duration::from_secs(5));
    let server = probe.test(&candidate).await.unwrap().expect("confirmed");
    assert!(server.server_name.is_empty());
    assert!(server.protocol_version.is_empty());
}

#[tokio::test]
async fn non_json_output_is_not_a_server() {
    let dir = tempfile::tempdir().unwrap();
    let command = write_script(
        dir.path(),
        "chatty-tool",
        r#"read line
echo "usage: chatty-tool [options]"
"#,
    );
    let candidate = stdio_candidate(command);

    let probe = StdioProbe::new(Duration::from_secs(5));
    assert!(probe.test(&candidate).await.unwrap().is_none());
}

#[tokio::test]
async fn non_jsonrpc_json_is_not_a_server() {
    let dir = tempfile::tempdir().unwrap();
    let command = write_script(
        dir.path(),
        "json-tool",
        r#"read line
printf '%s\n' '{"status":"ok"}'
"#,
    );
    let candidate = stdio_candidate(command);

    let probe = StdioProbe::new(Duration::from_secs(5));
    assert!(probe.test(&candidate).await.unwrap().is_none());
}

#[tokio::test]
async fn silent_server_times_out_with_probe_error() {
    let dir = tempfile::tempdir().unwrap();
    let command = write_script(dir.path(), "silent-server", "sleep 30\n");
    let candidate = stdio_candidate(command);

    let probe = StdioProbe::new(Duration::from_millis(200));
    let err = probe.test(&candidate).await.expect_err("should time out");
    assert!(format!("{err:#}").contains("timed out"), "err={err:#}");
}

#[tokio::test]
async fn active_scan_confirms_and_interrogates() {
    let dir = tempfile::tempdir().unwrap();
    let candidate = stdio_candidate(scripted_server(dir.path()));

    let config = ActiveScanConfig {
        probe_timeout: Duration::from_secs(5),
        interrogate: true,
        interrogation: InterrogationConfig {
            enabled: true,
            timeout: Duration::from_secs(5),
            ..InterrogationConfig::default()
        },
        ..ActiveScanConfig::default()
    };

    let scanner = ActiveScanner::new(&config).unwrap();
    let results = scanner.scan(vec![candidate], &config).await;

    assert_eq!(results.servers_confirmed_count, 1);
    assert_eq!(results.tests_failed_count, 0);

    let server = &results.confirmed_servers[0];
    assert!(server.interrogation_attempted);
    assert!(
        server.interrogation_successful,
        "errors: {:?}",
        server.interrogation_errors
    );
    assert_eq!(server.tools.len(), 1);
    assert_eq!(server.tools[0].name, "echo");
    assert_eq!(server.tools[0].required_parameters, vec!["text"]);
    assert_eq!(server.tools[0].optional_parameters, vec!["upper"]);
    // Only tools were advertised; nothing else was requested.
    assert!(server.resources.is_empty());
    assert!(server.prompts.is_empty());
}

#[tokio::test]
async fn active_detection_identifies_mcp() {
    let dir = tempfile::tempdir().unwrap();
    let command = scripted_server(dir.path());
    let (program, args) = split_command(&command).unwrap();
    let mut process = PipeProcess::spawn(&program, &args).await.unwrap();

    let signature = ProtocolDetector::new()
        .detect_from_stdio(&mut process, Duration::from_secs(5))
        .await;
    process.terminate().await;

    assert_eq!(signature.protocol, ProtocolType::Mcp);
    assert!(signature.confidence >= 0.99);
}

#[tokio::test]
async fn active_detection_identifies_lsp_framing() {
    let dir = tempfile::tempdir().unwrap();
    // Ignores the newline-delimited MCP probe (which times out) and answers
    // Content-Length framed requests with an LSP frame.
    let command = write_script(
        dir.path(),
        "fake-lsp-server",
        r#"while read line; do
  case "$line" in
    Content-Length*) printf 'Content-Length: 52\r\n\r\n{"jsonrpc":"2.0","id":1,"result":{"capabilities":{}}}' ;;
  esac
done
"#,
    );
    let (program, args) = split_command(&command).unwrap();
    let mut process = PipeProcess::spawn(&program, &args).await.unwrap();

    let signature = ProtocolDetector::new()
        .detect_from_stdio(&mut process, Duration::from_millis(500))
        .await;
    process.terminate().await;

    assert_eq!(signature.protocol, ProtocolType::Lsp);
    assert!(signature.confidence >= 0.95);
}

#[tokio::test]
async fn failed_probe_lands_in_failed_tests() {
    let candidate = stdio_candidate("/nonexistent/not-a-server".to_string());

    let config = ActiveScanConfig {
        probe_timeout: Duration::from_millis(500),
        ..ActiveScanConfig::default()
    };
    let scanner = ActiveScanner::new(&config).unwrap();
    let results = scanner.scan(vec![candidate], &config).await;

    assert_eq!(results.servers_confirmed_count, 0);
    assert_eq!(results.tests_failed_count, 1);
    assert_eq!(results.failed_tests.len(), 1);
    assert!(results.errors[0].contains("stdio:"), "err={}", results.errors[0]);
}
