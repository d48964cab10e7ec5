use std::fmt::Write;

use crate::config::ScanResults;

/// Human-readable summary for terminal output.
pub(super) fn render(results: &ScanResults) -> String {
    let mut out = String::new();
    let passive = &results.passive;

    let _ = writeln!(out, "MCP server scan");
    let _ = writeln!(out, "===============");
    let _ = writeln!(
        out,
        "Checked {} config files, {} processes, {} sockets, {} containers in {:.2}s",
        passive.config_files_checked,
        passive.processes_scanned,
        passive.network_sockets_checked,
        passive.containers_scanned,
        passive.scan_duration_seconds,
    );
    let _ = writeln!(out);

    if passive.candidates.is_empty() {
        let _ = writeln!(out, "No candidates found.");
    } else {
        let _ = writeln!(out, "Candidates ({}):", passive.candidates.len());
        for candidate in &passive.candidates {
            let identity = if !candidate.command.is_empty() {
                candidate.command.clone()
            } else if !candidate.url.is_empty() {
                candidate.url.clone()
            } else if candidate.pid > 0 {
                format!("pid {}", candidate.pid)
            } else {
                "(unidentified)".to_string()
            };
            let direct = if candidate.is_direct_detection() {
                "  [direct]"
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "  {:>5.0}%  {identity}{direct}",
                candidate.confidence_score * 100.0
            );
            for evidence in &candidate.evidence {
                let marker = if evidence.is_negative { "!" } else { "-" };
                let _ = writeln!(
                    out,
                    "           {marker} {} ({:.2}) {}",
                    evidence.kind, evidence.confidence, evidence.description
                );
            }
        }
    }

    if let Some(active) = &results.active {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Active phase: tested {}, confirmed {}, failed {} in {:.2}s",
            active.candidates_tested_count,
            active.servers_confirmed_count,
            active.tests_failed_count,
            active.scan_duration_seconds,
        );

        if !active.confirmed_servers.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Confirmed servers ({}):", active.confirmed_servers.len());
            for server in &active.confirmed_servers {
                let name = if server.server_name.is_empty() {
                    "(unnamed)"
                } else {
                    server.server_name.as_str()
                };
                let _ = writeln!(
                    out,
                    "  {name} {}  [{:?}] {}",
                    server.server_version,
                    server.transport_type,
                    server.endpoint()
                );
                if !server.protocol_version.is_empty() {
                    let _ = writeln!(out, "      protocol: {}", server.protocol_version);
                }
                if server.interrogation_attempted {
                    let _ = writeln!(
                        out,
                        "      tools: {}, resources: {}, templates: {}, prompts: {} ({:.2}s{})",
                        server.tools.len(),
                        server.resources.len(),
                        server.resource_templates.len(),
                        server.prompts.len(),
                        server.interrogation_time_seconds,
                        if server.interrogation_successful {
                            ""
                        } else {
                            ", with errors"
                        },
                    );
                    for tool in &server.tools {
                        let _ = writeln!(out, "        tool {}: {}", tool.name, tool.description);
                    }
                    for error in &server.interrogation_errors {
                        let _ = writeln!(out, "        error: {error}");
                    }
                }
            }
        }
    }

    if !results.errors.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Errors:");
        for error in &results.errors {
            let _ = writeln!(out, "  {error}");
        }
    }

    out
}
