use std::fmt::Write;

use crate::config::ScanResults;

/// One row per candidate and one per confirmed server, with a leading
/// record-type column.
pub(super) fn render(results: &ScanResults) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "record,confidence,transport,pid,command,url,config_file,config_key,server_name,server_version,protocol_version,direct_detection,evidence_count"
    );

    for candidate in &results.passive.candidates {
        let _ = writeln!(
            out,
            "candidate,{:.2},{:?},{},{},{},{},{},,,,{},{}",
            candidate.confidence_score,
            candidate.transport_hint,
            if candidate.pid > 0 {
                candidate.pid.to_string()
            } else {
                String::new()
            },
            escape(&candidate.command),
            escape(&candidate.url),
            escape(&candidate.config_file),
            escape(&candidate.config_key),
            candidate.is_direct_detection(),
            candidate.evidence.len(),
        );
    }

    if let Some(active) = &results.active {
        for server in &active.confirmed_servers {
            let candidate = &server.candidate;
            let _ = writeln!(
                out,
                "server,{:.2},{:?},{},{},{},{},{},{},{},{},true,{}",
                candidate.confidence_score,
                server.transport_type,
                if candidate.pid > 0 {
                    candidate.pid.to_string()
                } else {
                    String::new()
                },
                escape(&candidate.command),
                escape(&candidate.url),
                escape(&candidate.config_file),
                escape(&candidate.config_key),
                escape(&server.server_name),
                escape(&server.server_version),
                escape(&server.protocol_version),
                candidate.evidence.len(),
            );
        }
    }

    out
}

/// Quotes a field when it contains a delimiter, quote, or newline.
fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
