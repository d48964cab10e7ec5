use anyhow::Context;

use super::SourceScan;
use crate::candidate::{Candidate, Transport};
use crate::evidence::Evidence;
use crate::platform::Platform;

/// Turns listening sockets into low-confidence HTTP-transport candidates.
///
/// A listener alone says very little; the baseline confidences (0.10 for
/// TCP, 0.05 for UDP) exist so that rulepacks and other sources can compound
/// on top. Localhost binding deliberately adds nothing.
pub struct NetworkSource;

impl NetworkSource {
    pub fn new() -> Self {
        Self
    }

    pub async fn detect(&self, platform: &dyn Platform) -> anyhow::Result<SourceScan> {
        let listeners = platform
            .listening_sockets()
            .await
            .context("list listening sockets")?;

        let mut scan = SourceScan {
            items_checked: listeners.len(),
            ..SourceScan::default()
        };

        for listener in listeners {
            let mut candidate = Candidate {
                pid: listener.pid,
                url: listener_url(&listener.address, listener.port),
                address: listener.address.clone(),
                port: listener.port,
                transport_hint: Transport::Http,
                ..Candidate::default()
            };

            if listener.pid > 0 {
                candidate.process_name = platform.process_name(listener.pid).await;
                candidate.command = platform.command_line(listener.pid).await;
            }

            // UDP is very unlikely to be MCP; the protocol runs over stdio
            // or HTTP/SSE, which is TCP.
            let confidence = if listener.protocol == "udp" { 0.05 } else { 0.10 };
            candidate.push_evidence(Evidence::new(
                "network_listener",
                format!(
                    "Process listening on {}:{} ({})",
                    listener.address, listener.port, listener.protocol
                ),
                confidence,
                "",
            ));

            scan.candidates.push(candidate);
        }

        Ok(scan)
    }
}

impl Default for NetworkSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a probe URL for a listener. Wildcard binds map to loopback, and
/// IPv6 hosts are bracketed.
fn listener_url(address: &str, port: u16) -> String {
    let host = if address == "0.0.0.0" || address == "::" {
        "127.0.0.1"
    } else {
        address
    };

    if host.contains(':') {
        format!("http://[{host}]:{port}")
    } else {
        format!("http://{host}:{port}")
    }
}
