use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tracing::debug;

use scout_jsonrpc::{PipeProcess, initialize_request, is_jsonrpc_response};

use super::protocol::{ProtocolDetector, ProtocolType};
use crate::candidate::{Candidate, Transport};
use crate::server::McpServer;

/// Splits a joined command line into program + args on whitespace.
///
/// Candidate commands come from config files (where we joined `command` and
/// `args` with single spaces) or from process command lines; no shell
/// quoting is involved.
pub fn split_command(command: &str) -> Option<(String, Vec<String>)> {
    let mut parts = command.split_whitespace();
    let program = parts.next()?.to_string();
    let args = parts.map(str::to_string).collect();
    Some((program, args))
}

/// Confirms stdio-transport candidates by spawning them and speaking the
/// MCP `initialize` handshake.
pub struct StdioProbe {
    timeout: Duration,
    detector: ProtocolDetector,
}

impl StdioProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            detector: ProtocolDetector::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        "stdio"
    }

    /// `Ok(None)` means "not an MCP server" (or not eligible); `Err` means
    /// the probe itself failed (spawn error, broken pipe, timeout).
    pub async fn test(&self, candidate: &Candidate) -> anyhow::Result<Option<McpServer>> {
        if candidate.command.is_empty() {
            return Ok(None);
        }
        if !matches!(
            candidate.transport_hint,
            Transport::Stdio | Transport::Unknown
        ) {
            return Ok(None);
        }

        // Refuse to spawn processes the passive sniff already classified as
        // a different stdio protocol.
        let signature = self.detector.detect_from_process_info(candidate);
        if matches!(
            signature.protocol,
            ProtocolType::ChromiumIpc | ProtocolType::Lsp
        ) {
            debug!(
                protocol = %signature.protocol,
                command = %candidate.command,
                "skipping active test: passive sniff classified non-MCP"
            );
            return Ok(None);
        }

        let Some((program, args)) = split_command(&candidate.command) else {
            return Ok(None);
        };
        let mut process = PipeProcess::spawn(&program, &args)
            .await
            .with_context(|| format!("spawn {program}"))?;

        let outcome = self.handshake(&mut process, candidate).await;
        process.terminate().await;
        outcome
    }

    async fn handshake(
        &self,
        process: &mut PipeProcess,
        candidate: &Candidate,
    ) -> anyhow::Result<Option<McpServer>> {
        let mut line = serde_json::to_string(&initialize_request(1))?;
        line.push('\n');
        process
            .write_stdin(line.as_bytes())
            .await
            .context("write initialize request")?;

        let response_line = process
            .read_stdout_line(self.timeout)
            .await
            .context("read initialize response")?;
        let Some(response_line) = response_line else {
            // Exited without answering; not a server.
            return Ok(None);
        };

        let Ok(response) = serde_json::from_slice::<Value>(&response_line) else {
            return Ok(None);
        };
        if !is_jsonrpc_response(&response) {
            return Ok(None);
        }

        let mut server = McpServer::confirmed(candidate.clone(), Transport::Stdio);
        server.apply_initialize_result(&response);
        Ok(Some(server))
    }
}
