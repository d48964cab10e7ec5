use std::time::Duration;

use serde_json::{Value, json};

use scout_jsonrpc::PipeProcess;

use crate::candidate::Candidate;

/// Stdio protocols the detector can discriminate between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolType {
    Mcp,
    Lsp,
    ChromiumIpc,
    GenericJsonRpc,
    Binary,
    Invalid,
    Unknown,
}

impl std::fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Mcp => "Model Context Protocol",
            Self::Lsp => "Language Server Protocol",
            Self::ChromiumIpc => "Chromium IPC",
            Self::GenericJsonRpc => "Generic JSON-RPC",
            Self::Binary => "Binary Protocol",
            Self::Invalid => "Invalid",
            Self::Unknown => "Unknown",
        };
        name.fmt(f)
    }
}

#[derive(Debug, Clone)]
pub struct ProtocolSignature {
    pub protocol: ProtocolType,
    pub confidence: f64,
    pub reason: String,
}

impl ProtocolSignature {
    fn new(protocol: ProtocolType, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            protocol,
            confidence,
            reason: reason.into(),
        }
    }

    fn unknown(reason: impl Into<String>) -> Self {
        Self::new(ProtocolType::Unknown, 0.0, reason)
    }
}

/// Chromium helper processes have distinctive process names and flags.
const CHROMIUM_PATTERNS: &[&str] = &[
    "Helper (GPU)",
    "Helper (Renderer)",
    "Helper (Plugin)",
    "Helper (Network Service)",
    "Helper (Utility)",
    "--type=gpu-process",
    "--type=renderer",
    "--type=utility",
    "--type=zygote",
    "--enable-crashpad",
    "--enable-crash-reporter",
];

const LSP_PATTERNS: &[&str] = &[
    "vscode-html-language-server",
    "vscode-json-language-server",
    "vscode-css-language-server",
    "typescript-language-server",
    "eslint-language-server",
    "language-server",
    "languageserver",
    "--stdio",
];

/// Discriminates MCP from lookalike stdio protocols, passively (process info
/// alone) and actively (spawned-process probing).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolDetector;

impl ProtocolDetector {
    pub fn new() -> Self {
        Self
    }

    fn is_chromium_ipc_process(&self, candidate: &Candidate) -> bool {
        CHROMIUM_PATTERNS.iter().any(|pattern| {
            candidate.process_name.contains(pattern) || candidate.command.contains(pattern)
        })
    }

    fn is_lsp_process(&self, candidate: &Candidate) -> bool {
        if LSP_PATTERNS.iter().any(|pattern| {
            candidate.process_name.contains(pattern) || candidate.command.contains(pattern)
        }) {
            return true;
        }

        // Editor-spawned node servers: --node-ipc next to extension paths.
        candidate.command.contains("--node-ipc")
            && (candidate.command.contains(".vscode/extensions")
                || candidate.command.contains("language-features"))
    }

    /// Passive classification from candidate fields alone; no I/O.
    pub fn detect_from_process_info(&self, candidate: &Candidate) -> ProtocolSignature {
        if self.is_chromium_ipc_process(candidate) {
            return ProtocolSignature::new(
                ProtocolType::ChromiumIpc,
                0.95,
                "Chromium helper process pattern detected in process name/command",
            );
        }
        if self.is_lsp_process(candidate) {
            return ProtocolSignature::new(
                ProtocolType::Lsp,
                0.90,
                "LSP server pattern detected in process name/command",
            );
        }
        ProtocolSignature::unknown("No distinctive protocol patterns found")
    }

    /// Active discrimination over a spawned process: MCP first (most
    /// specific), then LSP, then Chromium IPC; first confident result wins.
    pub async fn detect_from_stdio(
        &self,
        process: &mut PipeProcess,
        timeout: Duration,
    ) -> ProtocolSignature {
        if !process.is_running() {
            return ProtocolSignature::unknown("Process not running");
        }

        let mcp = self.probe_mcp(process, timeout).await;
        if mcp.protocol == ProtocolType::Mcp && mcp.confidence > 0.7 {
            return mcp;
        }

        let lsp = self.probe_lsp(process, timeout).await;
        if lsp.protocol == ProtocolType::Lsp && lsp.confidence > 0.8 {
            return lsp;
        }

        let chromium = self.probe_chromium(process, timeout).await;
        if chromium.confidence > 0.6 {
            return chromium;
        }

        for signature in [mcp, lsp, chromium] {
            if signature.confidence > 0.5 {
                return signature;
            }
        }
        ProtocolSignature::unknown("Could not determine protocol")
    }

    /// MCP uses newline-delimited JSON-RPC, no framing headers.
    async fn probe_mcp(&self, process: &mut PipeProcess, timeout: Duration) -> ProtocolSignature {
        let request = scout_jsonrpc::initialize_request(1);
        let mut line = match serde_json::to_string(&request) {
            Ok(line) => line,
            Err(err) => return ProtocolSignature::unknown(format!("serialize failed: {err}")),
        };
        line.push('\n');

        if let Err(err) = process.write_stdin(line.as_bytes()).await {
            return ProtocolSignature::unknown(format!("write failed: {err}"));
        }

        let response_line = match process.read_stdout_line(timeout).await {
            Ok(Some(line)) if !line.is_empty() => line,
            Ok(_) => return ProtocolSignature::unknown("No response"),
            Err(err) => return ProtocolSignature::unknown(format!("read failed: {err}")),
        };

        let response: Value = match serde_json::from_slice(&response_line) {
            Ok(response) => response,
            Err(_) => {
                return ProtocolSignature::new(
                    ProtocolType::Invalid,
                    0.0,
                    "Response is not valid JSON",
                );
            }
        };

        if response.get("jsonrpc").and_then(|v| v.as_str()) != Some("2.0") {
            return ProtocolSignature::new(
                ProtocolType::GenericJsonRpc,
                0.50,
                "Valid JSON but not JSON-RPC 2.0",
            );
        }

        if let Some(result) = response.get("result") {
            if result.get("protocolVersion").is_some() {
                return ProtocolSignature::new(
                    ProtocolType::Mcp,
                    0.99,
                    "Valid MCP initialize response with protocolVersion",
                );
            }
            if result.get("serverInfo").is_some() {
                return ProtocolSignature::new(
                    ProtocolType::Mcp,
                    0.95,
                    "Valid MCP initialize response with serverInfo",
                );
            }
            return ProtocolSignature::new(
                ProtocolType::GenericJsonRpc,
                0.60,
                "Valid JSON-RPC response but missing MCP-specific fields",
            );
        }

        if response.get("error").is_some() {
            return ProtocolSignature::new(
                ProtocolType::Mcp,
                0.75,
                "MCP error response (server exists but rejected initialize)",
            );
        }

        ProtocolSignature::new(
            ProtocolType::GenericJsonRpc,
            0.50,
            "Valid JSON-RPC 2.0 but cannot determine if MCP",
        )
    }

    /// LSP frames JSON-RPC with Content-Length headers.
    async fn probe_lsp(&self, process: &mut PipeProcess, timeout: Duration) -> ProtocolSignature {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "processId": std::process::id(),
                "rootUri": null,
                "capabilities": {},
            },
        });
        let body = match serde_json::to_string(&body) {
            Ok(body) => body,
            Err(err) => return ProtocolSignature::unknown(format!("serialize failed: {err}")),
        };
        let request = format!("Content-Length: {}\r\n\r\n{body}", body.len());

        if let Err(err) = process.write_stdin(request.as_bytes()).await {
            return ProtocolSignature::unknown(format!("write failed: {err}"));
        }

        match process.read_stdout_line(timeout).await {
            Ok(Some(line)) if line.starts_with(b"Content-Length:") => ProtocolSignature::new(
                ProtocolType::Lsp,
                0.95,
                "Content-Length header detected in response",
            ),
            Ok(_) => ProtocolSignature::unknown("No LSP framing in response"),
            Err(err) => ProtocolSignature::unknown(format!("read failed: {err}")),
        }
    }

    /// Chromium IPC is a binary protocol that ignores text probes.
    async fn probe_chromium(
        &self,
        process: &mut PipeProcess,
        timeout: Duration,
    ) -> ProtocolSignature {
        match process.read_stdout_line(timeout).await {
            Ok(Some(line)) if line.is_empty() => ProtocolSignature::new(
                ProtocolType::ChromiumIpc,
                0.80,
                "No text response on stdio (binary protocol)",
            ),
            Ok(None) => ProtocolSignature::new(
                ProtocolType::ChromiumIpc,
                0.80,
                "No text response on stdio (binary protocol)",
            ),
            Ok(Some(line)) => {
                let has_binary = line
                    .iter()
                    .any(|b| *b == 0 || (*b < 32 && !matches!(b, b'\n' | b'\r' | b'\t')));
                if has_binary {
                    ProtocolSignature::new(
                        ProtocolType::Binary,
                        0.85,
                        "Binary data detected on stdio",
                    )
                } else {
                    ProtocolSignature::unknown("Readable text on stdio")
                }
            }
            Err(_) => ProtocolSignature::new(
                ProtocolType::ChromiumIpc,
                0.60,
                "No response on stdio probe",
            ),
        }
    }
}
