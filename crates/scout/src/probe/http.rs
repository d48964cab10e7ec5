use std::io;
use std::time::Duration;

use anyhow::Context;
use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::io::StreamReader;
use tracing::debug;

use scout_jsonrpc::{initialize_request, is_jsonrpc_response, read_sse_endpoint};

use crate::candidate::{Candidate, Transport};
use crate::server::McpServer;

/// Keywords that mark a 401/403 body as an MCP-aware auth challenge on the
/// SSE endpoint.
const SSE_AUTH_KEYWORDS: &[&str] = &["authentication", "unauthorized", "session", "token", "mcp"];

/// Same idea for direct POST probes.
const POST_AUTH_KEYWORDS: &[&str] = &["authentication", "unauthorized", "session", "mcp"];

/// Paths tried for the direct-POST fallback, in order.
const DIRECT_POST_PATHS: &[&str] = &["", "/messages", "/rpc"];

const MAX_SSE_LINE_BYTES: usize = 64 * 1024;
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Confirms HTTP/SSE-transport candidates: SSE endpoint discovery first,
/// then direct POSTs to well-known paths.
///
/// Unreachable endpoints and non-MCP responses are ordinary negative
/// outcomes here, not probe failures; every sub-path degrades to "try the
/// next one".
pub struct HttpProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            // Probing loopback services; proxies and redirects only distort
            // what we are looking at.
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self { client, timeout })
    }

    pub fn name(&self) -> &'static str {
        "http"
    }

    pub async fn test(&self, candidate: &Candidate) -> anyhow::Result<Option<McpServer>> {
        if candidate.url.is_empty() {
            return Ok(None);
        }
        if !matches!(
            candidate.transport_hint,
            Transport::Http | Transport::Unknown
        ) {
            return Ok(None);
        }

        if let Some(server) = self.try_sse_transport(candidate).await {
            return Ok(Some(server));
        }

        for path in DIRECT_POST_PATHS {
            let url = format!("{}{path}", candidate.url);
            if let Some(server) = self.post_initialize(candidate, &url).await {
                return Ok(Some(server));
            }
        }

        Ok(None)
    }

    async fn try_sse_transport(&self, candidate: &Candidate) -> Option<McpServer> {
        let sse_url = format!("{}/sse", candidate.url);

        let request = self
            .client
            .get(&sse_url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send();
        let response = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                debug!("GET {sse_url} failed: {err}");
                return None;
            }
            Err(_) => {
                debug!("GET {sse_url} timed out");
                return None;
            }
        };

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            // An auth-protected SSE endpoint that talks about sessions or
            // MCP is itself a positive indicator.
            let body = self.read_body_capped(response).await?;
            if contains_any_keyword(&body, SSE_AUTH_KEYWORDS) {
                let mut server = McpServer::confirmed(candidate.clone(), Transport::Http);
                server.candidate.url = sse_url;
                return Some(server);
            }
            return None;
        }
        if status != 200 {
            return None;
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !content_type
            .to_ascii_lowercase()
            .starts_with("text/event-stream")
        {
            return None;
        }

        // The SSE body never ends on its own; read it as a stream until the
        // endpoint event arrives or the probe deadline passes.
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other));
        let mut reader = tokio::io::BufReader::new(StreamReader::new(stream));
        let endpoint =
            tokio::time::timeout(self.timeout, read_sse_endpoint(&mut reader, MAX_SSE_LINE_BYTES))
                .await;
        let endpoint_path = match endpoint {
            Ok(Ok(Some(path))) if !path.is_empty() => path,
            _ => {
                debug!("no endpoint event from {sse_url}");
                return None;
            }
        };

        let messages_url = format!("{}{endpoint_path}", candidate.url);
        self.post_initialize(candidate, &messages_url).await
    }

    async fn post_initialize(&self, candidate: &Candidate, url: &str) -> Option<McpServer> {
        let body = serde_json::to_string(&initialize_request(1)).ok()?;

        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send();
        let response = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                debug!("POST {url} failed: {err}");
                return None;
            }
            Err(_) => {
                debug!("POST {url} timed out");
                return None;
            }
        };

        let status = response.status().as_u16();
        let is_auth_challenge = status == 401 || status == 403;
        if status != 200 && !is_auth_challenge {
            return None;
        }

        let body = self.read_body_capped(response).await?;

        match serde_json::from_str::<Value>(&body) {
            Ok(response) if is_jsonrpc_response(&response) => {
                let mut server = McpServer::confirmed(candidate.clone(), Transport::Http);
                server.candidate.url = url.to_string();
                server.apply_initialize_result(&response);
                Some(server)
            }
            Ok(_) => None,
            Err(_) if is_auth_challenge && contains_any_keyword(&body, POST_AUTH_KEYWORDS) => {
                // Auth challenge with MCP keywords confirms a server is
                // there, with no info to extract.
                let mut server = McpServer::confirmed(candidate.clone(), Transport::Http);
                server.candidate.url = url.to_string();
                Some(server)
            }
            Err(_) => None,
        }
    }

    async fn read_body_capped(&self, response: reqwest::Response) -> Option<String> {
        let read = async {
            let mut out = Vec::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.ok()?;
                let take = chunk.len().min(MAX_BODY_BYTES - out.len());
                out.extend_from_slice(&chunk[..take]);
                if out.len() >= MAX_BODY_BYTES {
                    break;
                }
            }
            Some(out)
        };
        let bytes = tokio::time::timeout(self.timeout, read).await.ok()??;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn contains_any_keyword(body: &str, keywords: &[&str]) -> bool {
    let body = body.to_lowercase();
    keywords.iter().any(|keyword| body.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_matching_is_case_insensitive() {
        assert!(contains_any_keyword(
            "Authentication required (MCP session)",
            SSE_AUTH_KEYWORDS
        ));
        assert!(contains_any_keyword("401 UNAUTHORIZED", POST_AUTH_KEYWORDS));
        assert!(!contains_any_keyword("not found", POST_AUTH_KEYWORDS));
    }

    #[tokio::test]
    async fn urlless_candidate_is_not_probed() {
        let probe = HttpProbe::new(Duration::from_millis(100)).unwrap();
        let candidate = Candidate {
            command: "node x.js".to_string(),
            ..Candidate::default()
        };
        assert!(probe.test(&candidate).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stdio_hinted_candidate_is_not_probed() {
        let probe = HttpProbe::new(Duration::from_millis(100)).unwrap();
        let candidate = Candidate {
            url: "http://127.0.0.1:9".to_string(),
            transport_hint: Transport::Stdio,
            ..Candidate::default()
        };
        assert!(probe.test(&candidate).await.unwrap().is_none());
    }
}
