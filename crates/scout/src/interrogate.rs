//! Post-confirmation capability enumeration: `tools/list`,
//! `resources/list`, `resources/templates/list`, `prompts/list`.
//!
//! The interrogator is written against [`RequestTransport`] so the same
//! logic serves both transports. Each kind's failure is isolated: it
//! becomes a string in `interrogation_errors` and the other kinds still
//! run. A kind is only requested when the server advertised the matching
//! capability during `initialize`.

use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Value, json};

use scout_jsonrpc::{PipeProcess, request};

use crate::candidate::Transport;
use crate::config::InterrogationConfig;
use crate::probe::split_command;
use crate::server::{
    McpServer, PromptArgument, PromptDefinition, ResourceDefinition, ResourceTemplate,
    ToolDefinition,
};

/// One JSON-RPC request/response exchange against a live server.
#[async_trait]
pub trait RequestTransport: Send {
    async fn send(&mut self, request: Value) -> anyhow::Result<Value>;
}

/// Exchanges requests over a spawned child's pipes.
pub struct StdioTransport {
    pub process: PipeProcess,
    pub timeout: Duration,
}

#[async_trait]
impl RequestTransport for StdioTransport {
    async fn send(&mut self, request: Value) -> anyhow::Result<Value> {
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        self.process
            .write_stdin(line.as_bytes())
            .await
            .context("write request")?;

        let response = self
            .process
            .read_stdout_line(self.timeout)
            .await
            .context("read response")?;
        let Some(response) = response else {
            anyhow::bail!("server closed stdout");
        };
        serde_json::from_slice(&response).context("parse response")
    }
}

/// Exchanges requests as HTTP POSTs against the confirmed endpoint.
pub struct HttpTransport {
    pub client: reqwest::Client,
    pub url: String,
    pub timeout: Duration,
}

#[async_trait]
impl RequestTransport for HttpTransport {
    async fn send(&mut self, request: Value) -> anyhow::Result<Value> {
        let body = serde_json::to_string(&request)?;
        let send = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send();

        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| anyhow::anyhow!("request timed out after {:?}", self.timeout))?
            .with_context(|| format!("POST {}", self.url))?;

        if response.status().as_u16() != 200 {
            anyhow::bail!("HTTP request failed with status {}", response.status());
        }

        let body = tokio::time::timeout(self.timeout, response.text())
            .await
            .map_err(|_| anyhow::anyhow!("response read timed out after {:?}", self.timeout))?
            .context("read response body")?;
        serde_json::from_str(&body).context("parse response")
    }
}

pub struct Interrogator {
    config: InterrogationConfig,
    http_client: reqwest::Client,
}

impl Interrogator {
    pub fn new(config: InterrogationConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    /// Interrogates a confirmed server in place.
    ///
    /// Stdio servers get a fresh child for the whole interrogation (the
    /// handshake child is already gone), terminated on every path out.
    pub async fn interrogate(&self, server: &mut McpServer) {
        server.interrogation_attempted = true;
        if !self.config.enabled {
            return;
        }

        let started = Instant::now();

        match server.transport_type {
            Transport::Stdio => {
                if server.candidate.command.is_empty() {
                    server
                        .interrogation_errors
                        .push("Cannot interrogate stdio server: missing command".to_string());
                } else {
                    self.interrogate_stdio(server).await;
                }
            }
            Transport::Http | Transport::Sse => {
                if server.candidate.url.is_empty() {
                    server
                        .interrogation_errors
                        .push("Cannot interrogate HTTP server: missing URL".to_string());
                } else {
                    let mut transport = HttpTransport {
                        client: self.http_client.clone(),
                        url: server.candidate.url.clone(),
                        timeout: self.config.timeout,
                    };
                    self.run(server, &mut transport).await;
                }
            }
            Transport::Unknown => {
                server
                    .interrogation_errors
                    .push("Unknown transport type".to_string());
            }
        }

        server.interrogation_time_seconds = started.elapsed().as_secs_f64();
        server.interrogation_successful = server.interrogation_errors.is_empty();
    }

    async fn interrogate_stdio(&self, server: &mut McpServer) {
        let Some((program, args)) = split_command(&server.candidate.command) else {
            server
                .interrogation_errors
                .push("Cannot interrogate stdio server: missing command".to_string());
            return;
        };

        match PipeProcess::spawn(&program, &args).await {
            Ok(process) => {
                let mut transport = StdioTransport {
                    process,
                    timeout: self.config.timeout,
                };
                self.run(server, &mut transport).await;
                transport.process.terminate().await;
            }
            Err(err) => {
                server
                    .interrogation_errors
                    .push(format!("Failed to spawn process for interrogation: {err}"));
            }
        }
    }

    async fn run(&self, server: &mut McpServer, transport: &mut dyn RequestTransport) {
        if self.config.get_tools && server.has_tools() {
            if let Err(err) = self.fetch_tools(server, transport).await {
                server
                    .interrogation_errors
                    .push(format!("Tools interrogation failed: {err:#}"));
            }
        }

        if self.config.get_resources && server.has_resources() {
            if let Err(err) = self.fetch_resources(server, transport).await {
                server
                    .interrogation_errors
                    .push(format!("Resources interrogation failed: {err:#}"));
            }
        }

        if self.config.get_resource_templates && server.has_resources() {
            if let Err(err) = self.fetch_resource_templates(server, transport).await {
                server
                    .interrogation_errors
                    .push(format!("Resource templates interrogation failed: {err:#}"));
            }
        }

        if self.config.get_prompts && server.has_prompts() {
            if let Err(err) = self.fetch_prompts(server, transport).await {
                server
                    .interrogation_errors
                    .push(format!("Prompts interrogation failed: {err:#}"));
            }
        }
    }

    async fn fetch_tools(
        &self,
        server: &mut McpServer,
        transport: &mut dyn RequestTransport,
    ) -> anyhow::Result<()> {
        let response = transport.send(request(1, "tools/list", json!({}))).await?;
        parse_tools(&response, self.config.max_tools, &mut server.tools);
        Ok(())
    }

    async fn fetch_resources(
        &self,
        server: &mut McpServer,
        transport: &mut dyn RequestTransport,
    ) -> anyhow::Result<()> {
        let response = transport
            .send(request(2, "resources/list", json!({})))
            .await?;
        parse_resources(&response, self.config.max_resources, &mut server.resources);
        Ok(())
    }

    async fn fetch_resource_templates(
        &self,
        server: &mut McpServer,
        transport: &mut dyn RequestTransport,
    ) -> anyhow::Result<()> {
        let response = transport
            .send(request(3, "resources/templates/list", json!({})))
            .await?;
        parse_resource_templates(
            &response,
            self.config.max_resources,
            &mut server.resource_templates,
        );
        Ok(())
    }

    async fn fetch_prompts(
        &self,
        server: &mut McpServer,
        transport: &mut dyn RequestTransport,
    ) -> anyhow::Result<()> {
        let response = transport.send(request(4, "prompts/list", json!({}))).await?;
        parse_prompts(&response, self.config.max_prompts, &mut server.prompts);
        Ok(())
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn parse_tools(response: &Value, max: usize, out: &mut Vec<ToolDefinition>) {
    let Some(tools) = response
        .get("result")
        .and_then(|r| r.get("tools"))
        .and_then(|t| t.as_array())
    else {
        return;
    };

    for tool_json in tools.iter().take(max) {
        let mut tool = ToolDefinition {
            name: str_field(tool_json, "name"),
            description: str_field(tool_json, "description"),
            input_schema: Value::Null,
            required_parameters: Vec::new(),
            optional_parameters: Vec::new(),
        };

        if let Some(schema) = tool_json.get("inputSchema").filter(|s| s.is_object()) {
            tool.input_schema = schema.clone();

            if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
                tool.required_parameters = required
                    .iter()
                    .filter_map(|r| r.as_str().map(str::to_string))
                    .collect();
            }

            // Insertion order of `properties` is preserved; anything not
            // required is optional.
            if let Some(Value::Object(properties)) = schema.get("properties") {
                for name in properties.keys() {
                    if !tool.required_parameters.contains(name) {
                        tool.optional_parameters.push(name.clone());
                    }
                }
            }
        }

        out.push(tool);
    }
}

fn parse_resources(response: &Value, max: usize, out: &mut Vec<ResourceDefinition>) {
    let Some(resources) = response
        .get("result")
        .and_then(|r| r.get("resources"))
        .and_then(|r| r.as_array())
    else {
        return;
    };

    for resource_json in resources.iter().take(max) {
        out.push(ResourceDefinition {
            uri: str_field(resource_json, "uri"),
            name: str_field(resource_json, "name"),
            description: str_field(resource_json, "description"),
            mime_type: str_field(resource_json, "mimeType"),
        });
    }
}

fn parse_resource_templates(response: &Value, max: usize, out: &mut Vec<ResourceTemplate>) {
    let Some(templates) = response
        .get("result")
        .and_then(|r| r.get("resourceTemplates"))
        .and_then(|t| t.as_array())
    else {
        return;
    };

    for template_json in templates.iter().take(max) {
        let uri_template = str_field(template_json, "uriTemplate");
        out.push(ResourceTemplate {
            parameters: template_parameters(&uri_template),
            uri_template,
            name: str_field(template_json, "name"),
            description: str_field(template_json, "description"),
            mime_type: str_field(template_json, "mimeType"),
        });
    }
}

/// Extracts `{param}` names from a URI template, left to right.
fn template_parameters(uri_template: &str) -> Vec<String> {
    let mut parameters = Vec::new();
    let mut rest = uri_template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        parameters.push(rest[open + 1..open + close].to_string());
        rest = &rest[open + close + 1..];
    }
    parameters
}

fn parse_prompts(response: &Value, max: usize, out: &mut Vec<PromptDefinition>) {
    let Some(prompts) = response
        .get("result")
        .and_then(|r| r.get("prompts"))
        .and_then(|p| p.as_array())
    else {
        return;
    };

    for prompt_json in prompts.iter().take(max) {
        let mut prompt = PromptDefinition {
            name: str_field(prompt_json, "name"),
            description: str_field(prompt_json, "description"),
            arguments: Vec::new(),
        };

        if let Some(arguments) = prompt_json.get("arguments").and_then(|a| a.as_array()) {
            for arg_json in arguments {
                prompt.arguments.push(PromptArgument {
                    name: str_field(arg_json, "name"),
                    description: str_field(arg_json, "description"),
                    required: arg_json
                        .get("required")
                        .and_then(|r| r.as_bool())
                        .unwrap_or(false),
                });
            }
        }

        out.push(prompt);
    }
}
