use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::candidate::{Candidate, Transport};

/// Tool definition from `tools/list`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub required_parameters: Vec<String>,
    pub optional_parameters: Vec<String>,
}

/// Resource definition from `resources/list`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceDefinition {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

/// Resource template from `resources/templates/list`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceTemplate {
    pub uri_template: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
    /// `{param}` segments extracted from the template, left to right.
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// Prompt definition from `prompts/list`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptDefinition {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
}

/// A confirmed MCP server: a candidate that answered the handshake (or an
/// auth challenge that proves one is there), plus interrogation results.
#[derive(Debug, Clone, Serialize)]
pub struct McpServer {
    pub candidate: Candidate,

    pub server_name: String,
    pub server_version: String,
    pub protocol_version: String,
    pub capabilities: Value,
    pub transport_type: Transport,

    pub tools: Vec<ToolDefinition>,
    pub resources: Vec<ResourceDefinition>,
    pub resource_templates: Vec<ResourceTemplate>,
    pub prompts: Vec<PromptDefinition>,

    pub interrogation_attempted: bool,
    pub interrogation_successful: bool,
    pub interrogation_errors: Vec<String>,
    pub interrogation_time_seconds: f64,

    pub discovered_at: DateTime<Utc>,
}

impl McpServer {
    pub fn confirmed(candidate: Candidate, transport_type: Transport) -> Self {
        Self {
            candidate,
            server_name: String::new(),
            server_version: String::new(),
            protocol_version: String::new(),
            capabilities: Value::Null,
            transport_type,
            tools: Vec::new(),
            resources: Vec::new(),
            resource_templates: Vec::new(),
            prompts: Vec::new(),
            interrogation_attempted: false,
            interrogation_successful: false,
            interrogation_errors: Vec::new(),
            interrogation_time_seconds: 0.0,
            discovered_at: Utc::now(),
        }
    }

    /// Extracts `protocolVersion`, `serverInfo.{name,version}`, and
    /// `capabilities` from an `initialize` response. Error responses carry no
    /// `result` and leave everything empty.
    pub fn apply_initialize_result(&mut self, response: &Value) {
        let Some(result) = response.get("result") else {
            return;
        };

        if let Some(version) = result.get("protocolVersion").and_then(|v| v.as_str()) {
            self.protocol_version = version.to_string();
        }

        if let Some(info) = result.get("serverInfo").filter(|v| v.is_object()) {
            if let Some(name) = info.get("name").and_then(|v| v.as_str()) {
                self.server_name = name.to_string();
            }
            if let Some(version) = info.get("version").and_then(|v| v.as_str()) {
                self.server_version = version.to_string();
            }
        }

        if let Some(capabilities) = result.get("capabilities").filter(|v| v.is_object()) {
            self.capabilities = capabilities.clone();
        }
    }

    pub fn has_tools(&self) -> bool {
        matches!(self.capabilities.get("tools"), Some(v) if !v.is_null())
    }

    pub fn has_resources(&self) -> bool {
        matches!(self.capabilities.get("resources"), Some(v) if !v.is_null())
    }

    pub fn has_prompts(&self) -> bool {
        matches!(self.capabilities.get("prompts"), Some(v) if !v.is_null())
    }

    pub fn endpoint(&self) -> String {
        if !self.candidate.url.is_empty() {
            self.candidate.url.clone()
        } else if self.candidate.pid > 0 {
            format!("pid:{}", self.candidate.pid)
        } else if !self.candidate.command.is_empty() {
            self.candidate.command.clone()
        } else {
            "unknown".to_string()
        }
    }
}
