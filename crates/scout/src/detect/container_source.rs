use std::collections::BTreeSet;

use anyhow::Context;

use super::SourceScan;
use crate::candidate::{Candidate, Transport};
use crate::evidence::Evidence;
use crate::platform::{DockerContainer, Platform};

/// Entrypoint patterns that suggest a containerized MCP server.
const MCP_ENTRYPOINT_PATTERNS: &[&str] = &[
    "@modelcontextprotocol/",
    "mcp-server-",
    "/app/mcp",
    "mcp_server",
    "/mcp/",
];

/// Inspects containers for MCP markers.
///
/// The source is neutral: every evidence it emits sits at baseline 0.5 and
/// is meant to be lifted by a rulepack. Policy about which marker is worth
/// how much does not belong here.
pub struct ContainerSource;

impl ContainerSource {
    pub fn new() -> Self {
        Self
    }

    pub async fn detect(&self, platform: &dyn Platform) -> anyhow::Result<SourceScan> {
        let known_mcp_servers: BTreeSet<String> = platform
            .docker_mcp_server_ids()
            .await
            .unwrap_or_default()
            .into_iter()
            .collect();

        let containers = platform
            .docker_list_containers()
            .await
            .context("list containers")?;

        let mut scan = SourceScan {
            items_checked: containers.len(),
            ..SourceScan::default()
        };

        for container in containers {
            let mut candidate = Candidate {
                process_name: container.image.clone(),
                command: container.command.clone(),
                ..Candidate::default()
            };

            if known_mcp_servers.contains(&container.id)
                || known_mcp_servers.contains(&container.name)
            {
                candidate.push_evidence(Evidence::new(
                    "docker_mcp_server_list",
                    "Container in docker mcp server list",
                    0.5,
                    "docker-mcp-cli",
                ));
            }

            check_mcp_gateway(&container, &mut candidate);
            check_mcp_labels(&container, &mut candidate);
            check_mcp_entrypoint(&container, &mut candidate);
            check_mcp_environment(&container, &mut candidate);

            if !candidate.evidence.is_empty() {
                candidate.docker_container = Some(container);
                scan.candidates.push(candidate);
            }
        }

        Ok(scan)
    }
}

impl Default for ContainerSource {
    fn default() -> Self {
        Self::new()
    }
}

fn container_source_tag(container: &DockerContainer) -> String {
    format!("container:{}", container.id)
}

fn check_mcp_gateway(container: &DockerContainer, candidate: &mut Candidate) {
    for (key, value) in &container.labels {
        if key.starts_with("com.docker.mcp") {
            candidate.push_evidence(Evidence::new(
                "container_mcp_gateway",
                format!("Docker MCP Gateway label: {key}={value}"),
                0.5,
                container_source_tag(container),
            ));
            break;
        }
    }
}

fn check_mcp_labels(container: &DockerContainer, candidate: &mut Candidate) {
    for (key, value) in &container.labels {
        let key_lower = key.to_lowercase();
        let value_lower = value.to_lowercase();

        let truthy = matches!(value_lower.as_str(), "true" | "1" | "yes");
        if matches!(key_lower.as_str(), "mcp" | "mcp-server" | "mcp.enabled") && truthy {
            candidate.push_evidence(Evidence::new(
                "container_label_mcp_bool",
                format!("Explicit MCP label: {key}={value}"),
                0.5,
                container_source_tag(container),
            ));
        }

        if matches!(key_lower.as_str(), "mcp.type" | "mcp.role") && value_lower == "server" {
            candidate.push_evidence(Evidence::new(
                "container_label_mcp_type",
                format!("MCP type label: {key}={value}"),
                0.5,
                container_source_tag(container),
            ));
        }

        if key_lower == "mcp.transport" {
            if let Some(transport) = transport_from_label(&value_lower) {
                candidate.push_evidence(Evidence::new(
                    "container_label_mcp_transport",
                    format!("MCP transport label: {key}={value}"),
                    0.5,
                    container_source_tag(container),
                ));
                candidate.transport_hint = transport;
            }
        }
    }
}

fn check_mcp_entrypoint(container: &DockerContainer, candidate: &mut Candidate) {
    let entrypoint_lower = container.entrypoint_path.to_lowercase();
    for pattern in MCP_ENTRYPOINT_PATTERNS {
        if entrypoint_lower.contains(pattern) {
            candidate.push_evidence(Evidence::new(
                "container_entrypoint_mcp",
                format!("Known MCP server in entrypoint: {}", container.entrypoint_path),
                0.5,
                container_source_tag(container),
            ));
            return;
        }
    }

    for arg in &container.entrypoint_args {
        let arg_lower = arg.to_lowercase();
        for pattern in MCP_ENTRYPOINT_PATTERNS {
            if arg_lower.contains(pattern) {
                candidate.push_evidence(Evidence::new(
                    "container_entrypoint_mcp",
                    format!("Known MCP server in arguments: {arg}"),
                    0.5,
                    container_source_tag(container),
                ));
                return;
            }
        }
    }
}

fn check_mcp_environment(container: &DockerContainer, candidate: &mut Candidate) {
    for (key, value) in &container.env {
        let value_lower = value.to_lowercase();

        if matches!(key.as_str(), "MCP_ENABLED" | "MCP_SERVER")
            && matches!(value_lower.as_str(), "true" | "1" | "yes")
        {
            candidate.push_evidence(Evidence::new(
                "container_env_mcp_bool",
                format!("Explicit MCP environment: {key}={value}"),
                0.5,
                container_source_tag(container),
            ));
        }

        if matches!(key.as_str(), "MCP_TRANSPORT" | "MCP_PORT" | "MCP_SERVER_NAME") {
            candidate.push_evidence(Evidence::new(
                "container_env_mcp_config",
                format!("MCP config environment: {key}={value}"),
                0.5,
                container_source_tag(container),
            ));

            if key == "MCP_TRANSPORT" {
                if let Some(transport) = transport_from_label(&value_lower) {
                    candidate.transport_hint = transport;
                }
            }
        }
    }
}

fn transport_from_label(value: &str) -> Option<Transport> {
    match value {
        "http" => Some(Transport::Http),
        "stdio" => Some(Transport::Stdio),
        "sse" => Some(Transport::Sse),
        _ => None,
    }
}
