use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use super::SourceScan;
use crate::candidate::{Candidate, Transport};
use crate::evidence::Evidence;
use crate::platform::Platform;

/// Config files scanned by default, before expansion.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    // Claude Desktop config (primary target).
    "~/Library/Application Support/Claude/claude_desktop_config.json",
    "~/.config/Claude/claude_desktop_config.json",
    // Common MCP server configuration locations.
    "~/.config/mcp/servers.json",
    "~/.mcp/config.json",
    "/etc/mcp/servers.json",
    "./mcp.json",
    "./servers.json",
    // VSCode MCP extension locations.
    "~/.vscode/mcp.json",
    "~/.config/Code/User/mcp.json",
    // Project-specific locations.
    "./config/mcp.json",
    "./config/servers.json",
];

/// Claude Desktop extension directories, per platform.
const EXTENSION_BASE_PATHS: &[&str] = &[
    "~/Library/Application Support/Claude/Claude Extensions",
    "~/.config/Claude/Claude Extensions",
];

const EXTENSION_ENTRY_POINTS: &[&str] = &["dist/index.js", "index.js", "build/index.js"];

/// A server entry parsed out of a config file.
#[derive(Debug, Clone, Default, PartialEq)]
struct DeclaredServer {
    name: String,
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    url: String,
}

/// Discovers servers explicitly declared in known config files and installed
/// Claude Desktop extensions.
pub struct ConfigSource {
    config_paths: Vec<String>,
}

impl ConfigSource {
    pub fn new(additional_paths: &[String]) -> Self {
        let mut config_paths: Vec<String> =
            DEFAULT_CONFIG_PATHS.iter().map(|p| p.to_string()).collect();
        config_paths.extend(additional_paths.iter().cloned());
        Self { config_paths }
    }

    pub async fn detect(&self, platform: &dyn Platform) -> anyhow::Result<SourceScan> {
        let mut scan = SourceScan::default();

        for path in &self.config_paths {
            let expanded = platform.expand_path(path);
            if !platform.file_exists(Path::new(&expanded)).await {
                continue;
            }
            scan.items_checked += 1;

            let json = match platform.read_json_file(Path::new(&expanded)).await {
                Ok(json) => json,
                Err(err) => {
                    warn!("error processing config file {expanded}: {err:#}");
                    continue;
                }
            };

            for declared in parse_declared_servers(&json) {
                scan.candidates
                    .push(candidate_from_declared(declared, &expanded));
            }
        }

        self.scan_claude_extensions(platform, &mut scan).await;

        Ok(scan)
    }

    async fn scan_claude_extensions(&self, platform: &dyn Platform, scan: &mut SourceScan) {
        for base_path in EXTENSION_BASE_PATHS {
            let expanded_base = platform.expand_path(base_path);
            if !platform.file_exists(Path::new(&expanded_base)).await {
                continue;
            }

            let extension_names = match platform.list_directory(Path::new(&expanded_base)).await {
                Ok(names) => names,
                Err(err) => {
                    debug!("cannot list extensions directory {expanded_base}: {err:#}");
                    continue;
                }
            };

            for extension_name in extension_names {
                let extension_path = format!("{expanded_base}/{extension_name}");
                if !platform.file_exists(Path::new(&extension_path)).await {
                    continue;
                }

                let mut entry_point = None;
                for leaf in EXTENSION_ENTRY_POINTS {
                    let path = format!("{extension_path}/{leaf}");
                    if platform.file_exists(Path::new(&path)).await {
                        entry_point = Some(path);
                        break;
                    }
                }
                let Some(entry_point) = entry_point else {
                    warn!("Claude extension {extension_name} found but no entry point detected");
                    continue;
                };

                let mut candidate = Candidate {
                    config_file: extension_path.clone(),
                    config_key: extension_name,
                    command: format!("node {entry_point}"),
                    transport_hint: Transport::Stdio,
                    ..Candidate::default()
                };
                candidate.push_evidence(Evidence::new(
                    "claude_extension_installed",
                    format!("Installed as Claude Desktop extension: {extension_path}"),
                    0.95,
                    &extension_path,
                ));
                scan.candidates.push(candidate);
                scan.items_checked += 1;
            }
        }
    }
}

/// Parses both supported shapes: the `mcpServers` object form (key = server
/// name) and the `servers` array form (objects with a `name`). Servers
/// without a `command` are skipped.
fn parse_declared_servers(json: &Value) -> Vec<DeclaredServer> {
    let mut declared = Vec::new();

    if let Some(Value::Object(servers)) = json.get("mcpServers") {
        for (name, server) in servers {
            if let Some(mut entry) = parse_server_entry(server) {
                entry.name = name.clone();
                declared.push(entry);
            }
        }
    }

    if let Some(Value::Array(servers)) = json.get("servers") {
        for server in servers {
            if let Some(mut entry) = parse_server_entry(server) {
                if let Some(name) = server.get("name").and_then(|v| v.as_str()) {
                    entry.name = name.to_string();
                }
                declared.push(entry);
            }
        }
    }

    declared
}

fn parse_server_entry(server: &Value) -> Option<DeclaredServer> {
    let command = server.get("command")?.as_str()?.to_string();

    let args = server
        .get("args")
        .and_then(|v| v.as_array())
        .map(|args| {
            args.iter()
                .filter_map(|arg| arg.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let mut env = BTreeMap::new();
    if let Some(Value::Object(vars)) = server.get("env") {
        for (key, value) in vars {
            if let Some(value) = value.as_str() {
                env.insert(key.clone(), value.to_string());
            }
        }
    }

    let url = server
        .get("url")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Some(DeclaredServer {
        name: String::new(),
        command,
        args,
        env,
        url,
    })
}

fn candidate_from_declared(declared: DeclaredServer, config_path: &str) -> Candidate {
    let mut command = declared.command;
    for arg in &declared.args {
        command.push(' ');
        command.push_str(arg);
    }

    let transport_hint = if declared.url.is_empty() {
        Transport::Stdio
    } else {
        Transport::Http
    };

    let mut candidate = Candidate {
        config_file: config_path.to_string(),
        config_key: declared.name,
        command,
        environment: declared.env,
        url: declared.url,
        transport_hint,
        ..Candidate::default()
    };
    candidate.push_evidence(Evidence::new(
        "config_declared",
        format!("Declared in config file: {config_path}"),
        0.9,
        config_path,
    ));
    candidate
}
