use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncReadExt;

use super::{DockerContainer, ListeningSocket, Platform};

const MAX_CONFIG_BYTES: u64 = 1024 * 1024;
const DOCKER_CLI_TIMEOUT: Duration = Duration::from_secs(10);

/// `/proc`-backed adapter with docker-CLI container listing.
///
/// Per-pid lookups return empty values when the process is gone or
/// unreadable; only the list-level operations surface errors.
pub struct HostPlatform {
    proc_root: String,
}

impl HostPlatform {
    pub fn new() -> Self {
        Self {
            proc_root: "/proc".to_string(),
        }
    }

    #[cfg(test)]
    fn with_proc_root(proc_root: impl Into<String>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    fn proc_path(&self, pid: i32, leaf: &str) -> String {
        format!("{}/{pid}/{leaf}", self.proc_root)
    }

    /// Maps socket inodes to the pid holding them, by walking `/proc/*/fd`.
    async fn socket_inode_owners(&self) -> BTreeMap<u64, i32> {
        let mut owners = BTreeMap::new();
        let Ok(pids) = self.process_list().await else {
            return owners;
        };
        for pid in pids {
            let fd_dir = self.proc_path(pid, "fd");
            let Ok(mut entries) = tokio::fs::read_dir(&fd_dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let Ok(target) = tokio::fs::read_link(entry.path()).await else {
                    continue;
                };
                let target = target.to_string_lossy();
                if let Some(inode) = target
                    .strip_prefix("socket:[")
                    .and_then(|rest| rest.strip_suffix(']'))
                    .and_then(|inode| inode.parse::<u64>().ok())
                {
                    owners.entry(inode).or_insert(pid);
                }
            }
        }
        owners
    }

    async fn parse_proc_net(
        &self,
        table: &str,
        protocol: &str,
        listen_state: &str,
        owners: &BTreeMap<u64, i32>,
        out: &mut Vec<ListeningSocket>,
    ) {
        let path = format!("{}/net/{table}", self.proc_root);
        let Ok(text) = tokio::fs::read_to_string(&path).await else {
            return;
        };

        for line in text.lines().skip(1) {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                continue;
            }
            if fields[3] != listen_state {
                continue;
            }

            let Some((address, port)) = decode_proc_net_address(fields[1]) else {
                continue;
            };
            let inode: u64 = fields[9].parse().unwrap_or(0);
            let pid = owners.get(&inode).copied().unwrap_or(0);
            let process_name = if pid > 0 {
                self.process_name(pid).await
            } else {
                String::new()
            };

            out.push(ListeningSocket {
                pid,
                address,
                port,
                protocol: protocol.to_string(),
                process_name,
            });
        }
    }
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for HostPlatform {
    fn name(&self) -> &'static str {
        "host"
    }

    async fn file_exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    fn expand_path(&self, path: &str) -> String {
        expand_path_with(path, |name| std::env::var(name).ok())
    }

    async fn read_json_file(&self, path: &Path) -> anyhow::Result<Value> {
        let meta = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("stat {}", path.display()))?;
        if meta.len() > MAX_CONFIG_BYTES {
            anyhow::bail!(
                "config too large: {} bytes (max {MAX_CONFIG_BYTES}): {}",
                meta.len(),
                path.display()
            );
        }
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
    }

    async fn list_directory(&self, path: &Path) -> anyhow::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(path)
            .await
            .with_context(|| format!("list {}", path.display()))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("list {}", path.display()))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    async fn process_list(&self) -> anyhow::Result<Vec<i32>> {
        let mut entries = tokio::fs::read_dir(&self.proc_root)
            .await
            .with_context(|| format!("list {}", self.proc_root))?;
        let mut pids = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() {
                if pid > 0 {
                    pids.push(pid);
                }
            }
        }
        Ok(pids)
    }

    async fn command_line(&self, pid: i32) -> String {
        let Ok(raw) = tokio::fs::read(self.proc_path(pid, "cmdline")).await else {
            return String::new();
        };
        raw.split(|b| *b == 0)
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn process_name(&self, pid: i32) -> String {
        let Ok(comm) = tokio::fs::read_to_string(self.proc_path(pid, "comm")).await else {
            return String::new();
        };
        comm.trim().to_string()
    }

    async fn parent_pid(&self, pid: i32) -> i32 {
        let Ok(stat) = tokio::fs::read_to_string(self.proc_path(pid, "stat")).await else {
            return -1;
        };
        // The comm field is parenthesized and may contain spaces; fields
        // resume after the last ')'. PPid is the second one.
        let Some(rest) = stat.rsplit_once(')').map(|(_, rest)| rest) else {
            return -1;
        };
        rest.split_whitespace()
            .nth(1)
            .and_then(|field| field.parse().ok())
            .unwrap_or(-1)
    }

    async fn environment(&self, pid: i32) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        let Ok(raw) = tokio::fs::read(self.proc_path(pid, "environ")).await else {
            return env;
        };
        for entry in raw.split(|b| *b == 0) {
            if entry.is_empty() {
                continue;
            }
            let entry = String::from_utf8_lossy(entry);
            if let Some((key, value)) = entry.split_once('=') {
                env.insert(key.to_string(), value.to_string());
            }
        }
        env
    }

    async fn has_bidirectional_pipes(&self, pid: i32) -> bool {
        let stdin_is_pipe = fd_is_pipe(&self.proc_path(pid, "fd/0")).await;
        let stdout_is_pipe = fd_is_pipe(&self.proc_path(pid, "fd/1")).await;
        stdin_is_pipe && stdout_is_pipe
    }

    async fn listening_sockets(&self) -> anyhow::Result<Vec<ListeningSocket>> {
        let owners = self.socket_inode_owners().await;
        let mut sockets = Vec::new();
        // TCP listeners are state 0A (LISTEN); UDP has no LISTEN state, 07
        // (unconnected, bound) is the closest equivalent.
        self.parse_proc_net("tcp", "tcp", "0A", &owners, &mut sockets)
            .await;
        self.parse_proc_net("tcp6", "tcp", "0A", &owners, &mut sockets)
            .await;
        self.parse_proc_net("udp", "udp", "07", &owners, &mut sockets)
            .await;
        self.parse_proc_net("udp6", "udp", "07", &owners, &mut sockets)
            .await;
        Ok(sockets)
    }

    async fn docker_list_containers(&self) -> anyhow::Result<Vec<DockerContainer>> {
        let Some(ids) = run_docker(&["ps", "-q"]).await else {
            tracing::debug!("docker unavailable, skipping container listing");
            return Ok(Vec::new());
        };
        let ids: Vec<&str> = ids.split_whitespace().collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec!["inspect"];
        args.extend(ids);
        let Some(output) = run_docker(&args).await else {
            return Ok(Vec::new());
        };

        let inspected: Value =
            serde_json::from_str(&output).context("parse docker inspect output")?;
        let Value::Array(entries) = inspected else {
            anyhow::bail!("docker inspect did not return an array");
        };
        Ok(entries.iter().map(container_from_inspect).collect())
    }

    async fn docker_mcp_server_ids(&self) -> anyhow::Result<Vec<String>> {
        let Some(output) = run_docker(&["mcp", "server", "list"]).await else {
            return Ok(Vec::new());
        };
        Ok(output
            .split_whitespace()
            .map(|name| name.trim_matches(',').to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }
}

async fn fd_is_pipe(path: &str) -> bool {
    match tokio::fs::read_link(path).await {
        Ok(target) => target.to_string_lossy().starts_with("pipe:"),
        Err(_) => false,
    }
}

/// Runs the docker CLI, returning `None` when docker is absent or the
/// invocation fails. Container evidence is optional; a broken docker install
/// must not fail the scan.
async fn run_docker(args: &[&str]) -> Option<String> {
    let mut cmd = tokio::process::Command::new("docker");
    cmd.args(args);
    cmd.stdin(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().ok()?;
    let mut stdout = child.stdout.take()?;

    let outcome = tokio::time::timeout(DOCKER_CLI_TIMEOUT, async {
        let mut buf = String::new();
        stdout.read_to_string(&mut buf).await.ok()?;
        let status = child.wait().await.ok()?;
        status.success().then_some(buf)
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(_) => {
            let _ = child.start_kill();
            None
        }
    }
}

fn container_from_inspect(entry: &Value) -> DockerContainer {
    let str_at = |v: &Value, key: &str| {
        v.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    let config = entry.get("Config").cloned().unwrap_or(Value::Null);

    let mut labels = BTreeMap::new();
    if let Some(Value::Object(map)) = config.get("Labels") {
        for (key, value) in map {
            if let Some(value) = value.as_str() {
                labels.insert(key.clone(), value.to_string());
            }
        }
    }

    let mut env = BTreeMap::new();
    if let Some(Value::Array(entries)) = config.get("Env") {
        for entry in entries {
            if let Some((key, value)) = entry.as_str().and_then(|s| s.split_once('=')) {
                env.insert(key.to_string(), value.to_string());
            }
        }
    }

    let entrypoint_args = entry
        .get("Args")
        .and_then(|v| v.as_array())
        .map(|args| {
            args.iter()
                .filter_map(|a| a.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let command = config
        .get("Cmd")
        .and_then(|v| v.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    DockerContainer {
        id: str_at(entry, "Id"),
        name: str_at(entry, "Name")
            .trim_start_matches('/')
            .to_string(),
        image: str_at(&config, "Image"),
        command,
        entrypoint_path: str_at(entry, "Path"),
        entrypoint_args,
        labels,
        env,
    }
}

/// Decodes a `/proc/net/*` `local_address` field (`HEXADDR:HEXPORT`).
fn decode_proc_net_address(field: &str) -> Option<(String, u16)> {
    let (addr_hex, port_hex) = field.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;

    let address = match addr_hex.len() {
        8 => {
            // Little-endian u32.
            let raw = u32::from_str_radix(addr_hex, 16).ok()?;
            Ipv4Addr::from(raw.to_le_bytes()).to_string()
        }
        32 => {
            // Four little-endian u32 groups.
            let mut octets = [0u8; 16];
            for group in 0..4 {
                let raw = u32::from_str_radix(&addr_hex[group * 8..(group + 1) * 8], 16).ok()?;
                octets[group * 4..(group + 1) * 4].copy_from_slice(&raw.to_le_bytes());
            }
            Ipv6Addr::from(octets).to_string()
        }
        _ => return None,
    };

    Some((address, port))
}

/// `~`, `$VAR`, and `${VAR}` expansion. Unknown variables are left in place.
fn expand_path_with(path: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    if path.is_empty() {
        return String::new();
    }

    let mut result = path.to_string();
    if result.starts_with('~') {
        if let Some(home) = lookup("HOME") {
            if result.len() == 1 {
                result = home;
            } else if result.as_bytes()[1] == b'/' {
                result = format!("{home}{}", &result[1..]);
            }
        }
    }

    let mut pos = 0;
    while let Some(offset) = result[pos..].find('$') {
        let start = pos + offset;
        let rest = &result[start + 1..];

        if let Some(braced) = rest.strip_prefix('{') {
            let Some(close) = braced.find('}') else {
                break;
            };
            let name = &braced[..close];
            match lookup(name) {
                Some(value) => {
                    result = format!("{}{}{}", &result[..start], value, &braced[close + 1..]);
                    pos = start;
                }
                None => pos = start + close + 3,
            }
            continue;
        }

        let name_len = rest
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();
        if name_len == 0 {
            pos = start + 1;
            continue;
        }
        let name = &rest[..name_len];
        match lookup(name) {
            Some(value) => {
                result = format!("{}{}{}", &result[..start], value, &rest[name_len..]);
                pos = start;
            }
            None => pos = start + 1 + name_len,
        }
    }

    result
}
