use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;

use super::{DockerContainer, ListeningSocket, Platform};

#[derive(Debug, Clone, Default)]
pub(crate) struct MockProcess {
    pub pid: i32,
    pub name: String,
    pub command: String,
    pub parent_pid: i32,
    pub environment: BTreeMap<String, String>,
    pub bidirectional_pipes: bool,
}

/// In-memory adapter for pipeline tests. Paths are matched post-expansion;
/// `~` expands to `/home/tester`.
#[derive(Clone, Default)]
pub(crate) struct MockPlatform {
    pub files: BTreeMap<String, Value>,
    pub directories: BTreeMap<String, Vec<String>>,
    pub existing_paths: BTreeSet<String>,
    pub processes: Vec<MockProcess>,
    pub sockets: Vec<ListeningSocket>,
    pub containers: Vec<DockerContainer>,
    pub mcp_server_ids: Vec<String>,
    pub fail_process_list: bool,
    pub fail_listening_sockets: bool,
}

impl MockPlatform {
    fn process(&self, pid: i32) -> Option<&MockProcess> {
        self.processes.iter().find(|p| p.pid == pid)
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn file_exists(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        self.files.contains_key(path.as_ref())
            || self.directories.contains_key(path.as_ref())
            || self.existing_paths.contains(path.as_ref())
    }

    fn expand_path(&self, path: &str) -> String {
        if let Some(rest) = path.strip_prefix("~/") {
            format!("/home/tester/{rest}")
        } else {
            path.to_string()
        }
    }

    async fn read_json_file(&self, path: &Path) -> anyhow::Result<Value> {
        self.files
            .get(path.to_string_lossy().as_ref())
            .cloned()
            .with_context(|| format!("no such file: {}", path.display()))
    }

    async fn list_directory(&self, path: &Path) -> anyhow::Result<Vec<String>> {
        self.directories
            .get(path.to_string_lossy().as_ref())
            .cloned()
            .with_context(|| format!("no such directory: {}", path.display()))
    }

    async fn process_list(&self) -> anyhow::Result<Vec<i32>> {
        if self.fail_process_list {
            anyhow::bail!("process listing denied");
        }
        Ok(self.processes.iter().map(|p| p.pid).collect())
    }

    async fn command_line(&self, pid: i32) -> String {
        self.process(pid)
            .map(|p| p.command.clone())
            .unwrap_or_default()
    }

    async fn process_name(&self, pid: i32) -> String {
        self.process(pid)
            .map(|p| p.name.clone())
            .unwrap_or_default()
    }

    async fn parent_pid(&self, pid: i32) -> i32 {
        self.process(pid).map(|p| p.parent_pid).unwrap_or(-1)
    }

    async fn environment(&self, pid: i32) -> BTreeMap<String, String> {
        self.process(pid)
            .map(|p| p.environment.clone())
            .unwrap_or_default()
    }

    async fn has_bidirectional_pipes(&self, pid: i32) -> bool {
        self.process(pid)
            .map(|p| p.bidirectional_pipes)
            .unwrap_or(false)
    }

    async fn listening_sockets(&self) -> anyhow::Result<Vec<ListeningSocket>> {
        if self.fail_listening_sockets {
            anyhow::bail!("socket listing denied");
        }
        Ok(self.sockets.clone())
    }

    async fn docker_list_containers(&self) -> anyhow::Result<Vec<DockerContainer>> {
        Ok(self.containers.clone())
    }

    async fn docker_mcp_server_ids(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.mcp_server_ids.clone())
    }
}
