//! OS adapter: everything the engine needs from its host environment.
//!
//! Discovery sources share one adapter and treat it as read-only. Per-pid
//! lookups degrade to empty values (processes vanish mid-scan); list-level
//! operations return `Result` so the passive coordinator can record a source
//! failure without aborting the other sources.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

mod host;

pub use host::HostPlatform;

#[cfg(test)]
pub(crate) mod mock;

/// A socket some process is listening on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListeningSocket {
    pub pid: i32,
    pub address: String,
    pub port: u16,
    /// `"tcp"` or `"udp"`.
    pub protocol: String,
    pub process_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DockerContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Combined command string.
    pub command: String,
    /// Entrypoint executable (`Path` in `docker inspect`).
    pub entrypoint_path: String,
    /// Command arguments (`Args` in `docker inspect`).
    pub entrypoint_args: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KubernetesPod {
    pub name: String,
    pub namespace: String,
    pub pod_ip: String,
    pub container_names: Vec<String>,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

#[async_trait]
pub trait Platform: Send + Sync {
    fn name(&self) -> &'static str;

    // File system.
    async fn file_exists(&self, path: &Path) -> bool;
    /// Tilde and `$VAR`/`${VAR}` expansion. Unknown variables are left as-is.
    fn expand_path(&self, path: &str) -> String;
    async fn read_json_file(&self, path: &Path) -> anyhow::Result<Value>;
    async fn list_directory(&self, path: &Path) -> anyhow::Result<Vec<String>>;

    // Processes.
    async fn process_list(&self) -> anyhow::Result<Vec<i32>>;
    async fn command_line(&self, pid: i32) -> String;
    async fn process_name(&self, pid: i32) -> String;
    /// Parent pid, or a value <= 0 if unknown.
    async fn parent_pid(&self, pid: i32) -> i32;
    async fn environment(&self, pid: i32) -> BTreeMap<String, String>;
    /// True when both stdin and stdout of `pid` are pipes.
    async fn has_bidirectional_pipes(&self, pid: i32) -> bool;

    // Network.
    async fn listening_sockets(&self) -> anyhow::Result<Vec<ListeningSocket>>;

    // Containers (optional).
    async fn docker_list_containers(&self) -> anyhow::Result<Vec<DockerContainer>> {
        Ok(Vec::new())
    }
    /// Ids/names curated by the `docker mcp` CLI plugin, if installed.
    async fn docker_mcp_server_ids(&self) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn k8s_list_pods(&self) -> anyhow::Result<Vec<KubernetesPod>> {
        Ok(Vec::new())
    }
}

/// The adapter for the machine we are running on.
pub fn default_platform() -> Arc<dyn Platform> {
    Arc::new(HostPlatform::new())
}
