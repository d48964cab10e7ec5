use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::candidate::Candidate;
use crate::server::McpServer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Discovery only.
    #[default]
    PassiveOnly,
    /// Test caller-provided candidates without discovery.
    ActiveOnly,
    /// Discovery followed by active confirmation.
    PassiveThenActive,
}

#[derive(Debug, Clone)]
pub struct PassiveScanConfig {
    pub scan_configs: bool,
    pub scan_processes: bool,
    pub scan_network: bool,
    /// Off by default; container inspection needs a working docker CLI.
    pub scan_containers: bool,

    /// Candidates scoring below this are dropped after rules are applied.
    pub min_confidence: f64,
    /// Keep at most this many candidates, highest confidence first.
    pub max_candidates: usize,

    /// Config file paths scanned in addition to the defaults.
    pub additional_config_paths: Vec<String>,
}

impl Default for PassiveScanConfig {
    fn default() -> Self {
        Self {
            scan_configs: true,
            scan_processes: true,
            scan_network: true,
            scan_containers: false,
            min_confidence: 0.0,
            max_candidates: 1000,
            additional_config_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InterrogationConfig {
    pub enabled: bool,

    pub get_tools: bool,
    pub get_resources: bool,
    pub get_resource_templates: bool,
    pub get_prompts: bool,

    /// Per-kind caps; surplus items are silently discarded.
    pub max_tools: usize,
    pub max_resources: usize,
    pub max_prompts: usize,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for InterrogationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            get_tools: true,
            get_resources: true,
            get_resource_templates: true,
            get_prompts: true,
            max_tools: 100,
            max_resources: 100,
            max_prompts: 50,
            timeout: Duration::from_millis(5000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActiveScanConfig {
    /// Per-probe timeout.
    pub probe_timeout: Duration,
    /// Upper bound on concurrently running probes.
    pub max_parallel_probes: usize,

    pub interrogate: bool,
    pub interrogation: InterrogationConfig,

    pub skip_pids: Vec<i32>,
    pub skip_urls: Vec<String>,
}

impl Default for ActiveScanConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(5000),
            max_parallel_probes: 10,
            interrogate: false,
            interrogation: InterrogationConfig::default(),
            skip_pids: Vec::new(),
            skip_urls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    pub mode: ScanMode,
    pub passive: PassiveScanConfig,
    pub active: ActiveScanConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassiveScanResults {
    pub candidates: Vec<Candidate>,

    pub config_files_checked: usize,
    pub processes_scanned: usize,
    pub network_sockets_checked: usize,
    pub containers_scanned: usize,

    pub scan_duration_seconds: f64,
    pub scan_timestamp: DateTime<Utc>,

    pub errors: Vec<String>,
}

impl PassiveScanResults {
    pub fn new() -> Self {
        Self {
            candidates: Vec::new(),
            config_files_checked: 0,
            processes_scanned: 0,
            network_sockets_checked: 0,
            containers_scanned: 0,
            scan_duration_seconds: 0.0,
            scan_timestamp: Utc::now(),
            errors: Vec::new(),
        }
    }
}

impl Default for PassiveScanResults {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveScanResults {
    pub candidates_tested: Vec<Candidate>,

    pub confirmed_servers: Vec<McpServer>,
    pub failed_tests: Vec<Candidate>,

    pub candidates_tested_count: usize,
    pub servers_confirmed_count: usize,
    pub tests_failed_count: usize,
    pub scan_duration_seconds: f64,
    pub scan_timestamp: DateTime<Utc>,

    pub errors: Vec<String>,
}

impl ActiveScanResults {
    pub fn new() -> Self {
        Self {
            candidates_tested: Vec::new(),
            confirmed_servers: Vec::new(),
            failed_tests: Vec::new(),
            candidates_tested_count: 0,
            servers_confirmed_count: 0,
            tests_failed_count: 0,
            scan_duration_seconds: 0.0,
            scan_timestamp: Utc::now(),
            errors: Vec::new(),
        }
    }
}

impl Default for ActiveScanResults {
    fn default() -> Self {
        Self::new()
    }
}

/// Combined scan results. The pipeline never fails outright: whatever went
/// wrong is described in `errors`.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResults {
    pub passive: PassiveScanResults,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<ActiveScanResults>,
    pub errors: Vec<String>,
}

impl ScanResults {
    pub fn new() -> Self {
        Self {
            passive: PassiveScanResults::new(),
            active: None,
            errors: Vec::new(),
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.passive.candidates
    }

    pub fn confirmed_servers(&self) -> &[McpServer] {
        self.active
            .as_ref()
            .map(|active| active.confirmed_servers.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_active_results(&self) -> bool {
        self.active.is_some()
    }
}

impl Default for ScanResults {
    fn default() -> Self {
        Self::new()
    }
}
