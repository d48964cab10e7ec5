use std::collections::BTreeMap;

use serde::Serialize;

use crate::evidence::{Evidence, Strength};
use crate::platform::{DockerContainer, KubernetesPod};

/// Wire transport used (or suspected) for a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Stdio,
    Http,
    Sse,
    #[default]
    Unknown,
}

/// No candidate is certain without active confirmation.
pub const MAX_CONFIDENCE: f64 = 0.99;

/// Ceiling for candidates whose evidence is entirely `Weak`. Keeps single
/// weak signals below the active-testing threshold.
pub const WEAK_ONLY_CAP: f64 = 0.49;

/// A suspected MCP server, not yet confirmed.
///
/// At least one identity field is populated: `pid` for processes, `url` for
/// network listeners, `(config_file, config_key)` for declared servers, or a
/// container reference.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Candidate {
    pub pid: i32,
    pub command: String,
    pub process_name: String,
    pub parent_pid: i32,
    pub parent_process_name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    pub config_file: String,
    pub config_key: String,

    pub url: String,
    pub address: String,
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_container: Option<DockerContainer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k8s_pod: Option<KubernetesPod>,

    pub evidence: Vec<Evidence>,
    pub confidence_score: f64,
    pub transport_hint: Transport,
}

impl Candidate {
    /// Appends evidence and recomputes the confidence score.
    pub fn push_evidence(&mut self, evidence: Evidence) {
        self.evidence.push(evidence);
        self.recalculate_confidence();
    }

    /// Noisy-OR aggregation over the evidence set.
    ///
    /// 1. Any negative evidence vetoes the candidate: score 0.
    /// 2. `p = 1 - prod(1 - confidence_i)` compounds independent signals with
    ///    diminishing returns for duplicates.
    /// 3. Evidence that is entirely `Weak` is capped at [`WEAK_ONLY_CAP`].
    /// 4. Everything is capped at [`MAX_CONFIDENCE`].
    pub fn recalculate_confidence(&mut self) {
        if self.evidence.is_empty() {
            self.confidence_score = 0.0;
            return;
        }
        if self.evidence.iter().any(|e| e.is_negative) {
            self.confidence_score = 0.0;
            return;
        }

        let product_of_negatives: f64 = self.evidence.iter().map(|e| 1.0 - e.confidence).product();
        let score = 1.0 - product_of_negatives;

        let only_weak = self.evidence.iter().all(|e| e.strength == Strength::Weak);
        self.confidence_score = if only_weak {
            score.min(WEAK_ONLY_CAP)
        } else {
            score.min(MAX_CONFIDENCE)
        };
    }

    /// A direct detection does not need active verification: the server is
    /// explicitly declared (config), explicitly installed (extension), or
    /// matched by a rulepack.
    pub fn is_direct_detection(&self) -> bool {
        self.evidence.iter().any(|e| {
            e.kind == "claude_extension_installed"
                || e.kind == "config_declared"
                || e.source.starts_with("rulepack:")
        })
    }

    pub fn is_config_candidate(&self) -> bool {
        !self.config_file.is_empty()
    }

    pub fn is_process_candidate(&self) -> bool {
        self.pid > 0
    }

    pub fn is_network_candidate(&self) -> bool {
        !self.url.is_empty() || self.port > 0
    }

    pub fn is_container_candidate(&self) -> bool {
        self.docker_container.is_some() || self.k8s_pod.is_some()
    }
}
