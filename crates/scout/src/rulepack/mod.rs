//! Declarative match/action rules applied to every candidate.
//!
//! Rulepacks are JSON documents of rules. A rule fires when all of its match
//! conditions hold; its actions then run in order. Rule order within a pack
//! and pack order within the engine are part of the author's contract: a
//! later rule may cap or un-cap an earlier boost.

use std::path::Path;

use anyhow::Context;
use serde_json::Value;

use crate::candidate::{Candidate, MAX_CONFIDENCE};
use crate::evidence::Evidence;

mod file_format;


const MAX_RULEPACK_BYTES: u64 = 1024 * 1024;

/// One condition of a rule. All of a rule's conditions must hold.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleMatch {
    /// Substring of `process_name`.
    ProcessName(String),
    /// Substring of `command`.
    CommandContains(String),
    /// Regex search on `command`. A malformed pattern is a non-match, never
    /// an error.
    CommandRegex(String),
    PortEquals(u16),
    /// Substring of `url`.
    UrlContains(String),
    /// Substring of `config_file`.
    ConfigFile(String),
    /// Any existing evidence has this type.
    EvidenceType(String),
    /// Substring of the recorded parent process name. A candidate whose
    /// parent name was never resolved is a non-match.
    ParentProcess(String),
}

impl RuleMatch {
    pub fn matches(&self, candidate: &Candidate) -> bool {
        match self {
            Self::ProcessName(value) => candidate.process_name.contains(value),
            Self::CommandContains(value) => candidate.command.contains(value),
            Self::CommandRegex(value) => match regex::Regex::new(value) {
                Ok(pattern) => pattern.is_match(&candidate.command),
                Err(_) => false,
            },
            Self::PortEquals(port) => candidate.port == *port,
            Self::UrlContains(value) => candidate.url.contains(value),
            Self::ConfigFile(value) => candidate.config_file.contains(value),
            Self::EvidenceType(value) => candidate.evidence.iter().any(|e| e.kind == *value),
            Self::ParentProcess(value) => {
                !candidate.parent_process_name.is_empty()
                    && candidate.parent_process_name.contains(value)
            }
        }
    }
}

/// One action of a rule, applied when the rule fires.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleAction {
    AddEvidence {
        kind: String,
        description: String,
        confidence: f64,
        source: String,
    },
    /// `score = min(score * factor, 0.99)`.
    BoostConfidence(f64),
    /// Raise the score to at least this value.
    SetMinimumConfidence(f64),
    /// Evidence of type `"tag"` at confidence 0; no scoring effect.
    AddTag(String),
    /// Confirmed NOT MCP; the veto drives the score to 0.
    AddNegativeEvidence {
        kind: String,
        description: String,
        confidence: f64,
    },
    /// Lower the score to at most this value (soft exclusion).
    SetMaximumConfidence(f64),
    /// Hard exclusion: score 0 plus a definitive negative evidence.
    Exclude,
}

impl RuleAction {
    pub fn apply(&self, candidate: &mut Candidate) {
        match self {
            Self::AddEvidence {
                kind,
                description,
                confidence,
                source,
            } => {
                candidate.push_evidence(Evidence::new(kind, description, *confidence, source));
            }
            Self::BoostConfidence(factor) => {
                candidate.confidence_score =
                    (candidate.confidence_score * factor).min(MAX_CONFIDENCE);
            }
            Self::SetMinimumConfidence(floor) => {
                if candidate.confidence_score < *floor {
                    candidate.confidence_score = *floor;
                }
            }
            Self::AddTag(tag) => {
                candidate.push_evidence(Evidence::new(
                    "tag",
                    format!("Tagged as: {tag}"),
                    0.0,
                    "rulepack",
                ));
            }
            Self::AddNegativeEvidence {
                kind,
                description,
                confidence,
            } => {
                candidate.push_evidence(Evidence::negative(
                    kind,
                    description,
                    *confidence,
                    "rulepack:exclusion",
                ));
            }
            Self::SetMaximumConfidence(cap) => {
                if candidate.confidence_score > *cap {
                    candidate.confidence_score = *cap;
                }
            }
            Self::Exclude => {
                candidate.confidence_score = 0.0;
                candidate.push_evidence(Evidence::negative(
                    "rulepack_exclusion",
                    "Excluded by rulepack rule",
                    0.99,
                    "rulepack:exclusion",
                ));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub description: String,
    pub match_conditions: Vec<RuleMatch>,
    pub actions: Vec<RuleAction>,
}

impl Rule {
    pub fn matches(&self, candidate: &Candidate) -> bool {
        self.match_conditions
            .iter()
            .all(|condition| condition.matches(candidate))
    }

    pub fn apply(&self, candidate: &mut Candidate) {
        if !self.matches(candidate) {
            return;
        }
        for action in &self.actions {
            action.apply(candidate);
        }
    }
}

/// An ordered collection of rules plus metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Rulepack {
    pub name: String,
    pub version: String,
    pub description: String,
    pub rules: Vec<Rule>,
}

impl Rulepack {
    pub fn from_value(value: &Value) -> anyhow::Result<Self> {
        file_format::rulepack_from_value(value)
    }

    pub fn from_str(text: &str) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_str(text).context("parse rulepack JSON")?;
        Self::from_value(&value)
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let meta = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("stat {}", path.display()))?;
        if meta.len() > MAX_RULEPACK_BYTES {
            anyhow::bail!(
                "rulepack too large: {} bytes (max {MAX_RULEPACK_BYTES}): {}",
                meta.len(),
                path.display()
            );
        }
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        Self::from_str(&text).with_context(|| format!("parse {}", path.display()))
    }

    /// Serializes back to the on-disk schema. `from_value(to_value(p))`
    /// reproduces `p` for rulepacks in the documented schema (at most one
    /// occurrence of each recognized key per rule).
    pub fn to_value(&self) -> Value {
        file_format::rulepack_to_value(self)
    }

    pub fn apply(&self, candidate: &mut Candidate) {
        for rule in &self.rules {
            rule.apply(candidate);
        }
    }
}

/// Owns an ordered sequence of rulepacks; read-only during scans.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rulepacks: Vec<Rulepack>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rulepack(&mut self, rulepack: Rulepack) {
        self.rulepacks.push(rulepack);
    }

    pub async fn load_rulepack(&mut self, path: &Path) -> anyhow::Result<()> {
        let rulepack = Rulepack::load(path).await?;
        self.add_rulepack(rulepack);
        Ok(())
    }

    pub fn rulepacks(&self) -> &[Rulepack] {
        &self.rulepacks
    }

    pub fn apply(&self, candidate: &mut Candidate) {
        for rulepack in &self.rulepacks {
            rulepack.apply(candidate);
        }
    }
}
