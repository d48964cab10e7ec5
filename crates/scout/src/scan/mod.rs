//! Scan orchestration: passive discovery, rulepacks, optional active
//! confirmation.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

mod active;
mod merge;
mod passive;

#[cfg(test)]
mod tests;

pub use active::ActiveScanner;
pub use merge::merge_duplicates;
pub use passive::PassiveScanner;

use crate::candidate::Candidate;
use crate::config::{ActiveScanConfig, ActiveScanResults, ScanConfig, ScanMode, ScanResults};
use crate::platform::Platform;
use crate::rulepack::{RuleEngine, Rulepack};

/// Confidence lifts for well-known MCP server shapes; shipped with the
/// binary and loaded unless explicitly disabled.
pub const DEFAULT_RULEPACK: &str = include_str!("../../../../rulepacks/default.json");

/// Vetoes for common stdio lookalikes (Chromium helpers, language servers).
pub const EXCLUSIONS_RULEPACK: &str = include_str!("../../../../rulepacks/exclusions.json");

/// The front door: owns the platform adapter and the rule engine, runs
/// scans according to a [`ScanConfig`].
///
/// The rule engine is read-only during a scan; load rulepacks between
/// scans, not during one.
pub struct Scanner {
    platform: Arc<dyn Platform>,
    rules: RuleEngine,
}

impl Scanner {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            rules: RuleEngine::new(),
        }
    }

    /// Loads the embedded default and exclusion rulepacks.
    pub fn with_default_rulepacks(mut self) -> Self {
        for (name, text) in [
            ("default", DEFAULT_RULEPACK),
            ("exclusions", EXCLUSIONS_RULEPACK),
        ] {
            match Rulepack::from_str(text) {
                Ok(rulepack) => self.rules.add_rulepack(rulepack),
                Err(err) => warn!("embedded {name} rulepack failed to parse: {err:#}"),
            }
        }
        self
    }

    /// Loads a rulepack from disk. A malformed pack is an error for the
    /// caller to report; it never poisons already-loaded packs.
    pub async fn load_rulepack(&mut self, path: &Path) -> anyhow::Result<()> {
        self.rules.load_rulepack(path).await
    }

    pub fn add_rulepack(&mut self, rulepack: Rulepack) {
        self.rules.add_rulepack(rulepack);
    }

    pub fn rule_engine(&self) -> &RuleEngine {
        &self.rules
    }

    pub async fn scan(&self, config: &ScanConfig) -> ScanResults {
        let mut results = ScanResults::new();

        if config.mode != ScanMode::ActiveOnly {
            let passive = PassiveScanner::new(self.platform.as_ref(), &self.rules)
                .scan(&config.passive)
                .await;
            for error in &passive.errors {
                results.errors.push(format!("Passive scan: {error}"));
            }
            results.passive = passive;
        }

        if matches!(
            config.mode,
            ScanMode::PassiveThenActive | ScanMode::ActiveOnly
        ) {
            // ActiveOnly is for caller-provided candidates via
            // `test_candidates`; with no input it simply confirms nothing.
            let candidates = if config.mode == ScanMode::PassiveThenActive {
                results.passive.candidates.clone()
            } else {
                Vec::new()
            };

            let active = self.test_candidates(candidates, &config.active).await;
            for error in &active.errors {
                results.errors.push(format!("Active scan: {error}"));
            }
            results.active = Some(active);
        }

        results
    }

    /// Runs the active phase against an explicit candidate list.
    pub async fn test_candidates(
        &self,
        candidates: Vec<Candidate>,
        config: &ActiveScanConfig,
    ) -> ActiveScanResults {
        match ActiveScanner::new(config) {
            Ok(scanner) => scanner.scan(candidates, config).await,
            Err(err) => {
                let mut results = ActiveScanResults::new();
                results.errors.push(format!("{err:#}"));
                results
            }
        }
    }
}
