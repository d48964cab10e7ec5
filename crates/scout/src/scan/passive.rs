use std::cmp::Ordering;
use std::time::Instant;

use tracing::debug;

use super::merge::merge_duplicates;
use crate::candidate::Candidate;
use crate::config::{PassiveScanConfig, PassiveScanResults};
use crate::detect::{ConfigSource, ContainerSource, NetworkSource, ProcessSource, SourceScan};
use crate::platform::Platform;
use crate::rulepack::RuleEngine;

/// Runs the enabled discovery sources, applies rulepacks, filters by
/// confidence, merges duplicates, and caps the survivor count.
///
/// A failing source contributes an error string and no candidates; the
/// other sources still run.
pub struct PassiveScanner<'a> {
    platform: &'a dyn Platform,
    rules: &'a RuleEngine,
}

impl<'a> PassiveScanner<'a> {
    pub fn new(platform: &'a dyn Platform, rules: &'a RuleEngine) -> Self {
        Self { platform, rules }
    }

    pub async fn scan(&self, config: &PassiveScanConfig) -> PassiveScanResults {
        let started = Instant::now();
        let mut results = PassiveScanResults::new();

        if config.scan_configs {
            let source = ConfigSource::new(&config.additional_config_paths);
            match source.detect(self.platform).await {
                Ok(scan) => {
                    results.config_files_checked += scan.items_checked;
                    self.admit(scan, config, &mut results);
                }
                Err(err) => results.errors.push(format!("config source: {err:#}")),
            }
        }

        if config.scan_processes {
            match ProcessSource::new().detect(self.platform).await {
                Ok(scan) => {
                    results.processes_scanned += scan.items_checked;
                    self.admit(scan, config, &mut results);
                }
                Err(err) => results.errors.push(format!("process source: {err:#}")),
            }
        }

        if config.scan_network {
            match NetworkSource::new().detect(self.platform).await {
                Ok(scan) => {
                    results.network_sockets_checked += scan.items_checked;
                    self.admit(scan, config, &mut results);
                }
                Err(err) => results.errors.push(format!("network source: {err:#}")),
            }
        }

        if config.scan_containers {
            match ContainerSource::new().detect(self.platform).await {
                Ok(scan) => {
                    results.containers_scanned += scan.items_checked;
                    self.admit(scan, config, &mut results);
                }
                Err(err) => results.errors.push(format!("container source: {err:#}")),
            }
        }

        merge_duplicates(&mut results.candidates);

        if results.candidates.len() > config.max_candidates {
            debug!(
                dropped = results.candidates.len() - config.max_candidates,
                "candidate cap reached, keeping the highest-confidence survivors"
            );
            sort_by_confidence(&mut results.candidates);
            results.candidates.truncate(config.max_candidates);
        } else {
            sort_by_confidence(&mut results.candidates);
        }

        results.scan_duration_seconds = started.elapsed().as_secs_f64();
        results
    }

    fn admit(
        &self,
        scan: SourceScan,
        config: &PassiveScanConfig,
        results: &mut PassiveScanResults,
    ) {
        for mut candidate in scan.candidates {
            self.rules.apply(&mut candidate);
            if candidate.confidence_score >= config.min_confidence {
                results.candidates.push(candidate);
            }
        }
    }
}

/// Stable, descending by confidence.
fn sort_by_confidence(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.confidence_score
            .partial_cmp(&a.confidence_score)
            .unwrap_or(Ordering::Equal)
    });
}
