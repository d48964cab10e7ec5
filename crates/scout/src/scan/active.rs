use std::time::Instant;

use anyhow::Context;
use futures_util::StreamExt;
use futures_util::stream;
use tracing::debug;

use crate::candidate::Candidate;
use crate::config::{ActiveScanConfig, ActiveScanResults};
use crate::interrogate::Interrogator;
use crate::probe::{HttpProbe, StdioProbe};
use crate::server::McpServer;

enum TestOutcome {
    Skipped,
    Confirmed(Box<McpServer>),
    Failed {
        candidate: Candidate,
        error: Option<String>,
    },
}

/// Confirms candidates by probing them: stdio first, then HTTP; the first
/// probe that returns a server wins. Probes overlap up to
/// `max_parallel_probes`, with results kept in candidate order.
pub struct ActiveScanner {
    stdio: StdioProbe,
    http: HttpProbe,
    interrogator: Interrogator,
}

impl ActiveScanner {
    pub fn new(config: &ActiveScanConfig) -> anyhow::Result<Self> {
        let http = HttpProbe::new(config.probe_timeout).context("initialize http probe")?;
        Ok(Self {
            stdio: StdioProbe::new(config.probe_timeout),
            interrogator: Interrogator::new(
                config.interrogation.clone(),
                reqwest::Client::builder()
                    .no_proxy()
                    .connect_timeout(config.probe_timeout)
                    .build()
                    .context("build interrogation http client")?,
            ),
            http,
        })
    }

    pub async fn scan(
        &self,
        candidates: Vec<Candidate>,
        config: &ActiveScanConfig,
    ) -> ActiveScanResults {
        let started = Instant::now();
        let mut results = ActiveScanResults::new();
        results.candidates_tested = candidates.clone();

        let parallel = config.max_parallel_probes.max(1);
        let outcomes: Vec<TestOutcome> =
            stream::iter(candidates.into_iter().map(|c| self.test_candidate(c, config)))
                .buffered(parallel)
                .collect()
                .await;

        for outcome in outcomes {
            match outcome {
                TestOutcome::Skipped => {}
                TestOutcome::Confirmed(server) => {
                    results.servers_confirmed_count += 1;
                    results.candidates_tested_count += 1;
                    results.confirmed_servers.push(*server);
                }
                TestOutcome::Failed { candidate, error } => {
                    results.candidates_tested_count += 1;
                    results.tests_failed_count += 1;
                    if let Some(error) = error {
                        results.errors.push(error);
                    }
                    results.failed_tests.push(candidate);
                }
            }
        }

        results.scan_duration_seconds = started.elapsed().as_secs_f64();
        results
    }

    async fn test_candidate(
        &self,
        candidate: Candidate,
        config: &ActiveScanConfig,
    ) -> TestOutcome {
        if candidate.pid > 0 && config.skip_pids.contains(&candidate.pid) {
            debug!(pid = candidate.pid, "skipping candidate on skip list");
            return TestOutcome::Skipped;
        }
        if !candidate.url.is_empty() && config.skip_urls.contains(&candidate.url) {
            debug!(url = %candidate.url, "skipping candidate on skip list");
            return TestOutcome::Skipped;
        }

        let mut probe_errors = Vec::new();

        match self.stdio.test(&candidate).await {
            Ok(Some(server)) => return self.confirm(server, config).await,
            Ok(None) => {}
            Err(err) => probe_errors.push(format!("stdio: {err:#}")),
        }

        match self.http.test(&candidate).await {
            Ok(Some(server)) => return self.confirm(server, config).await,
            Ok(None) => {}
            Err(err) => probe_errors.push(format!("http: {err:#}")),
        }

        let error = if probe_errors.is_empty() {
            None
        } else {
            let subject = if !candidate.command.is_empty() {
                format!(" (command: {})", candidate.command)
            } else if !candidate.url.is_empty() {
                format!(" (url: {})", candidate.url)
            } else {
                String::new()
            };
            Some(format!(
                "Failed to test candidate{subject} - Errors: {}",
                probe_errors.join("; ")
            ))
        };

        TestOutcome::Failed { candidate, error }
    }

    async fn confirm(&self, mut server: McpServer, config: &ActiveScanConfig) -> TestOutcome {
        if config.interrogate && config.interrogation.enabled {
            self.interrogator.interrogate(&mut server).await;
        }
        TestOutcome::Confirmed(Box::new(server))
    }
}
