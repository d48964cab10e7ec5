use anyhow::Context;

use super::SourceScan;
use crate::candidate::{Candidate, Transport};
use crate::evidence::{Evidence, Strength};
use crate::platform::Platform;

/// Known MCP client applications; a parent process matching one of these is
/// weak evidence that the child speaks MCP over stdio.
pub const KNOWN_CLIENT_NAMES: &[&str] = &[
    "Claude",
    "claude",
    "Claude.app",
    "Cursor",
    "cursor",
    "code",
    "Code",
    "Visual Studio Code",
    "windsurf",
    "Windsurf",
];

const MCP_ENV_PREFIXES: &[&str] = &["MCP_", "ANTHROPIC_", "CLAUDE_"];

/// Inspects running processes for stdio-transport MCP server indicators.
pub struct ProcessSource;

impl ProcessSource {
    pub fn new() -> Self {
        Self
    }

    pub async fn detect(&self, platform: &dyn Platform) -> anyhow::Result<SourceScan> {
        let pids = platform.process_list().await.context("list processes")?;

        let mut scan = SourceScan {
            items_checked: pids.len(),
            ..SourceScan::default()
        };

        for pid in pids {
            let process_name = platform.process_name(pid).await;
            let command = platform.command_line(pid).await;
            if process_name.is_empty() && command.is_empty() {
                continue;
            }

            let mut candidate = Candidate {
                pid,
                process_name,
                command,
                ..Candidate::default()
            };

            self.check_parent_process(platform, pid, &mut candidate).await;
            self.check_file_descriptors(platform, pid, &mut candidate)
                .await;
            self.check_environment(platform, pid, &mut candidate).await;

            if !candidate.evidence.is_empty() {
                scan.candidates.push(candidate);
            }
        }

        Ok(scan)
    }

    async fn check_parent_process(
        &self,
        platform: &dyn Platform,
        pid: i32,
        candidate: &mut Candidate,
    ) {
        let parent_pid = platform.parent_pid(pid).await;
        if parent_pid <= 0 {
            return;
        }
        let parent_name = platform.process_name(parent_pid).await;
        if parent_name.is_empty() {
            return;
        }

        candidate.parent_pid = parent_pid;
        candidate.parent_process_name = parent_name.clone();

        if KNOWN_CLIENT_NAMES
            .iter()
            .any(|client| parent_name.contains(client))
        {
            candidate.push_evidence(
                Evidence::new(
                    "parent_process",
                    format!("Parent process is MCP client: {parent_name}"),
                    0.7,
                    "",
                )
                .with_strength(Strength::Weak),
            );
        }
    }

    async fn check_file_descriptors(
        &self,
        platform: &dyn Platform,
        pid: i32,
        candidate: &mut Candidate,
    ) {
        if platform.has_bidirectional_pipes(pid).await {
            candidate.push_evidence(Evidence::new(
                "file_descriptors",
                "Process has bidirectional pipes (stdio transport)",
                0.6,
                "",
            ));
            candidate.transport_hint = Transport::Stdio;
        }
    }

    async fn check_environment(
        &self,
        platform: &dyn Platform,
        pid: i32,
        candidate: &mut Candidate,
    ) {
        let environment = platform.environment(pid).await;
        for key in environment.keys() {
            if MCP_ENV_PREFIXES
                .iter()
                .any(|prefix| key.starts_with(prefix))
            {
                candidate.push_evidence(Evidence::new(
                    "environment",
                    format!("Environment variable found: {key}"),
                    0.5,
                    "",
                ));
            }
        }
    }
}

impl Default for ProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::{MockPlatform, MockProcess};

    fn platform_with(processes: Vec<MockProcess>) -> MockPlatform {
        MockPlatform {
            processes,
            ..MockPlatform::default()
        }
    }

    #[tokio::test]
    async fn process_without_indicators_is_not_emitted() {
        let platform = platform_with(vec![MockProcess {
            pid: 100,
            name: "bash".to_string(),
            command: "bash".to_string(),
            parent_pid: 1,
            ..MockProcess::default()
        }]);

        let scan = ProcessSource::new().detect(&platform).await.unwrap();
        assert_eq!(scan.items_checked, 1);
        assert!(scan.candidates.is_empty());
    }

    #[tokio::test]
    async fn known_client_parent_is_weak_evidence() {
        let platform = platform_with(vec![
            MockProcess {
                pid: 50,
                name: "Claude Helper".to_string(),
                command: "claude".to_string(),
                parent_pid: 1,
                ..MockProcess::default()
            },
            MockProcess {
                pid: 100,
                name: "node".to_string(),
                command: "node server.js".to_string(),
                parent_pid: 50,
                ..MockProcess::default()
            },
        ]);

        let scan = ProcessSource::new().detect(&platform).await.unwrap();
        // The helper itself has a parent with no match; only pid 100 emits.
        assert_eq!(scan.candidates.len(), 1);
        let candidate = &scan.candidates[0];
        assert_eq!(candidate.pid, 100);
        assert_eq!(candidate.parent_pid, 50);
        assert_eq!(candidate.parent_process_name, "Claude Helper");
        assert_eq!(candidate.evidence[0].kind, "parent_process");
        assert_eq!(candidate.evidence[0].strength, Strength::Weak);
        // A single weak signal stays below the active-testing threshold.
        assert!(candidate.confidence_score <= 0.49);
    }

    #[tokio::test]
    async fn bidirectional_pipes_set_stdio_hint() {
        let platform = platform_with(vec![MockProcess {
            pid: 200,
            name: "mcp-files".to_string(),
            command: "mcp-files --root /srv".to_string(),
            parent_pid: 1,
            bidirectional_pipes: true,
            ..MockProcess::default()
        }]);

        let scan = ProcessSource::new().detect(&platform).await.unwrap();
        let candidate = &scan.candidates[0];
        assert_eq!(candidate.transport_hint, Transport::Stdio);
        assert_eq!(candidate.evidence[0].kind, "file_descriptors");
        assert!((candidate.confidence_score - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn mcp_environment_variables_each_add_evidence() {
        let mut environment = std::collections::BTreeMap::new();
        environment.insert("MCP_SERVER_NAME".to_string(), "files".to_string());
        environment.insert("ANTHROPIC_API_KEY".to_string(), "sk-xxx".to_string());
        environment.insert("PATH".to_string(), "/usr/bin".to_string());

        let platform = platform_with(vec![MockProcess {
            pid: 300,
            name: "python".to_string(),
            command: "python -m mcp_server".to_string(),
            parent_pid: 1,
            environment,
            ..MockProcess::default()
        }]);

        let scan = ProcessSource::new().detect(&platform).await.unwrap();
        let candidate = &scan.candidates[0];
        let env_evidence: Vec<_> = candidate
            .evidence
            .iter()
            .filter(|e| e.kind == "environment")
            .collect();
        assert_eq!(env_evidence.len(), 2);
        // Two 0.5 signals compound: 1 - 0.5 * 0.5.
        assert!((candidate.confidence_score - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn all_three_checks_compound() {
        let mut environment = std::collections::BTreeMap::new();
        environment.insert("MCP_MODE".to_string(), "stdio".to_string());

        let platform = platform_with(vec![
            MockProcess {
                pid: 10,
                name: "Cursor".to_string(),
                command: "cursor".to_string(),
                parent_pid: 1,
                ..MockProcess::default()
            },
            MockProcess {
                pid: 400,
                name: "node".to_string(),
                command: "node mcp.js".to_string(),
                parent_pid: 10,
                bidirectional_pipes: true,
                environment,
                ..MockProcess::default()
            },
        ]);

        let scan = ProcessSource::new().detect(&platform).await.unwrap();
        let candidate = scan.candidates.iter().find(|c| c.pid == 400).unwrap();
        assert_eq!(candidate.evidence.len(), 3);
        // 1 - (1-0.7)(1-0.6)(1-0.5) = 0.94
        assert!((candidate.confidence_score - 0.94).abs() < 1e-9);
    }

    #[tokio::test]
    async fn listing_failure_propagates() {
        let platform = MockPlatform {
            fail_process_list: true,
            ..MockPlatform::default()
        };
        assert!(ProcessSource::new().detect(&platform).await.is_err());
    }
}
