use crate::candidate::Candidate;

/// Two candidates are duplicates when any identity key coincides, checked in
/// this order: (config_file, config_key), pid, url, exact command.
pub(crate) fn is_duplicate(a: &Candidate, b: &Candidate) -> bool {
    if !a.config_file.is_empty()
        && !b.config_file.is_empty()
        && a.config_file == b.config_file
        && a.config_key == b.config_key
    {
        return true;
    }
    if a.pid > 0 && b.pid > 0 && a.pid == b.pid {
        return true;
    }
    if !a.url.is_empty() && !b.url.is_empty() && a.url == b.url {
        return true;
    }
    if !a.command.is_empty() && !b.command.is_empty() && a.command == b.command {
        return true;
    }
    false
}

/// Collapses duplicates in place. The earlier candidate survives and absorbs
/// every piece of the later one's evidence (multiset union; the Noisy-OR
/// recomputation handles compounding).
///
/// O(n²) pairwise, which is fine for the n <= 1000 the candidate cap allows.
pub fn merge_duplicates(candidates: &mut Vec<Candidate>) {
    let mut i = 0;
    while i < candidates.len() {
        let mut j = i + 1;
        while j < candidates.len() {
            if is_duplicate(&candidates[i], &candidates[j]) {
                let duplicate = candidates.remove(j);
                for evidence in duplicate.evidence {
                    candidates[i].push_evidence(evidence);
                }
            } else {
                j += 1;
            }
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::Evidence;

    fn with_evidence(mut candidate: Candidate, confidence: f64) -> Candidate {
        candidate.push_evidence(Evidence::new("signal", "", confidence, ""));
        candidate
    }

    fn by_pid(pid: i32, confidence: f64) -> Candidate {
        with_evidence(
            Candidate {
                pid,
                ..Candidate::default()
            },
            confidence,
        )
    }

    #[test]
    fn same_pid_merges() {
        let mut candidates = vec![by_pid(7, 0.5), by_pid(7, 0.5), by_pid(8, 0.5)];
        merge_duplicates(&mut candidates);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].pid, 7);
        assert_eq!(candidates[0].evidence.len(), 2);
        // 1 - 0.5 * 0.5
        assert!((candidates[0].confidence_score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn same_config_file_and_key_merges() {
        let make = |key: &str| {
            with_evidence(
                Candidate {
                    config_file: "/etc/mcp/servers.json".to_string(),
                    config_key: key.to_string(),
                    ..Candidate::default()
                },
                0.9,
            )
        };
        let mut candidates = vec![make("fs"), make("fs"), make("web")];
        merge_duplicates(&mut candidates);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn same_url_merges() {
        let make = || {
            with_evidence(
                Candidate {
                    url: "http://127.0.0.1:3000".to_string(),
                    ..Candidate::default()
                },
                0.1,
            )
        };
        let mut candidates = vec![make(), make()];
        merge_duplicates(&mut candidates);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn same_command_merges_across_sources() {
        // A config-declared server and the matching running process share a
        // command line; their evidence compounds.
        let declared = with_evidence(
            Candidate {
                config_file: "/home/u/.config/c.json".to_string(),
                config_key: "fs".to_string(),
                command: "node /a/b.js".to_string(),
                ..Candidate::default()
            },
            0.9,
        );
        let running = with_evidence(
            Candidate {
                pid: 123,
                command: "node /a/b.js".to_string(),
                ..Candidate::default()
            },
            0.6,
        );

        let mut candidates = vec![declared, running];
        merge_duplicates(&mut candidates);
        assert_eq!(candidates.len(), 1);
        // Survivor is the earlier candidate.
        assert_eq!(candidates[0].config_key, "fs");
        assert_eq!(candidates[0].evidence.len(), 2);
        assert!((candidates[0].confidence_score - 0.96).abs() < 1e-9);
    }

    #[test]
    fn distinct_commands_do_not_merge() {
        let a = with_evidence(
            Candidate {
                command: "node a.js".to_string(),
                ..Candidate::default()
            },
            0.5,
        );
        let b = with_evidence(
            Candidate {
                command: "node b.js".to_string(),
                ..Candidate::default()
            },
            0.5,
        );
        let mut candidates = vec![a, b];
        merge_duplicates(&mut candidates);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn empty_identity_fields_never_match() {
        let mut candidates = vec![
            with_evidence(Candidate::default(), 0.5),
            with_evidence(Candidate::default(), 0.5),
        ];
        merge_duplicates(&mut candidates);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn config_identity_wins_over_command_mismatch() {
        // Same config file + key but different commands: still the same
        // declared server (identity keys short-circuit before command).
        let make = |command: &str| {
            with_evidence(
                Candidate {
                    config_file: "/etc/mcp/servers.json".to_string(),
                    config_key: "fs".to_string(),
                    command: command.to_string(),
                    ..Candidate::default()
                },
                0.9,
            )
        };
        let mut candidates = vec![make("node old.js"), make("node new.js")];
        merge_duplicates(&mut candidates);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].command, "node old.js");
    }

    #[test]
    fn merge_is_idempotent() {
        let mut once = vec![by_pid(1, 0.4), by_pid(1, 0.4), by_pid(2, 0.4)];
        merge_duplicates(&mut once);
        let mut twice = once.clone();
        merge_duplicates(&mut twice);

        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.pid, b.pid);
            assert_eq!(a.evidence, b.evidence);
            assert_eq!(a.confidence_score, b.confidence_score);
        }
    }
}
