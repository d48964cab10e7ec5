use anyhow::Context;

use crate::config::ScanResults;

/// Full results as pretty-printed JSON; the shape is the serde model of
/// [`ScanResults`].
pub(super) fn render(results: &ScanResults) -> anyhow::Result<String> {
    serde_json::to_string_pretty(results).context("serialize scan results")
}
