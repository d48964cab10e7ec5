//! Result renderers: a human summary, machine-readable JSON, and CSV.

use std::str::FromStr;

use crate::config::ScanResults;

mod cli;
mod csv;
mod json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Cli,
    Json,
    Csv,
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cli" => Ok(Self::Cli),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => anyhow::bail!("unknown report format: {other} (expected cli, json, or csv)"),
        }
    }
}

pub fn render(format: ReportFormat, results: &ScanResults) -> anyhow::Result<String> {
    match format {
        ReportFormat::Cli => Ok(cli::render(results)),
        ReportFormat::Json => json::render(results),
        ReportFormat::Csv => Ok(csv::render(results)),
    }
}
