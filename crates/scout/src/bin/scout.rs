use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use mcp_scout::report::{self, ReportFormat};
use mcp_scout::{ScanConfig, ScanMode, Scanner, platform};

#[derive(Parser)]
#[command(name = "scout")]
#[command(about = "Discover and verify MCP servers on this host")]
#[command(after_help = "\
EXAMPLES:
    # Quick passive discovery
    scout

    # Active confirmation
    scout --mode active

    # Full discovery with interrogation, JSON output to a file
    scout --mode active --interrogate --format json -o scan.json
")]
struct Cli {
    /// Scan mode: passive, active.
    #[arg(short, long, default_value = "passive")]
    mode: String,

    /// Output format: cli, json, csv.
    #[arg(short, long, default_value = "cli")]
    format: String,

    /// Write output to a file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Interrogate confirmed servers for tools/resources/prompts.
    #[arg(long, default_value_t = false)]
    interrogate: bool,

    /// Per-probe timeout in milliseconds.
    #[arg(short, long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Drop candidates scoring below this confidence.
    #[arg(long, default_value_t = 0.0)]
    min_confidence: f64,

    /// Keep at most this many candidates.
    #[arg(long, default_value_t = 1000)]
    max_candidates: usize,

    /// Load custom rulepack file(s), applied after the built-in ones.
    #[arg(short, long)]
    rulepack: Vec<PathBuf>,

    /// Skip the built-in default and exclusion rulepacks.
    #[arg(long, default_value_t = false)]
    no_default_rulepacks: bool,

    /// Also scan containers (requires a working docker CLI).
    #[arg(long, default_value_t = false)]
    containers: bool,

    /// Additional config file path(s) to scan.
    #[arg(long)]
    config_path: Vec<String>,

    /// Never actively test this PID (repeatable).
    #[arg(long)]
    skip_pid: Vec<i32>,

    /// Never actively test this URL (repeatable).
    #[arg(long)]
    skip_url: Vec<String>,

    /// Increase log verbosity (RUST_LOG overrides).
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

async fn run() -> anyhow::Result<std::process::ExitCode> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let format: ReportFormat = cli.format.parse()?;

    let mode = match cli.mode.as_str() {
        "passive" => ScanMode::PassiveOnly,
        "active" => ScanMode::PassiveThenActive,
        other => anyhow::bail!("unknown mode: {other} (expected passive or active)"),
    };

    let mut scanner = Scanner::new(platform::default_platform());
    if !cli.no_default_rulepacks {
        scanner = scanner.with_default_rulepacks();
    }
    for path in &cli.rulepack {
        if let Err(err) = scanner.load_rulepack(path).await {
            // Rulepacks are optional; a broken one must not stop the scan.
            tracing::warn!("failed to load rulepack {}: {err:#}", path.display());
        }
    }

    let mut config = ScanConfig {
        mode,
        ..ScanConfig::default()
    };
    config.passive.scan_containers = cli.containers;
    config.passive.min_confidence = cli.min_confidence;
    config.passive.max_candidates = cli.max_candidates;
    config.passive.additional_config_paths = cli.config_path.clone();
    config.active.probe_timeout = Duration::from_millis(cli.timeout_ms);
    config.active.interrogate = cli.interrogate;
    config.active.interrogation.enabled = cli.interrogate;
    config.active.interrogation.timeout = Duration::from_millis(cli.timeout_ms);
    config.active.skip_pids = cli.skip_pid.clone();
    config.active.skip_urls = cli.skip_url.clone();

    let results = scanner.scan(&config).await;

    let rendered = report::render(format, &results)?;
    match &cli.output {
        Some(path) => tokio::fs::write(path, rendered)
            .await
            .with_context(|| format!("write {}", path.display()))?,
        None => print!("{rendered}"),
    }

    // Exit 0 when something was found, 1 otherwise.
    let found = match mode {
        ScanMode::PassiveOnly => !results.candidates().is_empty(),
        _ => !results.confirmed_servers().is_empty(),
    };
    Ok(if found {
        std::process::ExitCode::SUCCESS
    } else {
        std::process::ExitCode::from(1)
    })
}
