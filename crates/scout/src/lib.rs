#![forbid(unsafe_code)]

//! `mcp-scout` discovers and verifies MCP servers on the local host.
//!
//! The pipeline is one-shot and linear: four discovery sources (config
//! files, processes, network listeners, containers) emit candidates with
//! evidence; a rulepack engine boosts, caps, tags, or vetoes them; the
//! merger unions evidence across sources; and an optional active phase
//! confirms survivors by speaking the MCP `initialize` handshake over
//! spawned-child stdio or HTTP/SSE, then interrogating confirmed servers
//! for tools, resources, resource templates, and prompts.
//!
//! ```no_run
//! use mcp_scout::{ScanConfig, Scanner, platform};
//!
//! # async fn run() {
//! let scanner = Scanner::new(platform::default_platform()).with_default_rulepacks();
//! let results = scanner.scan(&ScanConfig::default()).await;
//! for candidate in results.candidates() {
//!     println!("{:.0}% {}", candidate.confidence_score * 100.0, candidate.command);
//! }
//! # }
//! ```

pub mod candidate;
pub mod config;
pub mod detect;
pub mod evidence;
pub mod interrogate;
pub mod platform;
pub mod probe;
pub mod report;
pub mod rulepack;
pub mod scan;
pub mod server;

pub use candidate::{Candidate, Transport};
pub use config::{
    ActiveScanConfig, ActiveScanResults, InterrogationConfig, PassiveScanConfig,
    PassiveScanResults, ScanConfig, ScanMode, ScanResults,
};
pub use evidence::{Evidence, Strength};
pub use rulepack::{Rule, RuleAction, RuleEngine, RuleMatch, Rulepack};
pub use scan::Scanner;
pub use server::McpServer;
