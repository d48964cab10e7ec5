//! Passive discovery sources.
//!
//! Exactly four sources feed the pipeline: declared config files, running
//! processes, network listeners, and containers. Each emits raw candidates
//! carrying at least one piece of evidence and never reads another source's
//! output; scoring policy beyond the fixed baseline confidences lives in
//! rulepacks.

use crate::candidate::Candidate;

mod config_source;
mod container_source;
mod network_source;
mod process_source;

pub use config_source::{ConfigSource, DEFAULT_CONFIG_PATHS};
pub use container_source::ContainerSource;
pub use network_source::NetworkSource;
pub use process_source::{KNOWN_CLIENT_NAMES, ProcessSource};

/// What one source produced in one pass.
#[derive(Debug, Default)]
pub struct SourceScan {
    pub candidates: Vec<Candidate>,
    /// Items inspected (config files, processes, sockets, containers),
    /// whether or not they yielded a candidate.
    pub items_checked: usize,
}
