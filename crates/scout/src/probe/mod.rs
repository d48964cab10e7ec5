//! Active verification: protocol discrimination plus the two transport
//! probes that speak the MCP `initialize` handshake.

mod http;
mod protocol;
mod stdio;

pub use http::HttpProbe;
pub use protocol::{ProtocolDetector, ProtocolSignature, ProtocolType};
pub use stdio::{StdioProbe, split_command};
