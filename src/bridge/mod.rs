//! Stdio bridge for embedding the search pipeline in another process.

pub mod contract;
pub mod handler;
pub mod stdio;

pub use contract::{CommandEnvelope, CommandName, PROTOCOL_VERSION, ResponseEnvelope};
pub use handler::BridgeHandler;
pub use stdio::{run_bridge, run_stdio_bridge};
