//! Ping execution and latency parsing.

pub mod address;
pub mod parser;
pub mod runner;

pub use address::{probe_host, AddressError};
pub use parser::{parse_latency, ParseError};
pub use runner::{ping_args, run_ping, PingSettings, ProbeRunner, SystemPingRunner};
