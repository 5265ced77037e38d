//! Deployment glue for the overnet overlay stack: configuration,
//! logging, UDP substrates, and the node binaries.

pub mod config;
pub mod error;
pub mod logging;
pub mod substrate;

pub use config::RouterConfig;
pub use error::NodeError;
pub use substrate::{UdpLinkSubstrate, UdpSubstrate};
