//! Long-running peercache node.
//!
//! Loads configuration and the persistent node id, starts the discovery
//! engine, registers this node's page cache service and keeps answering for
//! it until told to shut down.

pub mod config;
pub mod daemon;
pub mod error;
pub mod setup;

pub use config::Config;
pub use daemon::{Daemon, DaemonEvent, DaemonStatus};
pub use error::DaemonError;
