//! Hook traits for extensibility
//!
//! Defines the seams where the host runtime plugs into the core.

use crate::error::Result;

/// Destination for relayed connection log lines.
///
/// Synchronous: implementations are called from connection handler threads
/// and must return without waiting on I/O.
pub trait RelaySink: Send + Sync {
    /// Deliver `message` to the recipient named `target`
    fn forward(&self, target: &str, message: &str) -> Result<()>;
}

/// Sink that drops every line
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RelaySink for NullSink {
    fn forward(&self, _target: &str, _message: &str) -> Result<()> {
        Ok(())
    }
}
