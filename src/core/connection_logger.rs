//! Single-slot connection log relay
//!
//! At most one named recipient is attached at a time. Results of every
//! authentication attempt are forwarded to it, without ever blocking or
//! failing the authentication path.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::mpsc;

use super::hooks::RelaySink;
use crate::error::{Result, SecuredNetworkError};
use crate::logger::log;

/// Relays connection results to the attached recipient
pub struct ConnectionLogger {
    target: ArcSwapOption<String>,
    sink: Arc<dyn RelaySink>,
}

impl ConnectionLogger {
    pub fn new(sink: Arc<dyn RelaySink>) -> Self {
        Self {
            target: ArcSwapOption::empty(),
            sink,
        }
    }

    /// Attach `target`, replacing any previous recipient
    pub fn attach(&self, target: impl Into<String>) {
        self.target.store(Some(Arc::new(target.into())));
    }

    /// Detach the current recipient; no-op when none is attached
    pub fn detach(&self) {
        self.target.store(None);
    }

    /// Currently attached recipient
    pub fn target(&self) -> Option<Arc<String>> {
        self.target.load_full()
    }

    pub fn is_attached(&self) -> bool {
        self.target.load().is_some()
    }

    /// Forward `message` to the attached recipient, if any.
    ///
    /// Sink failures are logged at debug level and dropped.
    pub fn notify(&self, player_id: &str, message: &str) {
        let target = self.target.load();
        let Some(target) = target.as_deref() else {
            return;
        };
        if let Err(e) = self.sink.forward(target, message) {
            log::debug!(
                target_name = %target,
                player = player_id,
                error = %e,
                "Connection log relay dropped"
            );
        }
    }
}

/// Line handed to the relay channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedLine {
    pub target: String,
    pub message: String,
}

/// Relay sink backed by a bounded channel.
///
/// Uses `try_send`, so a full or closed channel drops the line instead of
/// waiting.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<RelayedLine>,
}

impl ChannelSink {
    /// Create a sink and the receiving half of its channel
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RelayedLine>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl RelaySink for ChannelSink {
    fn forward(&self, target: &str, message: &str) -> Result<()> {
        self.tx
            .try_send(RelayedLine {
                target: target.to_string(),
                message: message.to_string(),
            })
            .map_err(|e| SecuredNetworkError::Other(format!("relay channel: {}", e)))
    }
}
