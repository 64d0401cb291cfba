//! Proxy-side encoder
//!
//! Appends the shared passphrase to every outgoing handshake host before the
//! packet leaves the proxy.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::core::{AuthConfig, HandshakeHost, HandshakePacket, HostCodec, PassphraseState};
use crate::error::Result;

struct ForwardSnapshot {
    codec: HostCodec,
    passphrase: PassphraseState,
}

/// Encodes outgoing host strings with the configured passphrase
pub struct ProxyForwarder {
    state: ArcSwap<ForwardSnapshot>,
}

impl ProxyForwarder {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let forwarder = Self {
            state: ArcSwap::from_pointee(ForwardSnapshot {
                codec: config.codec,
                passphrase: PassphraseState::unlocked(),
            }),
        };
        forwarder.reload(config)?;
        Ok(forwarder)
    }

    pub fn reload(&self, config: &AuthConfig) -> Result<()> {
        config.codec.validate_passphrase(&config.passphrase)?;
        self.state.store(Arc::new(ForwardSnapshot {
            codec: config.codec,
            passphrase: PassphraseState::custom(config.passphrase.clone()),
        }));
        Ok(())
    }

    /// Encode `host` with the passphrase as trailing slot
    pub fn encode(&self, host: &HandshakeHost) -> String {
        let state = self.state.load();
        state.codec.encode(host, state.passphrase.expose())
    }

    /// Parse a host string produced by the proxy runtime and append the passphrase
    pub fn rewrite(&self, raw_host: &str) -> Result<String> {
        let state = self.state.load();
        let host = state.codec.parse(raw_host)?;
        Ok(state.codec.encode(&host, state.passphrase.expose()))
    }

    /// Rewrite the host field of an outgoing handshake packet
    pub fn rewrite_packet(&self, packet: &mut HandshakePacket) -> Result<()> {
        packet.host = self.rewrite(&packet.host)?;
        Ok(())
    }
}
