//! Handshake interception
//!
//! Runs the authenticator against the first packet of a connection, rewrites
//! the host field in place and decides whether the connection may continue.

use std::net::IpAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::{Bytes, BytesMut};

use crate::core::packet::encode_login_disconnect;
use crate::core::{
    AuthenticationVerdict, Authenticator, ConnectionLogger, DecodeResult, HandshakePacket,
    NextState,
};
use crate::logger::log;

/// Default message shown to rejected players
pub const DEFAULT_DISCONNECT_MESSAGE: &str = "§cYou must connect through the network proxy.";

/// Handler options replaced wholesale on reload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSettings {
    /// Authenticate status pings too
    pub block_pings: bool,
    /// Message sent to rejected players (colour codes already translated)
    pub disconnect_message: String,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            block_pings: false,
            disconnect_message: DEFAULT_DISCONNECT_MESSAGE.to_string(),
        }
    }
}

/// What the caller should do with the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Authenticated; continue with the rewritten packet
    Proceed,
    /// Status ping let through without authentication
    Bypassed,
    /// Rejected; close the connection after sending `message`
    Disconnect { message: String },
}

/// Result of rewriting one raw handshake frame
#[derive(Debug)]
pub struct FrameRewrite {
    pub outcome: HandshakeOutcome,
    /// Re-encoded handshake to pass downstream
    pub packet: Bytes,
    /// Disconnect packet to send back to the peer, login state only
    pub reply: Option<Bytes>,
    /// Bytes of the input consumed by the handshake frame
    pub consumed: usize,
}

/// Per-connection handshake handler, shared by all connection threads
pub struct HandshakeHandler {
    authenticator: Arc<Authenticator>,
    connection_logger: Arc<ConnectionLogger>,
    settings: ArcSwap<HandlerSettings>,
}

impl HandshakeHandler {
    pub fn new(
        authenticator: Arc<Authenticator>,
        connection_logger: Arc<ConnectionLogger>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            authenticator,
            connection_logger,
            settings: ArcSwap::from_pointee(settings),
        }
    }

    pub fn reload(&self, settings: HandlerSettings) {
        self.settings.store(Arc::new(settings));
    }

    pub fn settings(&self) -> Arc<HandlerSettings> {
        self.settings.load_full()
    }

    pub fn connection_logger(&self) -> &Arc<ConnectionLogger> {
        &self.connection_logger
    }

    /// Authenticate `packet` and overwrite its host.
    ///
    /// On rejection the host is replaced with an empty string, so a caller
    /// that ignores the outcome cannot continue with a usable handshake.
    pub fn handle(&self, packet: &mut HandshakePacket, peer: IpAddr) -> HandshakeOutcome {
        let settings = self.settings.load();

        if packet.next_state == NextState::Status && !settings.block_pings {
            packet.host = self.authenticator.codec().sanitize(&packet.host);
            log::debug!(peer = %peer, "Status ping bypassed authentication");
            return HandshakeOutcome::Bypassed;
        }

        let verdict = self.authenticator.authenticate(&packet.host, peer);
        log::connection_result(&peer, &verdict);
        self.connection_logger
            .notify(&verdict.player_id, &result_line(&verdict));

        if verdict.passed {
            packet.host = verdict.rewritten_host;
            HandshakeOutcome::Proceed
        } else {
            packet.host = String::new();
            HandshakeOutcome::Disconnect {
                message: settings.disconnect_message.clone(),
            }
        }
    }

    /// Decode a raw handshake frame, handle it and re-encode the result.
    pub fn rewrite_frame(&self, buf: &[u8], peer: IpAddr) -> DecodeResult<FrameRewrite> {
        let max_host_length = self.authenticator.codec().max_length();
        let (mut packet, consumed) = match HandshakePacket::decode(buf, max_host_length) {
            DecodeResult::Ok(packet, n) => (packet, n),
            DecodeResult::NeedMoreData => return DecodeResult::NeedMoreData,
            DecodeResult::Invalid(e) => {
                log::debug!(peer = %peer, error = e, "Invalid handshake frame");
                return DecodeResult::Invalid(e);
            }
        };

        let outcome = self.handle(&mut packet, peer);

        let mut out = BytesMut::with_capacity(packet.host.len() + 16);
        packet.encode(&mut out);

        let reply = match (&outcome, packet.next_state) {
            (HandshakeOutcome::Disconnect { message }, NextState::Login | NextState::Transfer) => {
                let mut reply = BytesMut::new();
                encode_login_disconnect(message, &mut reply);
                Some(reply.freeze())
            }
            _ => None,
        };

        DecodeResult::Ok(
            FrameRewrite {
                outcome,
                packet: out.freeze(),
                reply,
                consumed,
            },
            consumed,
        )
    }
}

/// Relay line for one verdict: `uuid=<id> result=accepted|rejected [cause=<cause>]`
pub fn result_line(verdict: &AuthenticationVerdict) -> String {
    match verdict.cause {
        None => format!("uuid={} result=accepted", verdict.player_id),
        Some(cause) => format!(
            "uuid={} result=rejected cause={}",
            verdict.player_id,
            cause.as_str()
        ),
    }
}
