//! Handshake authentication core
//!
//! This module contains the security-critical pieces:
//! - Host string codec (passphrase slot, forwarding segments)
//! - Authenticator with atomically swapped snapshots
//! - Passphrase generator
//! - Source address allow-list
//! - Single-slot connection log relay
//! - Handshake packet wire format

pub mod authenticator;
pub mod connection_logger;
pub mod generator;
pub mod hooks;
pub mod host;
pub mod ip_filter;
pub mod packet;

pub use authenticator::{
    AuthConfig, AuthenticationVerdict, Authenticator, Diagnostics, FailureCause,
    PassphraseState, PassphraseStatus, UNKNOWN_PLAYER,
};
pub use connection_logger::{ChannelSink, ConnectionLogger, RelayedLine};
pub use hooks::{NullSink, RelaySink};
pub use host::{ForwardedProperty, ForwardingInfo, HandshakeHost, HostCodec};
pub use ip_filter::IpAccessList;
pub use packet::{DecodeResult, HandshakePacket, NextState};
