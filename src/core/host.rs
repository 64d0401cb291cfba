//! Handshake host-string codec
//!
//! The host field of the first handshake packet is overloaded by the proxy:
//! - `[0]` virtual host address
//! - `[1..n-2]` forwarded extension segments (client IP, player UUID, properties JSON)
//! - `[n-1]` passphrase slot, appended by the proxy before the packet leaves it
//!
//! Segments are joined by a single separator character (NUL unless configured
//! otherwise). Only the trailing slot is owned by this codec; every other
//! segment is passed through untouched. When the forwarding layout
//! `[address, client-ip, uuid, properties?]` is present, the slot can only
//! follow it, so an unlocked proxy that appends nothing never loses a
//! forwarded segment.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SecuredNetworkError};

/// Separator used by the proxy when joining host segments
pub const DEFAULT_SEPARATOR: char = '\0';

/// Upper bound on the host string, in characters (protocol string limit)
pub const DEFAULT_MAX_HOST_LENGTH: usize = 32767;

/// Parsed handshake host: ordered segments, address first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeHost {
    segments: Vec<String>,
}

impl HandshakeHost {
    /// Host consisting of the virtual host address only
    pub fn new(address: impl Into<String>) -> Result<Self> {
        Self::from_segments(vec![address.into()])
    }

    /// Build a host from raw segments. The first segment is the address and
    /// must be present and non-empty.
    pub fn from_segments(segments: Vec<String>) -> Result<Self> {
        match segments.first() {
            Some(address) if !address.is_empty() => Ok(Self { segments }),
            _ => Err(SecuredNetworkError::MalformedHandshake(
                "missing virtual host address".to_string(),
            )),
        }
    }

    /// Virtual host address
    pub fn address(&self) -> &str {
        &self.segments[0]
    }

    /// All segments in wire order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Segments following the address
    pub fn extensions(&self) -> &[String] {
        &self.segments[1..]
    }

    /// Append an extension segment
    pub fn push(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }

    /// Forwarding data injected by the proxy, if the layout matches
    /// `[address, client-ip, uuid, properties?]`.
    pub fn forwarding(&self) -> Option<ForwardingInfo> {
        let (client_ip, player_id) = self.forwarding_head()?;
        let properties = self
            .segments
            .get(3)
            .and_then(|raw| parse_properties(raw))
            .unwrap_or_default();

        Some(ForwardingInfo {
            client_ip,
            player_id,
            properties,
        })
    }

    /// Player UUID (hyphenated) carried by the forwarding segments
    pub fn player_id(&self) -> Option<String> {
        self.forwarding()
            .map(|info| info.player_id.hyphenated().to_string())
    }

    /// Number of leading segments taken by the address and the forwarding
    /// layout. The passphrase slot can only come after them.
    pub fn forwarded_len(&self) -> usize {
        if self.forwarding_head().is_none() {
            return 1;
        }
        match self.segments.get(3) {
            Some(raw) if parse_properties(raw).is_some() => 4,
            _ => 3,
        }
    }

    fn forwarding_head(&self) -> Option<(IpAddr, Uuid)> {
        let client_ip = self.segments.get(1)?.parse::<IpAddr>().ok()?;
        let player_id = Uuid::parse_str(self.segments.get(2)?).ok()?;
        Some((client_ip, player_id))
    }
}

fn parse_properties(raw: &str) -> Option<Vec<ForwardedProperty>> {
    serde_json::from_str(raw).ok()
}

/// Forwarded connection data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingInfo {
    /// Address of the player as seen by the proxy
    pub client_ip: IpAddr,
    /// Player unique id
    pub player_id: Uuid,
    /// Profile properties (skin textures and the like)
    pub properties: Vec<ForwardedProperty>,
}

/// Single profile property from the forwarded JSON array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardedProperty {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Splits, joins and rewrites handshake host strings.
///
/// Both the proxy-side encoder and the backend-side decoder must be built with
/// the same separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCodec {
    separator: char,
    max_length: usize,
}

impl Default for HostCodec {
    fn default() -> Self {
        Self::new(DEFAULT_SEPARATOR, DEFAULT_MAX_HOST_LENGTH)
    }
}

impl HostCodec {
    pub fn new(separator: char, max_length: usize) -> Self {
        Self {
            separator,
            max_length,
        }
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Split a raw host string into segments.
    ///
    /// Fails on an empty string, an empty address segment or a string longer
    /// than the configured limit.
    pub fn parse(&self, raw: &str) -> Result<HandshakeHost> {
        if raw.is_empty() {
            return Err(SecuredNetworkError::MalformedHandshake(
                "empty host string".to_string(),
            ));
        }
        if raw.chars().count() > self.max_length {
            return Err(SecuredNetworkError::MalformedHandshake(format!(
                "host string exceeds {} characters",
                self.max_length
            )));
        }

        HandshakeHost::from_segments(raw.split(self.separator).map(str::to_string).collect())
    }

    /// Remove the trailing passphrase slot.
    ///
    /// The slot is the last segment, recognised only when it is non-empty and
    /// comes after the address and any forwarding segments
    /// ([`HandshakeHost::forwarded_len`]). Everything else is returned as-is,
    /// in order.
    pub fn extract_passphrase(&self, mut host: HandshakeHost) -> (HandshakeHost, Option<String>) {
        let has_slot = host.segments.len() > host.forwarded_len()
            && host.segments.last().is_some_and(|last| !last.is_empty());
        if !has_slot {
            return (host, None);
        }
        let passphrase = host.segments.pop();
        (host, passphrase)
    }

    /// Re-join segments with the separator
    pub fn join(&self, host: &HandshakeHost) -> String {
        let mut buf = [0u8; 4];
        let separator: &str = self.separator.encode_utf8(&mut buf);
        host.segments.join(separator)
    }

    /// Check that `passphrase` can be carried in the trailing slot.
    ///
    /// It must not contain the separator, and must not start with `[` where
    /// it would read as a forwarded properties segment.
    pub fn validate_passphrase(&self, passphrase: &str) -> Result<()> {
        if passphrase.contains(self.separator) {
            return Err(SecuredNetworkError::Config(
                "passphrase must not contain the host separator".to_string(),
            ));
        }
        if passphrase.trim_start().starts_with('[') {
            return Err(SecuredNetworkError::Config(
                "passphrase must not start with '['".to_string(),
            ));
        }
        Ok(())
    }

    /// Join the host and append the passphrase as the trailing slot.
    ///
    /// An empty passphrase appends nothing.
    pub fn encode(&self, host: &HandshakeHost, passphrase: &str) -> String {
        let mut encoded = self.join(host);
        if !passphrase.is_empty() {
            encoded.push(self.separator);
            encoded.push_str(passphrase);
        }
        encoded
    }

    /// Parse and strip the passphrase slot in one step.
    ///
    /// Malformed input collapses to an empty string so that nothing from it
    /// reaches later handlers.
    pub fn sanitize(&self, raw: &str) -> String {
        match self.parse(raw) {
            Ok(host) => {
                let (host, _) = self.extract_passphrase(host);
                self.join(&host)
            }
            Err(_) => String::new(),
        }
    }
}
