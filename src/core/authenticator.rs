//! Handshake authentication
//!
//! The authenticator holds an immutable snapshot of the current passphrase,
//! host codec and allow-list behind an `ArcSwap`. `authenticate` only ever reads a snapshot,
//! so it can be called from any number of connection handler threads while an
//! administrative `reload` installs a new one.
//!
//! Two effective states:
//! - UNLOCKED: no passphrase configured, every well-formed handshake passes
//! - ENFORCING: the trailing host segment must match the passphrase

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use sha2::{Digest, Sha224};
use subtle::ConstantTimeEq;

use super::host::HostCodec;
use super::ip_filter::IpAccessList;
use crate::error::{Result, SecuredNetworkError};

/// Player id reported when the handshake carries no forwarding data
pub const UNKNOWN_PLAYER: &str = "unknown";

/// Where the current passphrase came from (diagnostics only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PassphraseStatus {
    /// Nothing configured
    Default,
    /// Loaded from configuration
    Custom,
    /// Produced by `generate`
    Generated,
}

impl fmt::Display for PassphraseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassphraseStatus::Default => write!(f, "DEFAULT"),
            PassphraseStatus::Custom => write!(f, "CUSTOM"),
            PassphraseStatus::Generated => write!(f, "GENERATED"),
        }
    }
}

/// Current passphrase value and its digest
pub struct PassphraseState {
    value: String,
    digest: [u8; 28],
    status: PassphraseStatus,
}

impl PassphraseState {
    /// No passphrase: authentication is not enforced
    pub fn unlocked() -> Self {
        Self::with_status(String::new(), PassphraseStatus::Default)
    }

    /// Passphrase from configuration; an empty value is the same as `unlocked`
    pub fn custom(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            return Self::unlocked();
        }
        Self::with_status(value, PassphraseStatus::Custom)
    }

    pub fn generated(value: impl Into<String>) -> Self {
        Self::with_status(value.into(), PassphraseStatus::Generated)
    }

    fn with_status(value: String, status: PassphraseStatus) -> Self {
        let digest = hash_passphrase(&value);
        Self {
            value,
            digest,
            status,
        }
    }

    pub fn status(&self) -> PassphraseStatus {
        self.status
    }

    pub fn is_enforcing(&self) -> bool {
        !self.value.is_empty()
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.value.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Raw passphrase, for the proxy-side encoder and persistence only
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Short SHA-224 fingerprint, safe to print
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.digest[..4])
    }

    /// Check a presented passphrase.
    ///
    /// Both sides are hashed first so the comparison runs over equal-length
    /// digests and never short-circuits.
    pub fn verify(&self, presented: Option<&str>) -> Result<()> {
        if !self.is_enforcing() {
            return Ok(());
        }
        let presented = presented.ok_or(SecuredNetworkError::PassphraseMismatch)?;
        let digest = hash_passphrase(presented);
        if bool::from(self.digest[..].ct_eq(&digest[..])) {
            Ok(())
        } else {
            Err(SecuredNetworkError::PassphraseMismatch)
        }
    }
}

impl fmt::Debug for PassphraseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassphraseState")
            .field("status", &self.status)
            .field("length", &self.len())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

fn hash_passphrase(passphrase: &str) -> [u8; 28] {
    let mut hasher = Sha224::new();
    hasher.update(passphrase.as_bytes());
    let result = hasher.finalize();
    let mut hash = [0u8; 28];
    hash.copy_from_slice(&result);
    hash
}

/// Reason an authentication attempt failed, used as the logged cause code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    MalformedHandshake,
    IpNotWhitelisted,
    FailedAuthentication,
}

impl FailureCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCause::MalformedHandshake => "malformed_handshake",
            FailureCause::IpNotWhitelisted => "ip_not_whitelisted",
            FailureCause::FailedAuthentication => "failed_authentication",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&SecuredNetworkError> for FailureCause {
    fn from(err: &SecuredNetworkError) -> Self {
        match err {
            SecuredNetworkError::MalformedHandshake(_) => FailureCause::MalformedHandshake,
            SecuredNetworkError::IpNotWhitelisted(_) => FailureCause::IpNotWhitelisted,
            _ => FailureCause::FailedAuthentication,
        }
    }
}

/// Outcome of one authentication attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticationVerdict {
    pub passed: bool,
    /// Player UUID from the forwarding segments, or [`UNKNOWN_PLAYER`]
    pub player_id: String,
    /// Host string with the passphrase slot removed; always safe to write back
    pub rewritten_host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<FailureCause>,
}

impl AuthenticationVerdict {
    fn accepted(player_id: String, rewritten_host: String) -> Self {
        Self {
            passed: true,
            player_id,
            rewritten_host,
            cause: None,
        }
    }

    fn rejected(player_id: String, rewritten_host: String, cause: FailureCause) -> Self {
        Self {
            passed: false,
            player_id,
            rewritten_host,
            cause: Some(cause),
        }
    }
}

/// Values installed by `reload`
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub passphrase: String,
    pub codec: HostCodec,
    pub ip_list: IpAccessList,
}

impl AuthConfig {
    pub fn new(passphrase: impl Into<String>, codec: HostCodec) -> Self {
        Self {
            passphrase: passphrase.into(),
            codec,
            ip_list: IpAccessList::new(),
        }
    }

    pub fn with_ip_list(mut self, ip_list: IpAccessList) -> Self {
        self.ip_list = ip_list;
        self
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("passphrase", &"<redacted>")
            .field("codec", &self.codec)
            .field("ip_list", &self.ip_list)
            .finish()
    }
}

/// Everything `authenticate` reads, published as one unit
struct Snapshot {
    codec: HostCodec,
    passphrase: Arc<PassphraseState>,
    ip_list: Arc<IpAccessList>,
}

/// Operator-visible state; never includes the passphrase itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub status: PassphraseStatus,
    pub enforcing: bool,
    pub length: usize,
    pub fingerprint: String,
    pub whitelist_entries: usize,
}

/// Backend-side handshake authenticator
pub struct Authenticator {
    state: ArcSwap<Snapshot>,
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl Authenticator {
    /// Create an authenticator in the UNLOCKED state with no allow-list
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(Snapshot {
                codec: HostCodec::default(),
                passphrase: Arc::new(PassphraseState::unlocked()),
                ip_list: Arc::new(IpAccessList::new()),
            }),
        }
    }

    /// Create an authenticator and install `config`
    pub fn with_config(config: &AuthConfig) -> Result<Self> {
        let authenticator = Self::new();
        authenticator.reload(config)?;
        Ok(authenticator)
    }

    /// Install passphrase, codec and allow-list with a single swap.
    ///
    /// Nothing changes when the passphrase cannot be carried by the codec.
    pub fn reload(&self, config: &AuthConfig) -> Result<()> {
        config.codec.validate_passphrase(&config.passphrase)?;
        self.state.store(Arc::new(Snapshot {
            codec: config.codec,
            passphrase: Arc::new(PassphraseState::custom(config.passphrase.clone())),
            ip_list: Arc::new(config.ip_list.clone()),
        }));
        Ok(())
    }

    /// Replace only the allow-list
    pub fn reload_ip_list(&self, ip_list: IpAccessList) {
        let ip_list = Arc::new(ip_list);
        self.state.rcu(|current| Snapshot {
            codec: current.codec,
            passphrase: Arc::clone(&current.passphrase),
            ip_list: Arc::clone(&ip_list),
        });
    }

    /// Install a generated passphrase, keeping codec and allow-list.
    ///
    /// Callers persist the value first so a failed write never leaves an
    /// installed passphrase that exists nowhere else.
    pub fn install_generated(&self, passphrase: &str) -> Result<()> {
        self.codec().validate_passphrase(passphrase)?;
        let passphrase = Arc::new(PassphraseState::generated(passphrase));
        self.state.rcu(|current| Snapshot {
            codec: current.codec,
            passphrase: Arc::clone(&passphrase),
            ip_list: Arc::clone(&current.ip_list),
        });
        Ok(())
    }

    pub fn ip_list(&self) -> Arc<IpAccessList> {
        Arc::clone(&self.state.load().ip_list)
    }

    pub fn codec(&self) -> HostCodec {
        self.state.load().codec
    }

    /// Current raw passphrase (empty when unlocked)
    pub fn current_passphrase(&self) -> String {
        self.state.load().passphrase.expose().to_string()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let snapshot = self.state.load();
        Diagnostics {
            status: snapshot.passphrase.status(),
            enforcing: snapshot.passphrase.is_enforcing(),
            length: snapshot.passphrase.len(),
            fingerprint: snapshot.passphrase.fingerprint(),
            whitelist_entries: snapshot.ip_list.len(),
        }
    }

    /// Authenticate a raw handshake host string received from `peer`.
    ///
    /// Never fails: every error becomes a rejected verdict. The rewritten host
    /// has the passphrase slot removed on both paths, and is empty when the
    /// input could not be parsed.
    pub fn authenticate(&self, raw_host: &str, peer: IpAddr) -> AuthenticationVerdict {
        let snapshot = self.state.load();
        let codec = snapshot.codec;

        let ip_allowed = snapshot.ip_list.contains(peer);

        let host = match codec.parse(raw_host) {
            Ok(host) => host,
            Err(e) => {
                let cause = if ip_allowed {
                    FailureCause::from(&e)
                } else {
                    FailureCause::IpNotWhitelisted
                };
                return AuthenticationVerdict::rejected(
                    UNKNOWN_PLAYER.to_string(),
                    String::new(),
                    cause,
                );
            }
        };

        let (host, presented) = codec.extract_passphrase(host);
        let player_id = host
            .player_id()
            .unwrap_or_else(|| UNKNOWN_PLAYER.to_string());
        let rewritten_host = codec.join(&host);

        let outcome = if ip_allowed {
            snapshot.passphrase.verify(presented.as_deref())
        } else {
            Err(SecuredNetworkError::IpNotWhitelisted(peer.to_string()))
        };

        match outcome {
            Ok(()) => AuthenticationVerdict::accepted(player_id, rewritten_host),
            Err(e) => {
                AuthenticationVerdict::rejected(player_id, rewritten_host, FailureCause::from(&e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::host::HandshakeHost;

    fn peer() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    fn enforcing(passphrase: &str) -> Authenticator {
        Authenticator::with_config(&AuthConfig::new(passphrase, HostCodec::default())).unwrap()
    }

    #[test]
    fn test_matching_passphrase_passes_and_is_stripped() {
        let auth = enforcing("abc123");
        let verdict = auth.authenticate("play.example.com\0abc123", peer());
        assert!(verdict.passed);
        assert_eq!(verdict.rewritten_host, "play.example.com");
        assert_eq!(verdict.player_id, UNKNOWN_PLAYER);
        assert!(verdict.cause.is_none());
    }

    #[test]
    fn test_mismatch_fails_but_still_strips() {
        let auth = enforcing("xyz999");
        let verdict = auth.authenticate("play.example.com\0abc123", peer());
        assert!(!verdict.passed);
        assert_eq!(verdict.rewritten_host, "play.example.com");
        assert_eq!(verdict.cause, Some(FailureCause::FailedAuthentication));
    }

    #[test]
    fn test_missing_passphrase_fails() {
        let auth = enforcing("abc123");
        let verdict = auth.authenticate("play.example.com", peer());
        assert!(!verdict.passed);
        assert_eq!(verdict.rewritten_host, "play.example.com");
    }

    #[test]
    fn test_prefix_of_passphrase_fails() {
        let auth = enforcing("abc123");
        assert!(!auth.authenticate("play.example.com\0abc12", peer()).passed);
        assert!(!auth.authenticate("play.example.com\0abc1234", peer()).passed);
    }

    #[test]
    fn test_unlocked_passes_and_strips() {
        let auth = Authenticator::new();
        let verdict = auth.authenticate("play.example.com\0leftover", peer());
        assert!(verdict.passed);
        assert_eq!(verdict.rewritten_host, "play.example.com");

        let verdict = auth.authenticate("play.example.com", peer());
        assert!(verdict.passed);
    }

    #[test]
    fn test_malformed_fails_closed_even_when_unlocked() {
        let auth = Authenticator::new();
        let verdict = auth.authenticate("", peer());
        assert!(!verdict.passed);
        assert_eq!(verdict.cause, Some(FailureCause::MalformedHandshake));
        assert_eq!(verdict.rewritten_host, "");
        assert_eq!(verdict.player_id, UNKNOWN_PLAYER);
    }

    #[test]
    fn test_ip_not_whitelisted() {
        let list = IpAccessList::from_entries(["10.0.0.0/8"]).unwrap();
        let auth = Authenticator::with_config(
            &AuthConfig::new("abc123", HostCodec::default()).with_ip_list(list),
        )
        .unwrap();

        let verdict = auth.authenticate("play.example.com\0abc123", peer());
        assert!(!verdict.passed);
        assert_eq!(verdict.cause, Some(FailureCause::IpNotWhitelisted));
        assert_eq!(verdict.rewritten_host, "play.example.com");

        let verdict = auth.authenticate("play.example.com\0abc123", "10.2.3.4".parse().unwrap());
        assert!(verdict.passed);
    }

    #[test]
    fn test_player_id_from_forwarding() {
        let auth = enforcing("abc123");
        let codec = HostCodec::default();
        let mut host = HandshakeHost::new("play.example.com").unwrap();
        host.push("203.0.113.7");
        host.push("069a79f444e94726a5befca90e38aaf5");
        host.push("[]");

        let verdict = auth.authenticate(&codec.encode(&host, "abc123"), peer());
        assert!(verdict.passed);
        assert_eq!(verdict.player_id, "069a79f4-44e9-4726-a5be-fca90e38aaf5");
        assert_eq!(verdict.rewritten_host, codec.join(&host));
    }

    #[test]
    fn test_reload_switches_state() {
        let auth = Authenticator::new();
        assert!(!auth.diagnostics().enforcing);

        auth.reload(&AuthConfig::new("abc123", HostCodec::default()))
            .unwrap();
        let diagnostics = auth.diagnostics();
        assert!(diagnostics.enforcing);
        assert_eq!(diagnostics.status, PassphraseStatus::Custom);
        assert_eq!(diagnostics.length, 6);

        auth.reload(&AuthConfig::default()).unwrap();
        assert_eq!(auth.diagnostics().status, PassphraseStatus::Default);
    }

    #[test]
    fn test_reload_rejects_separator_in_passphrase() {
        let auth = enforcing("abc123");
        assert!(auth
            .reload(&AuthConfig::new("ab\0c", HostCodec::default()))
            .is_err());
        assert!(auth.authenticate("play.example.com\0abc123", peer()).passed);
    }

    #[test]
    fn test_unlocked_keeps_forwarded_segments() {
        let auth = Authenticator::new();
        let codec = HostCodec::default();
        let mut host = HandshakeHost::new("play.example.com").unwrap();
        host.push("203.0.113.7");
        host.push("069a79f444e94726a5befca90e38aaf5");

        let verdict = auth.authenticate(&codec.join(&host), peer());
        assert!(verdict.passed);
        assert_eq!(verdict.rewritten_host, codec.join(&host));
        assert_eq!(verdict.player_id, "069a79f4-44e9-4726-a5be-fca90e38aaf5");

        host.push(r#"[{"name":"textures","value":"e30="}]"#);
        let verdict = auth.authenticate(&codec.join(&host), peer());
        assert!(verdict.passed);
        assert_eq!(verdict.rewritten_host, codec.join(&host));
    }

    #[test]
    fn test_enforcing_strips_slot_after_forwarding_without_properties() {
        let auth = enforcing("abc123");
        let codec = HostCodec::default();
        let mut host = HandshakeHost::new("play.example.com").unwrap();
        host.push("203.0.113.7");
        host.push("069a79f444e94726a5befca90e38aaf5");

        let verdict = auth.authenticate(&codec.encode(&host, "abc123"), peer());
        assert!(verdict.passed);
        assert_eq!(verdict.rewritten_host, codec.join(&host));

        let verdict = auth.authenticate(&codec.join(&host), peer());
        assert!(!verdict.passed);
        assert_eq!(verdict.rewritten_host, codec.join(&host));
    }

    #[test]
    fn test_install_generated_keeps_allow_list() {
        let list = IpAccessList::from_entries(["127.0.0.1"]).unwrap();
        let auth = Authenticator::with_config(
            &AuthConfig::new("abc123", HostCodec::default()).with_ip_list(list),
        )
        .unwrap();

        auth.install_generated("Generated42").unwrap();
        assert_eq!(auth.diagnostics().status, PassphraseStatus::Generated);
        assert_eq!(auth.diagnostics().whitelist_entries, 1);
        assert!(auth.authenticate("play.example.com\0Generated42", peer()).passed);
        assert!(!auth.authenticate("play.example.com\0abc123", peer()).passed);
    }

    #[test]
    fn test_install_generated_rejects_separator() {
        let auth = enforcing("abc123");
        assert!(auth.install_generated("ab\0c").is_err());
        assert_eq!(auth.diagnostics().status, PassphraseStatus::Custom);
        assert!(auth.authenticate("play.example.com\0abc123", peer()).passed);
    }

    #[test]
    fn test_reload_ip_list_keeps_passphrase() {
        let auth = enforcing("abc123");
        auth.reload_ip_list(IpAccessList::from_entries(["10.0.0.0/8"]).unwrap());
        assert_eq!(auth.ip_list().len(), 1);
        assert_eq!(auth.diagnostics().status, PassphraseStatus::Custom);
        assert!(!auth.authenticate("play.example.com\0abc123", peer()).passed);
        assert!(auth
            .authenticate("play.example.com\0abc123", "10.0.0.9".parse().unwrap())
            .passed);
    }

    #[test]
    fn test_reload_swaps_passphrase_and_allow_list_together() {
        let config_a = AuthConfig::new("aaaa", HostCodec::default())
            .with_ip_list(IpAccessList::from_entries(["10.0.0.0/8"]).unwrap());
        let config_b = AuthConfig::new("bbbb", HostCodec::default())
            .with_ip_list(IpAccessList::from_entries(["192.168.0.0/16"]).unwrap());
        let auth = Arc::new(Authenticator::with_config(&config_a).unwrap());
        let client: IpAddr = "10.1.1.1".parse().unwrap();

        // With A the client passes, with B it is not on the list. Only a mixed
        // snapshot could reach the passphrase check and fail there.
        let mut handles = Vec::new();
        for _ in 0..4 {
            let auth = Arc::clone(&auth);
            handles.push(std::thread::spawn(move || {
                for _ in 0..500 {
                    let verdict = auth.authenticate("play.example.com\0aaaa", client);
                    assert_ne!(verdict.cause, Some(FailureCause::FailedAuthentication));
                }
            }));
        }
        for i in 0..100 {
            let config = if i % 2 == 0 { &config_b } else { &config_a };
            auth.reload(config).unwrap();
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_debug_does_not_reveal_passphrase() {
        let state = PassphraseState::custom("topsecretvalue");
        let debug = format!("{:?}", state);
        assert!(!debug.contains("topsecretvalue"));
        assert!(debug.contains("fingerprint"));
    }

    #[test]
    fn test_fingerprint_stable_and_short() {
        let a = PassphraseState::custom("abc123");
        let b = PassphraseState::generated("abc123");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 8);
        assert_ne!(a.fingerprint(), PassphraseState::custom("abc124").fingerprint());
    }

    #[test]
    fn test_concurrent_authenticate_during_reload() {
        let auth = Arc::new(enforcing("aaaa"));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let auth = Arc::clone(&auth);
            handles.push(std::thread::spawn(move || {
                for _ in 0..500 {
                    let verdict = auth.authenticate("play.example.com\0aaaa", peer());
                    assert_eq!(verdict.rewritten_host, "play.example.com");
                }
            }));
        }
        for i in 0..50 {
            let passphrase = if i % 2 == 0 { "bbbb" } else { "aaaa" };
            auth.reload(&AuthConfig::new(passphrase, HostCodec::default()))
                .unwrap();
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
