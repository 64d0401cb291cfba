//! Source address allow-list.
//!
//! Entries are exact addresses or CIDR blocks. An empty list means the
//! feature is disabled and every address is allowed; it never means
//! "nobody allowed".

use std::net::IpAddr;
use std::str::FromStr;

use cidr::IpCidr;

use crate::error::{Result, SecuredNetworkError};

/// Allow-list gating which peers may reach authentication.
///
/// The list itself is an immutable value; the authenticator publishes it
/// together with the passphrase as one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpAccessList {
    entries: Vec<IpCidr>,
}

impl IpAccessList {
    /// Create a disabled (empty) allow-list
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allow-list from address patterns
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            entries: parse_entries(entries)?,
        })
    }

    /// Replace the whole set.
    ///
    /// All entries are parsed before anything is replaced; on error the
    /// previous set stays in place.
    pub fn reload<I, S>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.entries = parse_entries(entries)?;
        Ok(())
    }

    /// Whether `addr` may proceed to authentication
    pub fn contains(&self, addr: IpAddr) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        let addr = canonical(addr);
        self.entries.iter().any(|cidr| cidr.contains(&addr))
    }

    pub fn is_enabled(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse address patterns (`203.0.113.7`, `10.0.0.0/8`, `2001:db8::/32`)
fn parse_entries<I, S>(entries: I) -> Result<Vec<IpCidr>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .map(|entry| parse_entry(entry.as_ref()))
        .collect()
}

fn parse_entry(entry: &str) -> Result<IpCidr> {
    let entry = entry.trim();
    let invalid = || SecuredNetworkError::Config(format!("invalid IP whitelist entry: {}", entry));

    if entry.contains('/') {
        return IpCidr::from_str(entry).map_err(|_| invalid());
    }
    let addr = IpAddr::from_str(entry).map_err(|_| invalid())?;
    Ok(IpCidr::new_host(canonical(addr)))
}

/// IPv4-mapped IPv6 peers are matched as IPv4
fn canonical(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}
