//! Proxy-to-backend handshake authentication
//!
//! Architecture:
//! - `core/`: host string codec, authenticator, generator, allow-list, relay
//! - `handler`: per-connection handshake interception
//! - `proxy`: proxy-side passphrase encoder
//! - `admin`: administrative command surface
//! - `config`: CLI arguments and YAML settings

pub mod admin;
pub mod config;
pub mod core;
pub mod error;
pub mod handler;
pub mod logger;
pub mod proxy;

pub use crate::core::{AuthenticationVerdict, Authenticator, HostCodec};
pub use error::{Result, SecuredNetworkError};
