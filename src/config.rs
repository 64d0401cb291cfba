//! Configuration module
//!
//! This module handles CLI argument parsing with environment variable support
//! and the YAML settings file holding the passphrase, allow-list and operator
//! messages. It is the only place that touches the filesystem.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::core::host::{DEFAULT_MAX_HOST_LENGTH, DEFAULT_SEPARATOR};
use crate::core::{AuthConfig, HostCodec, IpAccessList};
use crate::handler::{HandlerSettings, DEFAULT_DISCONNECT_MESSAGE};
use crate::logger::LogLevel;

/// Default settings file
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// CLI arguments
///
/// Supports environment variables with SECURED_NETWORK_ prefix
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Handshake passphrase authentication for proxied game servers"
)]
#[command(rename_all = "snake_case")]
pub struct CliArgs {
    /// Settings file (.yml/.yaml); created with defaults when missing
    #[arg(
        short = 'c',
        long = "config",
        env = "SECURED_NETWORK_CONFIG",
        default_value = DEFAULT_CONFIG_FILE
    )]
    pub config: PathBuf,

    /// Log level: trace, debug, info, warn, error (default: info)
    #[arg(long = "log_level", env = "SECURED_NETWORK_LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

/// Binary subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
#[command(rename_all = "kebab-case")]
pub enum Command {
    /// Read administrative commands from stdin and relay connection results
    Console,
    /// Authenticate one host string (`\0` escapes allowed) and print the verdict
    Authenticate {
        host: String,
        /// Source address of the connection
        #[arg(long, default_value = "127.0.0.1")]
        peer: IpAddr,
    },
    /// Proxy side: append the configured passphrase to a host string
    Encode { host: String },
    /// Generate a new passphrase and store it in the settings file
    Generate {
        #[arg(allow_negative_numbers = true)]
        length: Option<i64>,
    },
    /// Print passphrase status without revealing it
    Diagnostics,
}

impl CliArgs {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the CLI arguments
    pub fn validate(&self) -> Result<()> {
        let ext = self
            .config
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if !ext.eq_ignore_ascii_case("yaml") && !ext.eq_ignore_ascii_case("yml") {
            return Err(anyhow!(
                "Invalid config file format: expected .yaml or .yml extension"
            ));
        }
        if self.config.is_dir() {
            return Err(anyhow!(
                "Config path is a directory: {}",
                self.config.display()
            ));
        }
        Ok(())
    }
}

/// Settings file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    /// Shared secret; empty disables enforcement
    #[serde(default)]
    pub passphrase: String,

    /// Authenticate server list pings as well
    #[serde(default)]
    pub block_pings: bool,

    /// Host segment separator, exactly one character
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Longest accepted host string, in characters
    #[serde(default = "default_max_host_length")]
    pub max_host_length: usize,

    #[serde(default)]
    pub ip_whitelist: IpWhitelistSettings,

    /// Disconnect message for rejected players (`&` colour codes allowed)
    #[serde(default = "default_disconnect_message")]
    pub disconnect_failed_authentication: String,

    #[serde(default)]
    pub command: Messages,
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

fn default_max_host_length() -> usize {
    DEFAULT_MAX_HOST_LENGTH
}

fn default_disconnect_message() -> String {
    DEFAULT_DISCONNECT_MESSAGE.replace('§', "&")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            passphrase: String::new(),
            block_pings: false,
            separator: default_separator(),
            max_host_length: default_max_host_length(),
            ip_whitelist: IpWhitelistSettings::default(),
            disconnect_failed_authentication: default_disconnect_message(),
            command: Messages::default(),
        }
    }
}

impl Settings {
    /// Parse settings from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(content)?;
        Ok(settings)
    }

    /// The separator as a single character
    pub fn separator_char(&self) -> Result<char> {
        let mut chars = self.separator.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(anyhow!(
                "separator must be exactly one character, got {:?}",
                self.separator
            )),
        }
    }

    pub fn codec(&self) -> Result<HostCodec> {
        if self.max_host_length == 0 {
            return Err(anyhow!("max-host-length must be greater than 0"));
        }
        Ok(HostCodec::new(self.separator_char()?, self.max_host_length))
    }

    /// Passphrase, codec and allow-list, validated together
    pub fn auth_config(&self) -> Result<AuthConfig> {
        let ip_list = IpAccessList::from_entries(self.whitelist_entries())?;
        Ok(AuthConfig::new(self.passphrase.clone(), self.codec()?).with_ip_list(ip_list))
    }

    pub fn handler_settings(&self) -> HandlerSettings {
        HandlerSettings {
            block_pings: self.block_pings,
            disconnect_message: translate_color_codes(&self.disconnect_failed_authentication),
        }
    }

    /// Allow-list entries to install; empty when the feature is disabled
    pub fn whitelist_entries(&self) -> &[String] {
        if self.ip_whitelist.enabled {
            &self.ip_whitelist.addresses
        } else {
            &[]
        }
    }
}

/// `ip-whitelist` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpWhitelistSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Exact addresses or CIDR blocks
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// `command` section: operator message templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Messages {
    pub console_only: String,
    pub invalid_format: String,
    pub invalid_length: String,
    pub reload: String,
    pub reload_failed: String,
    pub generate: String,
    pub connection_logger: ConnectionLoggerMessages,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            console_only: "&cThis command can only be executed from the console.".to_string(),
            invalid_format: "&cInvalid format. Usage: reload | generate [length] | connection-logger <attach <name>|detach> | diagnostics".to_string(),
            invalid_length: "&cThe passphrase length must be an integer between 1 and {max}.".to_string(),
            reload: "&aReloaded.".to_string(),
            reload_failed: "&cReload failed, previous settings are still active: {error}".to_string(),
            generate: "&aGenerated a new passphrase ({length} characters). Copy it to the proxy configuration.".to_string(),
            connection_logger: ConnectionLoggerMessages::default(),
        }
    }
}

/// `command.connection-logger` messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionLoggerMessages {
    /// `{name}` is replaced with the recipient
    pub attached: String,
    pub detached: String,
}

impl Default for ConnectionLoggerMessages {
    fn default() -> Self {
        Self {
            attached: "&aConnection logger attached to {name}.".to_string(),
            detached: "&aConnection logger detached.".to_string(),
        }
    }
}

/// Translate `&`-prefixed legacy colour codes to `§`
pub fn translate_color_codes(message: &str) -> String {
    const CODES: &str = "0123456789AaBbCcDdEeFfKkLlMmNnOoRrXx";

    let mut out = String::with_capacity(message.len());
    let mut chars = message.chars().peekable();
    while let Some(c) = chars.next() {
        match chars.peek() {
            Some(&next) if c == '&' && CODES.contains(next) => {
                out.push('§');
                out.push(next.to_ascii_lowercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// Settings persistence used by the administrative surface
pub trait SettingsStore: Send + Sync {
    /// Load the current settings
    fn load(&self) -> Result<Settings>;
    /// Persist a newly generated passphrase
    fn store_passphrase(&self, passphrase: &str) -> Result<()>;
}

/// YAML file backed settings store
#[derive(Debug, Clone)]
pub struct YamlSettingsStore {
    path: PathBuf,
}

impl YamlSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the default settings file if none exists yet
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create '{}'", parent.display()))?;
        }
        let content = serde_yaml::to_string(&Settings::default())?;
        std::fs::write(&self.path, content).with_context(|| {
            format!("Failed to write default config '{}'", self.path.display())
        })?;
        Ok(())
    }
}

impl SettingsStore for YamlSettingsStore {
    fn load(&self) -> Result<Settings> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| anyhow!("Failed to read config file '{}': {}", self.path.display(), e))?;
        Settings::from_yaml(&content)
            .map_err(|e| anyhow!("Failed to parse config file '{}': {}", self.path.display(), e))
    }

    /// Rewrites only the `passphrase` key; other keys are kept as they are.
    fn store_passphrase(&self, passphrase: &str) -> Result<()> {
        let content = std::fs::read_to_string(&self.path).unwrap_or_default();
        let mut document: serde_yaml::Value = if content.trim().is_empty() {
            serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
        } else {
            serde_yaml::from_str(&content)?
        };
        let mapping = document
            .as_mapping_mut()
            .ok_or_else(|| anyhow!("Config file '{}' is not a mapping", self.path.display()))?;
        mapping.insert(
            serde_yaml::Value::from("passphrase"),
            serde_yaml::Value::from(passphrase),
        );
        std::fs::write(&self.path, serde_yaml::to_string(&document)?)
            .with_context(|| format!("Failed to write config file '{}'", self.path.display()))?;
        Ok(())
    }
}

/// Turn `\0` escapes typed on a command line into NUL separators
pub fn unescape_host(raw: &str) -> String {
    raw.replace("\\0", "\0")
}

/// Inverse of [`unescape_host`], for printing
pub fn escape_host(host: &str) -> String {
    host.replace('\0', "\\0")
}
