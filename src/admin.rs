//! Administrative command surface
//!
//! Console commands:
//! - `reload` - re-read settings and install new snapshots
//! - `generate [length]` - replace the passphrase with a random one
//! - `connection-logger attach <name>` / `connection-logger detach`
//! - `diagnostics` - passphrase status, never the value itself

use std::sync::Arc;

use anyhow::Result;
use arc_swap::ArcSwap;
use clap::{Parser, Subcommand};

use crate::config::{translate_color_codes, Messages, Settings, SettingsStore};
use crate::core::generator::{self, MAX_PASSPHRASE_LENGTH, RECOMMENDED_PASSPHRASE_LENGTH};
use crate::core::{Authenticator, ConnectionLogger};
use crate::error::SecuredNetworkError;
use crate::handler::HandshakeHandler;
use crate::logger::log;

/// Who issued a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSender {
    Console,
    Player(String),
}

#[derive(Parser, Debug)]
#[command(
    name = "securednetwork",
    no_binary_name = true,
    disable_help_flag = true,
    disable_help_subcommand = true
)]
struct AdminArgs {
    #[command(subcommand)]
    command: AdminCommand,
}

/// Parsed console command
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Reload,
    Generate {
        #[arg(allow_negative_numbers = true)]
        length: Option<i64>,
    },
    #[command(name = "connection-logger")]
    ConnectionLogger {
        #[command(subcommand)]
        action: LoggerAction,
    },
    Diagnostics,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum LoggerAction {
    Attach { name: String },
    Detach,
}

impl AdminCommand {
    /// Parse console arguments. Command keywords are case-insensitive; the
    /// recipient name is kept as typed.
    pub fn parse(args: &[&str]) -> Option<Self> {
        let normalized: Vec<String> = args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                let is_keyword =
                    i == 0 || (i == 1 && args[0].eq_ignore_ascii_case("connection-logger"));
                if is_keyword {
                    arg.to_lowercase()
                } else {
                    arg.to_string()
                }
            })
            .collect();
        AdminArgs::try_parse_from(normalized)
            .ok()
            .map(|parsed| parsed.command)
    }
}

/// Executes console commands against the running components
pub struct Admin {
    store: Arc<dyn SettingsStore>,
    authenticator: Arc<Authenticator>,
    handler: Arc<HandshakeHandler>,
    messages: ArcSwap<Messages>,
}

impl Admin {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        authenticator: Arc<Authenticator>,
        handler: Arc<HandshakeHandler>,
    ) -> Self {
        Self {
            store,
            authenticator,
            handler,
            messages: ArcSwap::from_pointee(Messages::default()),
        }
    }

    fn connection_logger(&self) -> &Arc<ConnectionLogger> {
        self.handler.connection_logger()
    }

    /// Validate `settings` completely, then install every snapshot.
    ///
    /// Nothing is installed when any part is invalid. Passphrase and
    /// allow-list go in with one swap.
    pub fn apply(&self, settings: &Settings) -> Result<()> {
        let auth_config = settings.auth_config()?;

        // Only fallible install; the rest cannot fail once this succeeds
        self.authenticator.reload(&auth_config)?;
        self.handler.reload(settings.handler_settings());
        self.messages.store(Arc::new(settings.command.clone()));
        Ok(())
    }

    /// Load settings from the store and apply them
    pub fn reload(&self) -> Result<()> {
        log::admin("reload", None);
        let settings = self.store.load()?;
        self.apply(&settings)?;
        log::info!(
            enforcing = self.authenticator.diagnostics().enforcing,
            whitelist_entries = self.authenticator.ip_list().len(),
            "Settings reloaded"
        );
        Ok(())
    }

    /// Generate a new passphrase, persist it, then install it.
    ///
    /// When the store fails the running passphrase is left untouched.
    pub fn generate(&self, length: i64) -> Result<String> {
        let passphrase = generator::generate(length)?;
        self.authenticator
            .codec()
            .validate_passphrase(&passphrase)?;
        self.store.store_passphrase(&passphrase)?;
        self.authenticator.install_generated(&passphrase)?;
        log::admin("generate", Some(&format!("{} characters", length)));
        Ok(passphrase)
    }

    /// Operator-facing status lines
    pub fn diagnostics(&self) -> Vec<String> {
        let diagnostics = self.authenticator.diagnostics();
        let logger = match self.connection_logger().target() {
            Some(target) => format!("attached to {}", target),
            None => "detached".to_string(),
        };
        let whitelist = if diagnostics.whitelist_entries == 0 {
            "disabled".to_string()
        } else {
            format!("{} entries", diagnostics.whitelist_entries)
        };

        vec![
            format!(
                "Plugin: {} v{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ),
            format!(
                "Passphrase: {} ({} chars, fingerprint {})",
                diagnostics.status, diagnostics.length, diagnostics.fingerprint
            ),
            format!("IP whitelist: {}", whitelist),
            format!("Connection logger: {}", logger),
            format!(
                "OS: {} ({})",
                std::env::consts::OS,
                std::env::consts::ARCH
            ),
        ]
    }

    /// Execute one console command and return the reply lines
    pub fn execute(&self, sender: &CommandSender, args: &[&str]) -> Vec<String> {
        let messages = self.messages.load_full();
        let reply = |template: &str| vec![translate_color_codes(template)];

        if *sender != CommandSender::Console {
            return reply(&messages.console_only);
        }

        let Some(command) = AdminCommand::parse(args) else {
            return reply(&messages.invalid_format);
        };

        match command {
            AdminCommand::Reload => match self.reload() {
                Ok(()) => reply(&self.messages.load().reload),
                Err(e) => {
                    log::error!(error = %e, "Reload failed");
                    reply(&messages.reload_failed.replace("{error}", &e.to_string()))
                }
            },
            AdminCommand::Generate { length } => {
                let length = length.unwrap_or(RECOMMENDED_PASSPHRASE_LENGTH);
                match self.generate(length) {
                    Ok(_) => reply(&messages.generate.replace("{length}", &length.to_string())),
                    Err(e) => match e.downcast_ref::<SecuredNetworkError>() {
                        Some(SecuredNetworkError::InvalidPassphraseLength(_)) => reply(
                            &messages
                                .invalid_length
                                .replace("{max}", &MAX_PASSPHRASE_LENGTH.to_string()),
                        ),
                        _ => {
                            log::error!(error = %e, "Passphrase generation failed");
                            reply(&e.to_string())
                        }
                    },
                }
            }
            AdminCommand::ConnectionLogger { action } => match action {
                LoggerAction::Attach { name } => {
                    self.connection_logger().attach(name.clone());
                    log::admin("connection-logger", Some(&format!("attached to \"{}\"", name)));
                    reply(&messages.connection_logger.attached.replace("{name}", &name))
                }
                LoggerAction::Detach => {
                    self.connection_logger().detach();
                    log::admin("connection-logger", Some("detached"));
                    reply(&messages.connection_logger.detached)
                }
            },
            AdminCommand::Diagnostics => self.diagnostics(),
        }
    }
}
