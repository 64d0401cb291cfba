//! Secured network command line
//!
//! - `console`: administrative console on stdin, relays connection results
//! - `authenticate` / `encode`: one-shot backend and proxy operations
//! - `generate` / `diagnostics`: passphrase management

// Use mimalloc as the global allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use secured_network::admin::{Admin, CommandSender};
use secured_network::config::{
    escape_host, unescape_host, CliArgs, Command, SettingsStore, YamlSettingsStore,
};
use secured_network::core::generator::RECOMMENDED_PASSPHRASE_LENGTH;
use secured_network::core::{Authenticator, ChannelSink, ConnectionLogger};
use secured_network::handler::HandshakeHandler;
use secured_network::logger::{self, log};
use secured_network::proxy::ProxyForwarder;

/// Relay channel capacity; lines beyond it are dropped
const RELAY_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse_args();
    cli.validate()?;

    logger::init_logger(cli.log_level);

    let store = Arc::new(YamlSettingsStore::new(&cli.config));
    store.ensure_exists()?;

    log::info!(config = %cli.config.display(), "Starting secured network");

    let (sink, mut relay_rx) = ChannelSink::new(RELAY_CHANNEL_CAPACITY);
    let authenticator = Arc::new(Authenticator::new());
    let connection_logger = Arc::new(ConnectionLogger::new(Arc::new(sink)));
    let handler = Arc::new(HandshakeHandler::new(
        Arc::clone(&authenticator),
        connection_logger,
        Default::default(),
    ));
    let admin = Admin::new(
        Arc::clone(&store) as Arc<dyn SettingsStore>,
        Arc::clone(&authenticator),
        Arc::clone(&handler),
    );
    admin.reload()?;

    match cli.command {
        Command::Console => {
            tokio::spawn(async move {
                while let Some(line) = relay_rx.recv().await {
                    println!("[{}] {}", line.target, line.message);
                }
            });
            run_console(&admin).await
        }
        Command::Authenticate { host, peer } => authenticate_once(&authenticator, &host, peer),
        Command::Encode { host } => {
            let settings = store.load()?;
            let forwarder = ProxyForwarder::new(&settings.auth_config()?)?;
            println!("{}", escape_host(&forwarder.rewrite(&unescape_host(&host))?));
            Ok(())
        }
        Command::Generate { length } => {
            let length = length.unwrap_or(RECOMMENDED_PASSPHRASE_LENGTH);
            admin.generate(length)?;
            let diagnostics = authenticator.diagnostics();
            println!(
                "Generated {} character passphrase (fingerprint {}) into {}",
                diagnostics.length,
                diagnostics.fingerprint,
                store.path().display()
            );
            Ok(())
        }
        Command::Diagnostics => {
            for line in admin.diagnostics() {
                println!("{}", line);
            }
            Ok(())
        }
    }
}

/// Read console commands until EOF or `exit`
async fn run_console(admin: &Admin) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let args: Vec<&str> = line.split_whitespace().collect();
                match args.first() {
                    None => continue,
                    Some(&"exit") | Some(&"stop") => break,
                    Some(_) => {
                        for reply in admin.execute(&CommandSender::Console, &args) {
                            println!("{}", reply);
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutdown signal received...");
                break;
            }
        }
    }
    Ok(())
}

/// Authenticate one host string and print the verdict as JSON
fn authenticate_once(authenticator: &Authenticator, host: &str, peer: IpAddr) -> Result<()> {
    let mut verdict = authenticator.authenticate(&unescape_host(host), peer);
    log::connection_result(&peer, &verdict);
    verdict.rewritten_host = escape_host(&verdict.rewritten_host);
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}
