use std::str::FromStr;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level '{}'", s)),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `level`.
pub fn init_logger(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("secured_network={}", level.as_str())));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(true)
                .with_ansi(true)
                .compact(),
        )
        .init();
}

pub mod log {
    pub use tracing::{debug, error, info, warn};

    use std::net::IpAddr;

    use crate::core::AuthenticationVerdict;

    /// Record the result of one handshake authentication
    pub fn connection_result(peer: &IpAddr, verdict: &AuthenticationVerdict) {
        match verdict.cause {
            None => info!(peer = %peer, uuid = %verdict.player_id, "Connection accepted"),
            Some(cause) => warn!(
                peer = %peer,
                uuid = %verdict.player_id,
                cause = cause.as_str(),
                "Connection rejected"
            ),
        }
    }

    /// Record an administrative action
    pub fn admin(event: &str, details: Option<&str>) {
        if let Some(details) = details {
            info!(event = event, details = details, "Admin");
        } else {
            info!(event = event, "Admin");
        }
    }
}
