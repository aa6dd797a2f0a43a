//! Relay configuration.
//!
//! The configuration is an explicit value handed to the delivery pipeline at
//! construction. It can be deserialized from RON and then overlaid with
//! environment variables, which is how deployments usually inject the
//! sender credentials.
//!
//! ```ron
//! (
//!     host: "smtp.gmail.com",
//!     port: 587,
//!     sender_name: "MediCare+ Platform",
//!     tls: (policy: opportunistic),
//!     timeouts: (connect_ms: 20000, send_ms: 30000, total_ms: 60000),
//! )
//! ```
//!
//! ## Modules
//!
//! - [`timeouts`]: connect / command / send / total budgets
//! - [`tls`]: STARTTLS policy and certificate validation

pub mod timeouts;
pub mod tls;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub use timeouts::{ClientTimeouts, TimeoutConfig};
pub use tls::{TlsConfig, TlsPolicy};

use crate::ConfigError;

/// Environment variables consulted for the sender identity, in order.
pub const SENDER_VARS: &[&str] = &[
    "COURIER_SENDER",
    "GMAIL_EMAIL",
    "EMAIL_USER",
    "SMTP_EMAIL",
    "SENDER_EMAIL",
];

/// Environment variables consulted for the sender secret, in order.
pub const SECRET_VARS: &[&str] = &[
    "COURIER_SECRET",
    "GMAIL_APP_PASSWORD",
    "EMAIL_PASSWORD",
    "SMTP_PASSWORD",
    "APP_PASSWORD",
];

pub const HOST_VAR: &str = "COURIER_RELAY_HOST";
pub const PORT_VAR: &str = "COURIER_RELAY_PORT";
pub const CONNECT_TIMEOUT_VAR: &str = "COURIER_CONNECT_TIMEOUT_MS";
pub const SEND_TIMEOUT_VAR: &str = "COURIER_SEND_TIMEOUT_MS";
pub const TOTAL_TIMEOUT_VAR: &str = "COURIER_TOTAL_TIMEOUT_MS";

/// A credential that never appears in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret, for the AUTH exchange only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(***)")
    }
}

/// Everything needed to reach and authenticate against the mail relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Relay host name, also used for TLS SNI.
    ///
    /// Default: `smtp.gmail.com`
    #[serde(default = "defaults::host")]
    pub host: String,

    /// Relay submission port.
    ///
    /// Default: 587
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Authenticated sender identity (also the envelope sender).
    #[serde(default)]
    pub sender: Option<String>,

    /// Secret for the sender identity (e.g. an application password).
    #[serde(default)]
    pub secret: Option<Secret>,

    /// Display name used in the `From` header.
    ///
    /// Default: `MediCare+ Platform`
    #[serde(default = "defaults::sender_name")]
    pub sender_name: String,

    /// Name announced in EHLO.
    ///
    /// Default: `localhost`
    #[serde(default = "defaults::helo_domain")]
    pub helo_domain: String,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub timeouts: ClientTimeouts,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            port: defaults::port(),
            sender: None,
            secret: None,
            sender_name: defaults::sender_name(),
            helo_domain: defaults::helo_domain(),
            tls: TlsConfig::default(),
            timeouts: ClientTimeouts::default(),
        }
    }
}

impl RelayConfig {
    /// The relay endpoint as `host:port`.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The sender identity and secret, if both are present and non-empty.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &Secret)> {
        let sender = self.sender.as_deref().filter(|s| !s.trim().is_empty())?;
        let secret = self.secret.as_ref().filter(|s| !s.expose().is_empty())?;
        Some((sender, secret))
    }

    /// Returns `true` when both sender identity and secret are available.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }

    /// Overlay values from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a numeric variable does not parse.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup.
    ///
    /// Unset and empty variables leave the current value untouched. For the
    /// sender identity and secret the first non-empty variable in
    /// [`SENDER_VARS`] / [`SECRET_VARS`] wins.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a numeric variable does not parse.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let first = |keys: &[&str]| keys.iter().find_map(|&key| lookup(key));

        if let Some(sender) = first(SENDER_VARS) {
            self.sender = Some(sender.trim().to_string());
        }
        if let Some(secret) = first(SECRET_VARS) {
            self.secret = Some(Secret::new(secret));
        }
        if let Some(host) = lookup(HOST_VAR) {
            self.host = host.trim().to_string();
        }
        if let Some(port) = lookup(PORT_VAR) {
            self.port = parse_var(PORT_VAR, &port)?;
        }
        if let Some(ms) = lookup(CONNECT_TIMEOUT_VAR) {
            self.timeouts.connect_ms = parse_var(CONNECT_TIMEOUT_VAR, &ms)?;
        }
        if let Some(ms) = lookup(SEND_TIMEOUT_VAR) {
            self.timeouts.send_ms = parse_var(SEND_TIMEOUT_VAR, &ms)?;
        }
        if let Some(ms) = lookup(TOTAL_TIMEOUT_VAR) {
            self.timeouts.total_ms = parse_var(TOTAL_TIMEOUT_VAR, &ms)?;
        }

        Ok(self)
    }
}

fn parse_var<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            field: key,
            value: value.to_string(),
        })
}

mod defaults {
    pub fn host() -> String {
        String::from("smtp.gmail.com")
    }
    pub const fn port() -> u16 {
        587
    }
    pub fn sender_name() -> String {
        String::from("MediCare+ Platform")
    }
    pub fn helo_domain() -> String {
        String::from("localhost")
    }
}
