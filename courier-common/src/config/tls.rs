//! TLS settings for the relay connection.

use serde::{Deserialize, Serialize};

/// When to upgrade the relay connection with STARTTLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    /// Upgrade via STARTTLS whenever the relay advertises it, otherwise
    /// continue in plaintext.
    #[default]
    Opportunistic,

    /// Refuse to authenticate unless STARTTLS succeeds.
    Required,

    /// Never attempt STARTTLS.
    ///
    /// **WARNING**: credentials travel in plaintext. Local testing only.
    Disabled,
}

/// TLS configuration for a relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TlsConfig {
    /// STARTTLS negotiation policy.
    ///
    /// Default: `Opportunistic`
    #[serde(default)]
    pub policy: TlsPolicy,

    /// Whether to accept invalid TLS certificates (self-signed, expired, etc.).
    ///
    /// **SECURITY WARNING**: disables certificate validation and makes the
    /// connection vulnerable to man-in-the-middle attacks.
    ///
    /// Default: `false`
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl TlsConfig {
    /// Opportunistic STARTTLS with certificate validation.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            policy: TlsPolicy::Opportunistic,
            accept_invalid_certs: false,
        }
    }

    /// STARTTLS is mandatory.
    #[must_use]
    pub const fn required() -> Self {
        Self {
            policy: TlsPolicy::Required,
            accept_invalid_certs: false,
        }
    }

    /// STARTTLS is never attempted.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            policy: TlsPolicy::Disabled,
            accept_invalid_certs: false,
        }
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        matches!(self.policy, TlsPolicy::Required)
    }

    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        matches!(self.policy, TlsPolicy::Disabled)
    }
}
