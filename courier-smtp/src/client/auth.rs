//! SASL mechanisms for submission (RFC 4954).

use core::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};

/// Mechanisms this client can speak. Both send the secret as-is, so they are
/// only used once the connection is encrypted (or when TLS is explicitly
/// disabled for local testing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMechanism {
    /// RFC 4616, a single `AUTH PLAIN <initial-response>` command.
    Plain,
    /// The `334 VXNlcm5hbWU6` / `334 UGFzc3dvcmQ6` exchange.
    Login,
}

impl AuthMechanism {
    /// Case-insensitive lookup of an advertised mechanism name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("PLAIN") {
            Some(Self::Plain)
        } else if name.eq_ignore_ascii_case("LOGIN") {
            Some(Self::Login)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `base64("\0" user "\0" secret)`
pub(super) fn plain_initial_response(user: &str, secret: &str) -> String {
    let mut raw = Vec::with_capacity(user.len() + secret.len() + 2);
    raw.push(0);
    raw.extend_from_slice(user.as_bytes());
    raw.push(0);
    raw.extend_from_slice(secret.as_bytes());
    STANDARD.encode(raw)
}

pub(super) fn encode(value: &str) -> String {
    STANDARD.encode(value)
}
