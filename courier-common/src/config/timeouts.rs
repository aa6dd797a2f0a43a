//! Timeout configuration for relay submission.
//!
//! A report delivery is bounded at three levels:
//!
//! - **connect**: establishing the TCP connection to the relay
//! - **command** / **send**: a single SMTP exchange, and the whole transmit
//!   step (connect through end-of-data) respectively
//! - **total**: the entire pipeline, probe through transmission
//!
//! The per-step budgets are always clamped to whatever is left of the total.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Common interface for timeout configuration.
pub trait TimeoutConfig {
    /// Timeout for establishing the TCP connection.
    fn connect_timeout(&self) -> Duration;

    /// Timeout for an individual SMTP command and its reply.
    fn command_timeout(&self) -> Duration;

    /// Timeout for the transmit step as a whole.
    fn send_timeout(&self) -> Duration;

    /// Timeout for the whole delivery pipeline.
    fn total_timeout(&self) -> Duration;
}

/// Client-side SMTP timeout configuration.
///
/// Values are in milliseconds so that tests can exercise the deadline paths
/// without waiting for whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTimeouts {
    /// Timeout for establishing the TCP connection.
    ///
    /// Default: 20 seconds
    #[serde(default = "defaults::connect_ms")]
    pub connect_ms: u64,

    /// Timeout for each SMTP command (EHLO, STARTTLS, AUTH, MAIL, RCPT, DATA).
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::command_ms")]
    pub command_ms: u64,

    /// Timeout for the transmit step (connect, authenticate, send).
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::send_ms")]
    pub send_ms: u64,

    /// Timeout for the entire pipeline (probe, compose and transmit).
    ///
    /// Default: 60 seconds
    #[serde(default = "defaults::total_ms")]
    pub total_ms: u64,

    /// Timeout for QUIT after a finished exchange.
    ///
    /// Default: 5 seconds (never fails a delivery)
    #[serde(default = "defaults::quit_ms")]
    pub quit_ms: u64,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect_ms: defaults::connect_ms(),
            command_ms: defaults::command_ms(),
            send_ms: defaults::send_ms(),
            total_ms: defaults::total_ms(),
            quit_ms: defaults::quit_ms(),
        }
    }
}

impl ClientTimeouts {
    /// Timeout for QUIT.
    #[must_use]
    pub const fn quit_timeout(&self) -> Duration {
        Duration::from_millis(self.quit_ms)
    }
}

impl TimeoutConfig for ClientTimeouts {
    fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_ms)
    }

    fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_ms)
    }

    fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_ms)
    }
}

/// Default timeout values.
mod defaults {
    pub const fn connect_ms() -> u64 {
        20_000
    }
    pub const fn command_ms() -> u64 {
        30_000
    }
    pub const fn send_ms() -> u64 {
        30_000
    }
    pub const fn total_ms() -> u64 {
        60_000
    }
    pub const fn quit_ms() -> u64 {
        5_000
    }
}
