//! The closed failure taxonomy and every piece of user-facing failure text.
//!
//! Nothing else in the pipeline formats a failure for a person; outcomes,
//! probe results and records all go through [`describe`].

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

/// Why a delivery did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    NotConfigured,
    ConnectionFailed,
    Authentication,
    RecipientRefused,
    Timeout,
    ContentPreparation,
    Unknown,
}

impl FailureKind {
    pub const ALL: [Self; 8] = [
        Self::Validation,
        Self::NotConfigured,
        Self::ConnectionFailed,
        Self::Authentication,
        Self::RecipientRefused,
        Self::Timeout,
        Self::ContentPreparation,
        Self::Unknown,
    ];

    /// The wire name, as serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotConfigured => "not_configured",
            Self::ConnectionFailed => "connection_failed",
            Self::Authentication => "authentication",
            Self::RecipientRefused => "recipient_refused",
            Self::Timeout => "timeout",
            Self::ContentPreparation => "content_preparation",
            Self::Unknown => "unknown",
        }
    }

    /// One-line summary shown before the technical detail.
    #[must_use]
    pub const fn headline(self) -> &'static str {
        match self {
            Self::Validation => "Invalid recipient email address",
            Self::NotConfigured => "Email delivery is not configured",
            Self::ConnectionFailed => "Could not connect to the mail relay",
            Self::Authentication => "The mail relay rejected the sender credentials",
            Self::RecipientRefused => "The mail relay refused the recipient",
            Self::Timeout => "Email delivery timed out",
            Self::ContentPreparation => "The report could not be prepared",
            Self::Unknown => "Email delivery failed",
        }
    }

    /// What the operator or user can do about it.
    #[must_use]
    pub const fn remediation(self) -> &'static [&'static str] {
        match self {
            Self::Validation => &[
                "Check the recipient address for typos",
                "Use the form name@example.com",
            ],
            Self::NotConfigured => &[
                "Set COURIER_SENDER to the sending mailbox",
                "Set COURIER_SECRET to its app password",
                "Restart the service after changing the environment",
            ],
            Self::ConnectionFailed => &[
                "Check network connectivity to the relay",
                "Verify the relay host and port (587 for submission)",
                "Check that outbound SMTP is not blocked by a firewall",
            ],
            Self::Authentication => &[
                "Check sender credentials",
                "Use an app password if the account has two-step verification",
                "Make sure the sender account allows SMTP access",
            ],
            Self::RecipientRefused => &[
                "Verify that the recipient mailbox exists",
                "Ask the recipient to check their provider's filtering rules",
            ],
            Self::Timeout => &[
                "Try again in a few minutes",
                "Check the relay's status and network latency",
                "Increase COURIER_TOTAL_TIMEOUT_MS if the relay is slow",
            ],
            Self::ContentPreparation => &[
                "Check that the prediction amount is a finite number",
                "Check that the confidence is between 0 and 1",
            ],
            Self::Unknown => &[
                "Try again later",
                "Check the service logs for the relay's response",
            ],
        }
    }

    /// Whether re-running the whole pipeline could change the result.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::ConnectionFailed | Self::Timeout | Self::Unknown)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure, ready to be put into an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: FailureKind,
    pub message: String,
    pub remediation: Vec<String>,
}

/// Classifies an error and renders its user-facing message.
#[must_use]
pub fn classify(error: &DeliveryError) -> Classification {
    let kind = error.kind();
    Classification {
        kind,
        message: describe(error),
        remediation: kind.remediation().iter().map(ToString::to_string).collect(),
    }
}

/// `"<headline>: <detail>"`
#[must_use]
pub fn describe(error: &DeliveryError) -> String {
    format!("{}: {error}", error.kind().headline())
}

/// Message for a delivery the relay accepted.
#[must_use]
pub fn delivered(recipient: &str) -> String {
    format!("Report delivered to {recipient}")
}
