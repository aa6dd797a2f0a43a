//! Typed errors for the delivery pipeline.
//!
//! [`DeliveryError`] has exactly one variant per [`FailureKind`]. Variants
//! only carry the technical detail; the user-facing wording lives in
//! [`crate::classifier`].

use courier_common::AddressError;
use courier_smtp::ClientError;
use thiserror::Error;

use crate::classifier::FailureKind;

/// A failed pipeline step.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The recipient address is malformed.
    #[error("{0}")]
    Validation(#[from] AddressError),

    /// Sender identity or secret is missing.
    #[error("{0}")]
    NotConfigured(String),

    /// The relay could not be reached or the handshake failed.
    #[error("{0}")]
    ConnectionFailed(String),

    /// The relay rejected the sender credentials.
    #[error("{0}")]
    Authentication(String),

    /// The relay answered `RCPT TO` with a 4xx/5xx reply.
    #[error("{recipient} was refused with {code} {message}")]
    RecipientRefused {
        recipient: String,
        code: u16,
        message: String,
    },

    /// A step or the whole pipeline ran out of time.
    #[error("{0}")]
    Timeout(String),

    /// The report could not be rendered or framed as a message.
    #[error("{0}")]
    ContentPreparation(String),

    /// Anything the other kinds don't describe.
    #[error("{0}")]
    Unknown(String),
}

impl DeliveryError {
    /// Sender identity or secret is missing or empty.
    #[must_use]
    pub fn not_configured() -> Self {
        Self::NotConfigured("Sender identity or secret is not set".to_string())
    }

    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::NotConfigured(_) => FailureKind::NotConfigured,
            Self::ConnectionFailed(_) => FailureKind::ConnectionFailed,
            Self::Authentication(_) => FailureKind::Authentication,
            Self::RecipientRefused { .. } => FailureKind::RecipientRefused,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::ContentPreparation(_) => FailureKind::ContentPreparation,
            Self::Unknown(_) => FailureKind::Unknown,
        }
    }
}

/// Transport failures mapped onto the taxonomy.
///
/// - **I/O, closed connection, TLS** → `ConnectionFailed`
/// - **AUTH rejected** → `Authentication`
/// - **Message framing** → `ContentPreparation`
/// - **Protocol surprises** (unparseable or unexpected replies, no AUTH
///   offered) → `Unknown`
impl From<ClientError> for DeliveryError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Io(e) => Self::ConnectionFailed(format!("I/O error: {e}")),
            ClientError::ConnectionClosed => {
                Self::ConnectionFailed("Connection closed unexpectedly".to_string())
            }
            ClientError::TlsError(msg) => Self::ConnectionFailed(format!("TLS error: {msg}")),
            ClientError::AuthenticationFailed { code, message } => {
                Self::Authentication(format!("{code} {message}"))
            }
            ClientError::AuthNotSupported => {
                Self::Unknown("Relay does not advertise AUTH PLAIN or AUTH LOGIN".to_string())
            }
            ClientError::BuilderError(msg) => Self::ContentPreparation(msg),
            ClientError::SmtpError { code, message }
            | ClientError::UnexpectedResponse { code, message } => {
                Self::Unknown(format!("Unexpected SMTP response: {code} {message}"))
            }
            ClientError::ParseError(msg) => {
                Self::Unknown(format!("SMTP protocol parse error: {msg}"))
            }
            ClientError::Utf8Error(e) => Self::Unknown(format!("UTF-8 decoding error: {e}")),
        }
    }
}

/// Errors raised by a [`DeliveryRecorder`](crate::recorder::DeliveryRecorder).
///
/// These are logged and never reach a `DeliveryOutcome`.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
