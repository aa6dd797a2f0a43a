//! Frames a composed report as a MIME message and submits it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_common::{Mailbox, RelayConfig, internal, tracing};
use courier_smtp::MessageBuilder;

use crate::{compose::ComposedReport, error::DeliveryError, session::RelaySession};

/// Submits one message per call and checks the relay's per-recipient verdict.
#[derive(Debug, Clone)]
pub struct Transmitter {
    config: Arc<RelayConfig>,
}

impl Transmitter {
    #[must_use]
    pub const fn new(config: Arc<RelayConfig>) -> Self {
        Self { config }
    }

    /// Builds the RFC 5322 message for `report`.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::NotConfigured`] without a sender identity,
    /// [`DeliveryError::ContentPreparation`] if the message cannot be framed.
    pub fn frame(
        &self,
        recipient: &Mailbox,
        report: &ComposedReport,
        now: DateTime<Utc>,
    ) -> Result<String, DeliveryError> {
        let (sender, _) = self.config.credentials().ok_or_else(DeliveryError::not_configured)?;
        let domain = sender
            .rsplit_once('@')
            .map_or(self.config.helo_domain.as_str(), |(_, domain)| domain);

        Ok(MessageBuilder::new()
            .from(self.config.sender_name.as_str(), sender)
            .to(recipient.to_string())
            .reply_to(sender)
            .subject(report.subject.as_str())
            .date(now.to_rfc2822())
            .message_id(format!("{}@{domain}", ulid::Ulid::new()))
            .text(report.text_body.as_str())
            .html(report.html_body.as_str())
            .build()?)
    }

    /// Opens a session and sends `message` to `recipient`.
    ///
    /// Success means the relay accepted the recipient and the message data;
    /// a refused recipient is a failure even though no transport error
    /// occurred, and the message is never sent again.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::RecipientRefused`] if the relay refused the recipient,
    /// otherwise whatever the session reports.
    #[tracing::instrument(level = "debug", skip(self, message), fields(recipient = %recipient))]
    pub async fn send(&self, recipient: &Mailbox, message: &str) -> Result<(), DeliveryError> {
        let (sender, _) = self.config.credentials().ok_or_else(DeliveryError::not_configured)?;

        let mut session = RelaySession::open(&self.config).await?;
        let report = session
            .send(sender, &[recipient.to_string()], message)
            .await?;
        session.quit().await;

        if let Some((recipient, code, message)) = report.refused.into_iter().next() {
            return Err(DeliveryError::RecipientRefused {
                recipient,
                code,
                message,
            });
        }
        if report.accepted.is_empty() {
            return Err(DeliveryError::Unknown(
                "Relay did not confirm any recipient".to_string(),
            ));
        }

        internal!(level = INFO, recipient = %recipient, "Relay accepted the report");
        Ok(())
    }
}
