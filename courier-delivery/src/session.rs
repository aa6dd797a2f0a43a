//! An authenticated session with the mail relay.
//!
//! Both the probe and the transmitter go through [`RelaySession::open`], so
//! the handshake (greeting, EHLO, STARTTLS, AUTH) is implemented once. Every
//! command is individually bounded by the configured command timeout.

use std::{future::Future, time::Duration};

use courier_common::{RelayConfig, TimeoutConfig, TlsPolicy, internal, tracing};
use courier_smtp::{Response, SmtpClient};

use crate::error::DeliveryError;

/// Per-recipient result of an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Recipients the relay answered with 2xx.
    pub accepted: Vec<String>,
    /// Recipients the relay refused, with the reply code and text.
    pub refused: Vec<(String, u16, String)>,
}

impl SendReport {
    #[must_use]
    pub fn all_accepted(&self) -> bool {
        self.refused.is_empty() && !self.accepted.is_empty()
    }
}

/// Runs one relay exchange under `limit`, mapping an elapsed deadline to
/// [`DeliveryError::Timeout`].
async fn within<T, F>(limit: Duration, what: &str, fut: F) -> Result<T, DeliveryError>
where
    F: Future<Output = courier_smtp::client::Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| DeliveryError::Timeout(format!("{what} timed out after {limit:?}")))?
        .map_err(DeliveryError::from)
}

/// A connected, greeted, (optionally) encrypted and authenticated session.
///
/// Dropping the session closes the socket.
pub struct RelaySession {
    client: SmtpClient,
    endpoint: String,
    command_timeout: Duration,
    quit_timeout: Duration,
}

impl RelaySession {
    /// Connects to the relay and authenticates with the configured identity.
    ///
    /// # Errors
    ///
    /// - [`DeliveryError::NotConfigured`] when sender identity or secret is missing
    /// - [`DeliveryError::ConnectionFailed`] when the relay cannot be reached,
    ///   refuses the greeting or EHLO, or TLS cannot be negotiated as required
    /// - [`DeliveryError::Authentication`] when the credentials are rejected
    /// - [`DeliveryError::Timeout`] when a command exceeds its budget
    #[tracing::instrument(level = "debug", skip(config), fields(relay = %config.endpoint()))]
    pub async fn open(config: &RelayConfig) -> Result<Self, DeliveryError> {
        let (sender, secret) = config.credentials().ok_or_else(DeliveryError::not_configured)?;

        let endpoint = config.endpoint();
        let connect_timeout = config.timeouts.connect_timeout();
        let command_timeout = config.timeouts.command_timeout();

        let client = tokio::time::timeout(
            connect_timeout,
            SmtpClient::connect(&endpoint, config.host.clone()),
        )
        .await
        .map_err(|_| {
            DeliveryError::ConnectionFailed(format!(
                "Connecting to {endpoint} timed out after {connect_timeout:?}"
            ))
        })?
        .map_err(|e| DeliveryError::ConnectionFailed(format!("Failed to connect to {endpoint}: {e}")))?
        .accept_invalid_certs(config.tls.accept_invalid_certs);

        let mut session = Self {
            client,
            endpoint,
            command_timeout,
            quit_timeout: config.timeouts.quit_timeout(),
        };

        let greeting = within(command_timeout, "Greeting", session.client.read_greeting()).await?;
        if !greeting.is_success() {
            return Err(DeliveryError::ConnectionFailed(format!(
                "Relay rejected the connection: {greeting}"
            )));
        }

        session.ehlo(&config.helo_domain).await?;
        session.negotiate_tls(config).await?;

        let mechanism = within(
            command_timeout,
            "AUTH",
            session.client.login(sender, secret.expose()),
        )
        .await?;
        internal!(
            level = DEBUG,
            relay = %session.endpoint,
            mechanism = %mechanism,
            tls = session.client.is_tls(),
            "Authenticated with relay"
        );

        Ok(session)
    }

    async fn ehlo(&mut self, helo_domain: &str) -> Result<(), DeliveryError> {
        let response = within(self.command_timeout, "EHLO", self.client.ehlo(helo_domain)).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::ConnectionFailed(format!(
                "Relay rejected EHLO: {response}"
            )))
        }
    }

    async fn negotiate_tls(&mut self, config: &RelayConfig) -> Result<(), DeliveryError> {
        match config.tls.policy {
            TlsPolicy::Disabled => {
                tracing::warn!(
                    relay = %self.endpoint,
                    "STARTTLS is disabled, credentials will be sent in plaintext"
                );
                return Ok(());
            }
            _ if !self.client.capabilities().starttls => {
                if config.tls.is_required() {
                    return Err(DeliveryError::ConnectionFailed(format!(
                        "{} does not advertise STARTTLS and TLS is required",
                        self.endpoint
                    )));
                }
                tracing::warn!(
                    relay = %self.endpoint,
                    "Relay does not advertise STARTTLS, continuing in plaintext"
                );
                return Ok(());
            }
            _ => {}
        }

        // A relay that advertised STARTTLS and then refuses it is treated as a
        // handshake failure under every policy.
        let response = within(self.command_timeout, "STARTTLS", self.client.starttls()).await?;
        if !response.is_success() {
            return Err(DeliveryError::ConnectionFailed(format!(
                "Relay rejected STARTTLS: {response}"
            )));
        }

        self.ehlo(&config.helo_domain).await?;
        tracing::debug!(relay = %self.endpoint, "TLS negotiated via STARTTLS");
        Ok(())
    }

    /// The relay endpoint as `host:port`.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends one message to `recipients`.
    ///
    /// RCPT refusals are collected in the returned [`SendReport`]; if every
    /// recipient is refused the envelope is reset and DATA is never sent.
    ///
    /// # Errors
    ///
    /// - [`DeliveryError::Unknown`] when MAIL FROM, DATA or end-of-data is
    ///   not accepted
    /// - [`DeliveryError::Timeout`] when a command exceeds its budget
    /// - transport failures mapped through `From<ClientError>`
    #[tracing::instrument(level = "debug", skip(self, message), fields(relay = %self.endpoint))]
    pub async fn send(
        &mut self,
        from: &str,
        recipients: &[String],
        message: &str,
    ) -> Result<SendReport, DeliveryError> {
        let response = within(self.command_timeout, "MAIL FROM", self.client.mail_from(from)).await?;
        if !response.is_success() {
            return Err(Self::not_accepted("MAIL FROM", &response));
        }

        let mut report = SendReport::default();
        for recipient in recipients {
            let response =
                within(self.command_timeout, "RCPT TO", self.client.rcpt_to(recipient)).await?;
            if response.is_success() {
                report.accepted.push(recipient.clone());
            } else {
                internal!(
                    level = INFO,
                    recipient = %recipient,
                    code = response.code,
                    "Relay refused recipient"
                );
                report
                    .refused
                    .push((recipient.clone(), response.code, response.message()));
            }
        }

        if report.accepted.is_empty() {
            // Best effort; the refusal is what gets reported.
            let _ = within(self.command_timeout, "RSET", self.client.rset()).await;
            return Ok(report);
        }

        let response = within(self.command_timeout, "DATA", self.client.data()).await?;
        if response.code != 354 {
            return Err(Self::not_accepted("DATA", &response));
        }

        let response = within(
            self.command_timeout,
            "Message transfer",
            self.client.send_data(message),
        )
        .await?;
        if !response.is_success() {
            return Err(Self::not_accepted("Message", &response));
        }

        Ok(report)
    }

    fn not_accepted(what: &str, response: &Response) -> DeliveryError {
        DeliveryError::Unknown(format!("{what} was not accepted: {response}"))
    }

    /// Ends the session politely. Never fails: the result of the exchange
    /// has already been decided by the time QUIT is sent.
    pub async fn quit(mut self) {
        if let Err(e) = within(self.quit_timeout, "QUIT", self.client.quit()).await {
            tracing::debug!(relay = %self.endpoint, error = %e, "QUIT did not complete");
        }
    }
}
