//! Fail-fast handshake against the relay.

use std::sync::Arc;

use courier_common::RelayConfig;

use crate::{classifier, error::DeliveryError, session::RelaySession, types::ConnectionProbeResult};

/// Connects, negotiates TLS and authenticates, then hangs up without sending.
#[derive(Debug, Clone)]
pub struct ConnectionProbe {
    config: Arc<RelayConfig>,
}

impl ConnectionProbe {
    #[must_use]
    pub const fn new(config: Arc<RelayConfig>) -> Self {
        Self { config }
    }

    /// Runs the handshake. The connection is closed on every path: QUIT on
    /// success, dropped on failure.
    ///
    /// # Errors
    ///
    /// Whatever [`RelaySession::open`] reports.
    pub async fn check(&self) -> Result<(), DeliveryError> {
        let session = RelaySession::open(&self.config).await?;
        session.quit().await;
        Ok(())
    }

    /// Describes the outcome of [`check`](Self::check).
    #[must_use]
    pub fn report(&self, result: &Result<(), DeliveryError>) -> ConnectionProbeResult {
        let relay_endpoint = self.config.endpoint();
        let sender_identity = self.config.credentials().map(|(sender, _)| sender.to_string());

        match result {
            Ok(()) => ConnectionProbeResult {
                ok: true,
                failure_kind: None,
                detail: format!(
                    "Connected to {relay_endpoint} and authenticated as {}",
                    sender_identity.as_deref().unwrap_or("the configured sender")
                ),
                relay_endpoint,
                sender_identity,
            },
            Err(error) => ConnectionProbeResult {
                ok: false,
                failure_kind: Some(error.kind()),
                detail: classifier::describe(error),
                relay_endpoint,
                sender_identity,
            },
        }
    }
}
