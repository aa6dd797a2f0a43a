//! The delivery state machine.
//!
//! ```text
//! Idle → Validating → Probing → Composing → Transmitting → Delivered ─┐
//!            │            │          │             │                  ├→ Recorded
//!            └────────────┴──────────┴─────────────┴──→ Failed ───────┘
//! ```
//!
//! The total timeout covers the whole run. It is checked before every step,
//! and the network steps (probe and transmit) run in their own task so that
//! an expired budget aborts them. Aborting drops the task, and with it the
//! session and its socket, before `send_report` returns. Dropping the
//! `send_report` future aborts the running step the same way.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use courier_common::{Mailbox, RelayConfig, TimeoutConfig, address, internal, tracing};
use tokio::{task::JoinHandle, time::Instant};

use crate::{
    compose,
    error::DeliveryError,
    probe::ConnectionProbe,
    recorder::DeliveryRecorder,
    retry::RetryPolicy,
    transmitter::Transmitter,
    types::{ConnectionProbeResult, DeliveryOutcome, DeliveryRecord, DeliveryRequest},
};

/// Where a single `send_report` run currently is.
#[derive(Debug)]
enum DeliveryState {
    Idle,
    Validating,
    Probing { mailbox: Mailbox },
    Composing { mailbox: Mailbox },
    Transmitting { mailbox: Mailbox, message: String },
    Delivered,
    Failed(DeliveryError),
    Recorded(DeliveryOutcome),
}

impl DeliveryState {
    const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Probing { .. } => "probing",
            Self::Composing { .. } => "composing",
            Self::Transmitting { .. } => "transmitting",
            Self::Delivered => "delivered",
            Self::Failed(_) => "failed",
            Self::Recorded(_) => "recorded",
        }
    }
}

/// Sequences validation, probe, composition and transmission of one report.
///
/// The orchestrator holds no per-request state, so one instance can serve
/// any number of concurrent `send_report` calls.
#[derive(Debug, Clone)]
pub struct DeliveryOrchestrator {
    config: Arc<RelayConfig>,
    recorder: Arc<dyn DeliveryRecorder>,
}

impl DeliveryOrchestrator {
    pub fn new(config: impl Into<Arc<RelayConfig>>, recorder: Arc<dyn DeliveryRecorder>) -> Self {
        Self {
            config: config.into(),
            recorder,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    #[must_use]
    pub fn recorder(&self) -> &Arc<dyn DeliveryRecorder> {
        &self.recorder
    }

    /// Delivers one report under the configured total timeout.
    ///
    /// Never fails: every error is classified into the returned outcome, and
    /// the outcome is recorded before it is returned.
    pub async fn send_report(&self, request: &DeliveryRequest) -> DeliveryOutcome {
        self.send_report_within(request, self.config.timeouts.total_timeout())
            .await
    }

    /// [`send_report`](Self::send_report) with an explicit total budget.
    #[tracing::instrument(level = "info", skip(self, request), fields(recipient = %request.recipient))]
    pub async fn send_report_within(
        &self,
        request: &DeliveryRequest,
        budget: Duration,
    ) -> DeliveryOutcome {
        let started = Instant::now();
        let deadline = started + budget;
        let mut state = DeliveryState::Idle;

        loop {
            let from = state.name();
            state = match state {
                DeliveryState::Idle => DeliveryState::Validating,
                DeliveryState::Validating => match self.validate(request) {
                    Ok(mailbox) => DeliveryState::Probing { mailbox },
                    Err(error) => DeliveryState::Failed(error),
                },
                DeliveryState::Probing { mailbox } => {
                    match self.probe_within(deadline, budget).await {
                        Ok(()) => DeliveryState::Composing { mailbox },
                        Err(error) => DeliveryState::Failed(error),
                    }
                }
                DeliveryState::Composing { mailbox } => {
                    match self.compose(request, &mailbox, deadline, budget) {
                        Ok(message) => DeliveryState::Transmitting { mailbox, message },
                        Err(error) => DeliveryState::Failed(error),
                    }
                }
                DeliveryState::Transmitting { mailbox, message } => {
                    match self.transmit(mailbox, message, deadline, budget).await {
                        Ok(()) => DeliveryState::Delivered,
                        Err(error) => DeliveryState::Failed(error),
                    }
                }
                DeliveryState::Delivered => {
                    let outcome =
                        DeliveryOutcome::delivered(request.recipient.as_str(), elapsed_ms(started));
                    tracing::info!(
                        processing_time_ms = outcome.processing_time_ms,
                        "Report delivered"
                    );
                    self.record(&outcome).await;
                    DeliveryState::Recorded(outcome)
                }
                DeliveryState::Failed(error) => {
                    let outcome = DeliveryOutcome::failed(
                        request.recipient.as_str(),
                        &error,
                        elapsed_ms(started),
                    );
                    tracing::warn!(
                        failure_kind = %error.kind(),
                        error = %error,
                        processing_time_ms = outcome.processing_time_ms,
                        "Report delivery failed"
                    );
                    self.record(&outcome).await;
                    DeliveryState::Recorded(outcome)
                }
                DeliveryState::Recorded(outcome) => return outcome,
            };
            internal!(level = DEBUG, from, to = state.name(), "Delivery state transition");
        }
    }

    /// Runs only the connection probe, bounded by the total timeout.
    pub async fn probe(&self) -> ConnectionProbeResult {
        let budget = self.config.timeouts.total_timeout();
        let probe = ConnectionProbe::new(Arc::clone(&self.config));

        let result = if self.config.is_configured() {
            self.probe_within(Instant::now() + budget, budget).await
        } else {
            Err(DeliveryError::not_configured())
        };

        probe.report(&result)
    }

    /// Re-runs the whole pipeline according to `policy`.
    ///
    /// Each attempt gets the configured total timeout, clamped to what is
    /// left of the policy's overall ceiling. No attempt starts and no backoff
    /// sleeps past that ceiling. Every attempt is recorded.
    pub async fn send_report_with_retry(
        &self,
        request: &DeliveryRequest,
        policy: &RetryPolicy,
    ) -> DeliveryOutcome {
        let ceiling = Instant::now() + policy.overall();
        let total = self.config.timeouts.total_timeout();
        let mut attempt = 1;

        loop {
            let remaining = ceiling.saturating_duration_since(Instant::now());
            let outcome = self.send_report_within(request, total.min(remaining)).await;

            let Some(kind) = outcome.failure_kind else {
                return outcome;
            };
            if !policy.should_retry(attempt, kind) {
                return outcome;
            }

            let delay = policy.delay_for(attempt);
            if delay >= ceiling.saturating_duration_since(Instant::now()) {
                internal!(
                    level = INFO,
                    attempt,
                    "Not retrying, the next attempt would start past the retry ceiling"
                );
                return outcome;
            }

            tracing::warn!(
                attempt,
                max_attempts = policy.max_attempts,
                failure_kind = %kind,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Delivery attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn validate(&self, request: &DeliveryRequest) -> Result<Mailbox, DeliveryError> {
        let mailbox = address::validate(&request.recipient)?;
        if !self.config.is_configured() {
            return Err(DeliveryError::not_configured());
        }
        Ok(mailbox)
    }

    async fn probe_within(&self, deadline: Instant, budget: Duration) -> Result<(), DeliveryError> {
        let remaining = remaining(deadline, budget)?;
        let probe = ConnectionProbe::new(Arc::clone(&self.config));

        run_step("Relay probe", remaining, async move { probe.check().await })
            .await
            .unwrap_or_else(|| Err(total_exceeded(budget)))
    }

    fn compose(
        &self,
        request: &DeliveryRequest,
        mailbox: &Mailbox,
        deadline: Instant,
        budget: Duration,
    ) -> Result<String, DeliveryError> {
        remaining(deadline, budget)?;

        let now = Utc::now();
        let report = compose::compose(
            &request.prediction,
            &request.patient_attributes,
            &mailbox.to_string(),
            now,
        )?;
        Transmitter::new(Arc::clone(&self.config)).frame(mailbox, &report, now)
    }

    async fn transmit(
        &self,
        mailbox: Mailbox,
        message: String,
        deadline: Instant,
        budget: Duration,
    ) -> Result<(), DeliveryError> {
        let remaining = remaining(deadline, budget)?;
        let send = self.config.timeouts.send_timeout();
        let transmitter = Transmitter::new(Arc::clone(&self.config));

        run_step("Transmission", send.min(remaining), async move {
            transmitter.send(&mailbox, &message).await
        })
        .await
        .unwrap_or_else(|| {
            Err(if remaining <= send {
                total_exceeded(budget)
            } else {
                DeliveryError::Timeout(format!(
                    "Transmission exceeded the send timeout of {send:?}"
                ))
            })
        })
    }

    async fn record(&self, outcome: &DeliveryOutcome) {
        let record = DeliveryRecord::from_outcome(outcome, Utc::now());
        if let Err(e) = self.recorder.append(record).await {
            tracing::warn!(error = %e, "Failed to record delivery outcome");
        }
    }
}

fn total_exceeded(budget: Duration) -> DeliveryError {
    DeliveryError::Timeout(format!("Delivery exceeded the total timeout of {budget:?}"))
}

/// What is left of the run, or a timeout if nothing is.
fn remaining(deadline: Instant, budget: Duration) -> Result<Duration, DeliveryError> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        Err(total_exceeded(budget))
    } else {
        Ok(remaining)
    }
}

/// Aborts the task when dropped, so a caller that stops polling
/// `send_report` also stops the step and releases its connection.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs a network step in its own task, bounded by `limit`. Returns `None`
/// if the limit expired.
///
/// On expiry the task is aborted and awaited, so whatever it owned (the
/// relay connection) is dropped before this returns. If this future is
/// dropped instead, the task is aborted as well.
async fn run_step<F>(step: &str, limit: Duration, future: F) -> Option<Result<(), DeliveryError>>
where
    F: Future<Output = Result<(), DeliveryError>> + Send + 'static,
{
    let mut task = AbortOnDrop(tokio::spawn(future));

    match tokio::time::timeout(limit, &mut task.0).await {
        Ok(Ok(result)) => Some(result),
        Ok(Err(e)) => Some(Err(DeliveryError::Unknown(format!("{step} task failed: {e}")))),
        Err(_) => {
            task.0.abort();
            let _ = (&mut task.0).await;
            internal!(level = DEBUG, step, ?limit, "Step aborted at its deadline");
            None
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 1000.0).max(0.001)
}
