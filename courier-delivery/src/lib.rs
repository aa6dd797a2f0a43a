//! Report delivery pipeline.
//!
//! [`DeliveryOrchestrator::send_report`] takes a [`DeliveryRequest`] through
//! validation, a relay probe, content composition and transmission, and
//! always returns a [`DeliveryOutcome`]. Success is only reported once the
//! relay has accepted both the recipient and the message data. Every failure
//! carries one [`FailureKind`] and its remediation hints.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use courier_common::RelayConfig;
//! use courier_delivery::{
//!     DeliveryOrchestrator, DeliveryRequest, MemoryRecorder, PatientAttributes, Prediction,
//! };
//!
//! # async fn example() -> Result<(), courier_common::ConfigError> {
//! let config = RelayConfig::default().apply_env()?;
//! let orchestrator = DeliveryOrchestrator::new(config, Arc::new(MemoryRecorder::new()));
//!
//! let request = DeliveryRequest::new(
//!     "user@example.com",
//!     Prediction { amount: 19777.48, confidence: 0.85 },
//!     PatientAttributes::default(),
//! );
//! let outcome = orchestrator.send_report(&request).await;
//! println!("{}", outcome.message);
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod compose;
mod error;
mod orchestrator;
mod probe;
pub mod recorder;
mod retry;
mod session;
mod transmitter;
mod types;

pub use classifier::{Classification, FailureKind};
pub use compose::ComposedReport;
pub use error::{DeliveryError, RecorderError};
pub use orchestrator::DeliveryOrchestrator;
pub use probe::ConnectionProbe;
pub use recorder::{DeliveryRecorder, FileRecorder, MemoryRecorder, RecorderConfig};
pub use retry::RetryPolicy;
pub use session::{RelaySession, SendReport};
pub use transmitter::Transmitter;
pub use types::{
    AttributeValue, ConnectionProbeResult, DeliveryOutcome, DeliveryRecord, DeliveryRequest,
    PatientAttributes, Prediction,
};
