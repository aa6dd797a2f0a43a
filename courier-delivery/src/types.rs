//! Request, outcome and record types shared across the pipeline.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    classifier::{self, FailureKind},
    error::DeliveryError,
};

/// The model output a report is about.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted annual premium in rupees.
    pub amount: f64,
    /// Model confidence in `0..=1`.
    pub confidence: f64,
}

/// A patient attribute as supplied by the caller, either text or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Whole numbers print without a trailing `.0` (age 30, not 30.0).
            Self::Number(n) if n.is_finite() && n.fract().abs() < f64::EPSILON && n.abs() < 1e15 => {
                write!(f, "{n:.0}")
            }
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// The patient record rendered into the report, in display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<AttributeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmi: Option<AttributeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<AttributeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoker: Option<AttributeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<AttributeValue>,
    /// Current annual premium. Also accepted as `premium_annual_inr`.
    #[serde(
        default,
        alias = "premium_annual_inr",
        skip_serializing_if = "Option::is_none"
    )]
    pub premium: Option<AttributeValue>,
}

/// One report to deliver. Built once per invocation and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRequest {
    pub recipient: String,
    pub prediction: Prediction,
    #[serde(default)]
    pub patient_attributes: PatientAttributes,
}

impl DeliveryRequest {
    #[must_use]
    pub fn new(
        recipient: impl Into<String>,
        prediction: Prediction,
        patient_attributes: PatientAttributes,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            prediction,
            patient_attributes,
        }
    }
}

/// The verdict returned to the caller of `send_report`.
///
/// `failure_kind` is present exactly when `success` is `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remediation: Vec<String>,
    pub processing_time_ms: f64,
    pub recipient: String,
}

impl DeliveryOutcome {
    #[must_use]
    pub fn delivered(recipient: impl Into<String>, processing_time_ms: f64) -> Self {
        let recipient = recipient.into();
        Self {
            success: true,
            message: classifier::delivered(&recipient),
            failure_kind: None,
            remediation: Vec::new(),
            processing_time_ms,
            recipient,
        }
    }

    #[must_use]
    pub fn failed(
        recipient: impl Into<String>,
        error: &DeliveryError,
        processing_time_ms: f64,
    ) -> Self {
        let classification = classifier::classify(error);
        Self {
            success: false,
            message: classification.message,
            failure_kind: Some(classification.kind),
            remediation: classification.remediation,
            processing_time_ms,
            recipient: recipient.into(),
        }
    }
}

/// Result of a connect + STARTTLS + AUTH handshake without sending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProbeResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    pub detail: String,
    pub relay_endpoint: String,
    pub sender_identity: Option<String>,
}

/// A persisted projection of a [`DeliveryOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub recipient: String,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    pub processing_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryRecord {
    #[must_use]
    pub fn from_outcome(outcome: &DeliveryOutcome, timestamp: DateTime<Utc>) -> Self {
        Self {
            recipient: outcome.recipient.clone(),
            success: outcome.success,
            message: outcome.message.clone(),
            failure_kind: outcome.failure_kind,
            processing_time_ms: outcome.processing_time_ms,
            timestamp,
        }
    }
}
