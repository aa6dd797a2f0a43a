//! Command-line arguments.

use std::{convert::Infallible, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use courier_delivery::{AttributeValue, DeliveryRequest, PatientAttributes, Prediction};
use thiserror::Error;

/// Deliver prediction reports over an authenticated SMTP relay
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Deliver prediction reports by email", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (otherwise `COURIER_CONFIG`, then the default locations)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deliver one report and print the outcome as JSON
    Send(SendArgs),
    /// Connect, negotiate TLS and authenticate without sending anything
    Probe,
    /// Print the recorded delivery history as JSON, oldest first
    History {
        /// Only show the most recent N records
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Read the request from a JSON file instead of the flags below
    #[arg(long, value_name = "FILE", conflicts_with_all = ["recipient", "amount", "confidence"])]
    pub request: Option<PathBuf>,

    /// Recipient address
    #[arg(short, long, required_unless_present = "request")]
    pub recipient: Option<String>,

    /// Predicted annual premium in rupees
    #[arg(long, required_unless_present = "request", allow_negative_numbers = true)]
    pub amount: Option<f64>,

    /// Model confidence between 0 and 1
    #[arg(long, required_unless_present = "request")]
    pub confidence: Option<f64>,

    #[command(flatten)]
    pub attributes: AttributeArgs,

    /// Retry transient failures according to the configured retry policy
    #[arg(long)]
    pub retry: bool,
}

/// Patient attributes. Numeric values are kept as numbers.
#[derive(Args, Debug, Default)]
pub struct AttributeArgs {
    #[arg(long, value_parser = attribute)]
    pub age: Option<AttributeValue>,
    #[arg(long, value_parser = attribute)]
    pub bmi: Option<AttributeValue>,
    #[arg(long, value_parser = attribute)]
    pub gender: Option<AttributeValue>,
    #[arg(long, value_parser = attribute)]
    pub smoker: Option<AttributeValue>,
    #[arg(long, value_parser = attribute)]
    pub region: Option<AttributeValue>,
    /// Current annual premium in rupees
    #[arg(long, value_parser = attribute)]
    pub premium: Option<AttributeValue>,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Failed to read request from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse request from {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing --{0}")]
    Missing(&'static str),
}

#[allow(clippy::unnecessary_wraps)]
fn attribute(value: &str) -> Result<AttributeValue, Infallible> {
    Ok(value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map_or_else(|| AttributeValue::Text(value.to_string()), AttributeValue::Number))
}

impl AttributeArgs {
    /// Replace the attributes in `base` that were given on the command line.
    fn overlay(self, mut base: PatientAttributes) -> PatientAttributes {
        let Self {
            age,
            bmi,
            gender,
            smoker,
            region,
            premium,
        } = self;

        base.age = age.or(base.age);
        base.bmi = bmi.or(base.bmi);
        base.gender = gender.or(base.gender);
        base.smoker = smoker.or(base.smoker);
        base.region = region.or(base.region);
        base.premium = premium.or(base.premium);
        base
    }
}

impl SendArgs {
    /// Build the request from a `--request` file or from the flags.
    ///
    /// Attribute flags override the file's attributes.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or parsed, or a required flag is missing.
    pub fn into_request(self) -> Result<DeliveryRequest, RequestError> {
        if let Some(path) = self.request {
            let content = std::fs::read_to_string(&path).map_err(|source| RequestError::Read {
                path: path.display().to_string(),
                source,
            })?;
            let mut request: DeliveryRequest =
                serde_json::from_str(&content).map_err(|source| RequestError::Parse {
                    path: path.display().to_string(),
                    source,
                })?;
            request.patient_attributes = self.attributes.overlay(request.patient_attributes);
            return Ok(request);
        }

        let recipient = self.recipient.ok_or(RequestError::Missing("recipient"))?;
        let amount = self.amount.ok_or(RequestError::Missing("amount"))?;
        let confidence = self.confidence.ok_or(RequestError::Missing("confidence"))?;

        Ok(DeliveryRequest::new(
            recipient,
            Prediction { amount, confidence },
            self.attributes.overlay(PatientAttributes::default()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn send(args: &[&str]) -> SendArgs {
        let cli = Cli::try_parse_from(["courier", "send"].iter().chain(args)).unwrap();
        match cli.command {
            Command::Send(args) => args,
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn test_request_from_flags() {
        let request = send(&[
            "--recipient",
            "user@example.com",
            "--amount",
            "19777.48",
            "--confidence",
            "0.85",
            "--age",
            "30",
            "--gender",
            "Male",
        ])
        .into_request()
        .unwrap();

        assert_eq!(request.recipient, "user@example.com");
        assert_eq!(
            request.prediction,
            Prediction {
                amount: 19777.48,
                confidence: 0.85
            }
        );
        assert_eq!(request.patient_attributes.age, Some(AttributeValue::Number(30.0)));
        assert_eq!(
            request.patient_attributes.gender,
            Some(AttributeValue::Text("Male".to_string()))
        );
        assert_eq!(request.patient_attributes.bmi, None);
    }

    #[test]
    fn test_negative_amount_is_accepted() {
        let args = send(&["-r", "a@b.com", "--amount", "-1500", "--confidence", "0.5"]);
        assert_eq!(args.amount, Some(-1500.0));
    }

    #[test]
    fn test_flags_required_without_request_file() {
        let result = Cli::try_parse_from(["courier", "send", "--recipient", "a@b.com"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_request_file_conflicts_with_recipient() {
        let result = Cli::try_parse_from([
            "courier",
            "send",
            "--request",
            "r.json",
            "--recipient",
            "a@b.com",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_request_from_file_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.json");
        std::fs::write(
            &path,
            r#"{
                "recipient": "user@example.com",
                "prediction": { "amount": 12000.0, "confidence": 0.9 },
                "patientAttributes": { "age": 41, "region": "South" }
            }"#,
        )
        .unwrap();

        let request = send(&["--request", path.to_str().unwrap(), "--region", "North"])
            .into_request()
            .unwrap();

        assert_eq!(request.recipient, "user@example.com");
        assert_eq!(request.patient_attributes.age, Some(AttributeValue::Number(41.0)));
        assert_eq!(
            request.patient_attributes.region,
            Some(AttributeValue::Text("North".to_string()))
        );
    }

    #[test]
    fn test_unreadable_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");

        let result = send(&["--request", missing.to_str().unwrap()]).into_request();
        assert!(matches!(result, Err(RequestError::Read { .. })));
    }

    #[test]
    fn test_malformed_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.json");
        std::fs::write(&path, "{ \"recipient\": 5 }").unwrap();

        let result = send(&["--request", path.to_str().unwrap()]).into_request();
        assert!(matches!(result, Err(RequestError::Parse { .. })));
    }

    #[test]
    fn test_history_limit() {
        let cli = Cli::try_parse_from(["courier", "--config", "c.ron", "history", "-n", "5"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.ron")));
        assert!(matches!(cli.command, Command::History { limit: Some(5) }));
    }
}
